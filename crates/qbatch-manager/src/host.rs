//! Where scheduler commands run and submission scripts are written.

use crate::error::{ManagerError, Result};
use camino::Utf8Path;
use std::future::Future;
use tokio::process::Command;

/// Raw result of a command run on a host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// A machine that can run shell commands and hold files.
///
/// A command that runs and exits non-zero is not an error at this level:
/// the scheduler adapter decides what a failing exit code means.
pub trait Host: Send + Sync {
    fn execute(
        &self,
        command: &str,
        workdir: Option<&Utf8Path>,
    ) -> impl Future<Output = Result<ExecOutput>> + Send;

    fn mkdir(
        &self,
        directory: &Utf8Path,
        recursive: bool,
        exist_ok: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    fn write_text_file(
        &self,
        path: &Utf8Path,
        content: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// The machine this process runs on. Commands go through `bash -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalHost;

impl Host for LocalHost {
    async fn execute(&self, command: &str, workdir: Option<&Utf8Path>) -> Result<ExecOutput> {
        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(command);
        if let Some(dir) = workdir {
            cmd.current_dir(dir);
        }
        tracing::debug!(command, ?workdir, "executing");

        let output = cmd.output().await.map_err(|e| ManagerError::Execution {
            command: command.to_string(),
            error: e.to_string(),
        })?;

        // No exit code when the process was killed by a signal
        let exit_code = output.status.code().unwrap_or(-1);
        if exit_code != 0 {
            tracing::debug!(command, exit_code, "command exited with failure");
        }
        Ok(ExecOutput {
            exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn mkdir(&self, directory: &Utf8Path, recursive: bool, exist_ok: bool) -> Result<()> {
        let created = if recursive && exist_ok {
            tokio::fs::create_dir_all(directory).await
        } else if recursive {
            if tokio::fs::try_exists(directory).await.unwrap_or(false) {
                Err(std::io::Error::from(std::io::ErrorKind::AlreadyExists))
            } else {
                tokio::fs::create_dir_all(directory).await
            }
        } else {
            match tokio::fs::create_dir(directory).await {
                Err(e) if exist_ok && e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if directory.is_dir() { Ok(()) } else { Err(e) }
                }
                other => other,
            }
        };
        created.map_err(|e| ManagerError::io(directory, e))
    }

    async fn write_text_file(&self, path: &Utf8Path, content: &str) -> Result<()> {
        tokio::fs::write(path, content)
            .await
            .map_err(|e| ManagerError::io(path, e))
    }
}

//! Ties a scheduler adapter to a host.

use crate::environment::EnvironmentSetup;
use crate::error::Result;
use crate::host::{Host, LocalHost};
use camino::{Utf8Path, Utf8PathBuf};
use qbatch_core::{
    CancelResult, JobRef, QJob, RunCommands, SchedulerIo, ScriptOptions, SubmissionResult,
};
use qbatch_parsers::shell_quote;

pub const DEFAULT_SCRIPT_NAME: &str = "submit.script";

/// Everything that goes into one submission script.
#[derive(Debug, Clone, Copy)]
pub struct JobScript<'a> {
    commands: &'a RunCommands,
    options: ScriptOptions<'a>,
    workdir: Option<&'a Utf8Path>,
    pre_run: Option<&'a RunCommands>,
    post_run: Option<&'a RunCommands>,
    environment: Option<&'a EnvironmentSetup>,
}

impl<'a> JobScript<'a> {
    pub fn new(commands: &'a RunCommands) -> Self {
        Self {
            commands,
            options: ScriptOptions::Empty,
            workdir: None,
            pre_run: None,
            post_run: None,
            environment: None,
        }
    }

    pub fn options(mut self, options: impl Into<ScriptOptions<'a>>) -> Self {
        self.options = options.into();
        self
    }

    /// Directory the job changes into, and where its script is written.
    pub fn workdir(mut self, dir: &'a Utf8Path) -> Self {
        self.workdir = Some(dir);
        self
    }

    pub fn pre_run(mut self, commands: &'a RunCommands) -> Self {
        self.pre_run = Some(commands);
        self
    }

    pub fn post_run(mut self, commands: &'a RunCommands) -> Self {
        self.post_run = Some(commands);
        self
    }

    pub fn environment(mut self, environment: &'a EnvironmentSetup) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Script body: environment, `cd`, pre-run, commands, post-run.
    /// Empty sections are left out.
    fn body(&self) -> RunCommands {
        let mut blocks = Vec::new();
        if let Some(env) = self.environment {
            blocks.push(env.render());
        }
        if let Some(dir) = self.workdir {
            blocks.push(format!("cd {}", shell_quote(dir.as_str())));
        }
        blocks.extend(self.pre_run.map(RunCommands::render));
        blocks.push(self.commands.render());
        blocks.extend(self.post_run.map(RunCommands::render));
        blocks.retain(|b| !b.is_empty());
        RunCommands::Lines(blocks)
    }
}

#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub script_name: String,
    /// Create the working directory before writing the script.
    pub create_workdir: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            script_name: DEFAULT_SCRIPT_NAME.to_string(),
            create_workdir: false,
        }
    }
}

/// Submits, cancels and queries jobs through one scheduler on one host.
pub struct QueueManager<H: Host = LocalHost> {
    scheduler: Box<dyn SchedulerIo>,
    host: H,
}

impl QueueManager<LocalHost> {
    pub fn local(scheduler: Box<dyn SchedulerIo>) -> Self {
        Self::new(scheduler, LocalHost)
    }
}

impl<H: Host> QueueManager<H> {
    pub fn new(scheduler: Box<dyn SchedulerIo>, host: H) -> Self {
        Self { scheduler, host }
    }

    pub fn scheduler(&self) -> &dyn SchedulerIo {
        self.scheduler.as_ref()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn get_submission_script(&self, script: &JobScript<'_>) -> Result<String> {
        Ok(self
            .scheduler
            .get_submission_script(&script.body(), script.options)?)
    }

    /// Write the script into the working directory and submit it from there.
    pub async fn submit(
        &self,
        script: &JobScript<'_>,
        options: &SubmitOptions,
    ) -> Result<SubmissionResult> {
        let text = self.get_submission_script(script)?;

        let script_path = match script.workdir {
            Some(dir) => {
                if options.create_workdir {
                    self.host.mkdir(dir, true, true).await?;
                }
                dir.join(&options.script_name)
            }
            None => Utf8PathBuf::from(&options.script_name),
        };
        self.host.write_text_file(&script_path, &text).await?;

        let cmd = self.scheduler.get_submit_cmd(Some(script_path.as_str()));
        let out = self.host.execute(&cmd, script.workdir).await?;
        let result = self
            .scheduler
            .parse_submit_output(out.exit_code, &out.stdout, &out.stderr)?;
        tracing::info!(
            system = self.scheduler.system_name(),
            job_id = result.job_id.as_deref().unwrap_or("None"),
            status = %result.status,
            "submitted {script_path}"
        );
        Ok(result)
    }

    pub async fn cancel(&self, job: &JobRef) -> Result<CancelResult> {
        let cmd = self.scheduler.get_cancel_cmd(job)?;
        let out = self.host.execute(&cmd, None).await?;
        Ok(self
            .scheduler
            .parse_cancel_output(out.exit_code, &out.stdout, &out.stderr)?)
    }

    pub async fn get_job(&self, job: &JobRef) -> Result<Option<QJob>> {
        let cmd = self.scheduler.get_job_cmd(job);
        let out = self.host.execute(&cmd, None).await?;
        Ok(self
            .scheduler
            .parse_job_output(out.exit_code, &out.stdout, &out.stderr)?)
    }

    pub async fn get_jobs_list(
        &self,
        jobs: Option<&[JobRef]>,
        user: Option<&str>,
    ) -> Result<Vec<QJob>> {
        let cmd = self.scheduler.get_jobs_list_cmd(jobs, user)?;
        let out = self.host.execute(&cmd, None).await?;
        Ok(self
            .scheduler
            .parse_jobs_list_output(out.exit_code, &out.stdout, &out.stderr)?)
    }
}

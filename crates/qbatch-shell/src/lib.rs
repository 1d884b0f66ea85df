//! Shell adapter for qbatch.
//!
//! Runs submission scripts directly with bash, in the background by default,
//! and treats the spawned process id as the job id. There is no resource
//! request syntax, so only an empty [`QResources`] is accepted.

pub mod ps;

use qbatch_core::{
    CancelResult, CancelStatus, CommandOutput, HeaderMap, QJob, QResources, ResourceKey, Result,
    SchedulerError, SchedulerIo, SubmissionResult, SubmissionStatus,
};
use qbatch_parsers::non_empty_string;

pub const SHELL_HEADER_TEMPLATE: &str = "
exec > $${qout_path}
exec 2> $${qerr_path}

echo $${job_name}
$${qverbatim}
";

pub const DEFAULT_STDOUT_PATH: &str = "stdout";
pub const DEFAULT_STDERR_PATH: &str = "stderr";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellIo {
    blocking: bool,
    stdout_path: String,
    stderr_path: String,
}

impl Default for ShellIo {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellIo {
    pub fn new() -> Self {
        Self {
            blocking: false,
            stdout_path: DEFAULT_STDOUT_PATH.to_string(),
            stderr_path: DEFAULT_STDERR_PATH.to_string(),
        }
    }

    /// Run the script in the foreground. The submit command then waits for
    /// the script and prints no process id.
    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Files the submit command redirects the script's output streams to.
    pub fn with_output_paths(
        mut self,
        stdout_path: impl Into<String>,
        stderr_path: impl Into<String>,
    ) -> Self {
        self.stdout_path = stdout_path.into();
        self.stderr_path = stderr_path.into();
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }
}

impl SchedulerIo for ShellIo {
    fn system_name(&self) -> &str {
        "shell"
    }

    fn header_template(&self) -> &str {
        SHELL_HEADER_TEMPLATE
    }

    fn submit_cmd(&self) -> &str {
        "bash"
    }

    fn cancel_cmd(&self) -> &str {
        "kill -9"
    }

    fn supported_qresources_keys(&self) -> &[ResourceKey] {
        &[]
    }

    fn convert_qresources(&self, resources: &QResources) -> Result<HeaderMap> {
        if !resources.check_empty()? {
            return Err(SchedulerError::UnsupportedResources(
                "Only empty QResources is supported".to_string(),
            ));
        }
        Ok(HeaderMap::new())
    }

    // nohup and the redirections keep the job alive and the caller unblocked
    // when the command runs over a remote session.
    fn get_submit_cmd(&self, script_file: Option<&str>) -> String {
        let cmd = format!(
            "{} {} > {} 2> {}",
            self.submit_cmd(),
            script_file.unwrap_or_default(),
            self.stdout_path,
            self.stderr_path
        );
        if self.blocking {
            cmd
        } else {
            format!("nohup {cmd} & echo $!")
        }
    }

    fn job_cmd(&self, job_id: &str) -> String {
        format!("ps -o pid,user,etime,state,comm -p {job_id}")
    }

    fn jobs_list_cmd(&self, job_ids: Option<&[String]>, user: Option<&str>) -> Result<String> {
        ps::ps_cmd(job_ids, user)
    }

    fn parse_submit(&self, output: &CommandOutput) -> Result<SubmissionResult> {
        if !output.success() {
            return Ok(SubmissionResult::new(output, None, SubmissionStatus::Failed));
        }
        let job_id = non_empty_string(&output.stdout);
        let status = match job_id {
            Some(_) => SubmissionStatus::Successful,
            None => SubmissionStatus::JobIdUnknown,
        };
        Ok(SubmissionResult::new(output, job_id, status))
    }

    fn parse_cancel(&self, output: &CommandOutput) -> Result<CancelResult> {
        let status = if output.success() {
            CancelStatus::Successful
        } else {
            CancelStatus::Failed
        };
        Ok(CancelResult::new(output, None, status))
    }

    fn parse_job(&self, output: &CommandOutput) -> Result<Option<QJob>> {
        let jobs = ps::parse_ps(output)?;
        if jobs.len() > 1 {
            tracing::debug!(count = jobs.len(), "ps returned several processes, keeping the first");
        }
        Ok(jobs.into_iter().next())
    }

    fn parse_jobs_list(&self, output: &CommandOutput) -> Result<Vec<QJob>> {
        ps::parse_ps(output)
    }
}

//! The contract every scheduler adapter implements.
//!
//! An adapter is static configuration plus pure functions: it renders
//! submission scripts and command lines, and parses the text those commands
//! print. It never runs anything itself.

use crate::error::{Result, SchedulerError};
use crate::job::{JobRef, QJob};
use crate::resources::{QResources, ResourceKey};
use crate::result::{CancelResult, CommandOutput, SubmissionResult};
use crate::template::{DELIMITER, QTemplate};
use qbatch_parsers::shell_quote;
use std::collections::BTreeMap;

/// Header values keyed by template placeholder.
pub type HeaderMap = BTreeMap<String, String>;

pub const DEFAULT_SHEBANG: &str = "#!/bin/bash";

/// Options used to fill in a script header.
#[derive(Debug, Clone, Copy, Default)]
pub enum ScriptOptions<'a> {
    #[default]
    Empty,
    /// Placeholder values, used verbatim.
    Values(&'a HeaderMap),
    /// Resources converted through the adapter.
    Resources(&'a QResources),
}

impl<'a> From<&'a HeaderMap> for ScriptOptions<'a> {
    fn from(map: &'a HeaderMap) -> Self {
        Self::Values(map)
    }
}

impl<'a> From<&'a QResources> for ScriptOptions<'a> {
    fn from(resources: &'a QResources) -> Self {
        Self::Resources(resources)
    }
}

impl<'a, T> From<Option<T>> for ScriptOptions<'a>
where
    T: Into<ScriptOptions<'a>>,
{
    fn from(options: Option<T>) -> Self {
        options.map(Into::into).unwrap_or_default()
    }
}

/// Body of a script: one block of text or a list of lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunCommands {
    Single(String),
    Lines(Vec<String>),
}

impl RunCommands {
    pub fn render(&self) -> String {
        match self {
            Self::Single(text) => text.clone(),
            Self::Lines(lines) => lines.join("\n"),
        }
    }
}

impl From<&str> for RunCommands {
    fn from(text: &str) -> Self {
        Self::Single(text.to_string())
    }
}

impl From<String> for RunCommands {
    fn from(text: String) -> Self {
        Self::Single(text)
    }
}

impl From<Vec<String>> for RunCommands {
    fn from(lines: Vec<String>) -> Self {
        Self::Lines(lines)
    }
}

impl From<&[&str]> for RunCommands {
    fn from(lines: &[&str]) -> Self {
        Self::Lines(lines.iter().map(|l| l.to_string()).collect())
    }
}

/// A scheduler adapter.
pub trait SchedulerIo: Send + Sync {
    /// Name used in error messages ("SLURM", "PBS", "SGE", "shell").
    fn system_name(&self) -> &str;

    fn header_template(&self) -> &str;

    /// Base submit command; the script path is appended.
    fn submit_cmd(&self) -> &str;

    /// Base cancel command; the job id is appended.
    fn cancel_cmd(&self) -> &str;

    fn supported_qresources_keys(&self) -> &[ResourceKey];

    /// Translate resources into header values. Called only after the keys
    /// have been checked against [`supported_qresources_keys`](Self::supported_qresources_keys).
    fn convert_qresources(&self, resources: &QResources) -> Result<HeaderMap>;

    /// Command printing the details of one job.
    fn job_cmd(&self, job_id: &str) -> String;

    /// Command listing jobs, optionally restricted to ids or to an already quoted user.
    fn jobs_list_cmd(&self, job_ids: Option<&[String]>, user: Option<&str>) -> Result<String>;

    fn parse_submit(&self, output: &CommandOutput) -> Result<SubmissionResult>;

    fn parse_cancel(&self, output: &CommandOutput) -> Result<CancelResult>;

    fn parse_job(&self, output: &CommandOutput) -> Result<Option<QJob>>;

    fn parse_jobs_list(&self, output: &CommandOutput) -> Result<Vec<QJob>>;

    fn shebang(&self) -> &str {
        DEFAULT_SHEBANG
    }

    /// Shebang, header, commands and footer joined by newlines.
    /// Empty header and footer are left out.
    fn get_submission_script(
        &self,
        commands: &RunCommands,
        options: ScriptOptions<'_>,
    ) -> Result<String> {
        let mut blocks = vec![self.shebang().to_string()];
        let header = self.generate_header(options)?;
        if !header.is_empty() {
            blocks.push(header);
        }
        blocks.push(self.generate_run_commands(commands));
        let footer = self.generate_footer();
        if !footer.is_empty() {
            blocks.push(footer);
        }
        Ok(blocks.join("\n"))
    }

    /// Fill the header template and drop lines whose placeholders stayed unset.
    fn generate_header(&self, options: ScriptOptions<'_>) -> Result<String> {
        let converted;
        let values: &HeaderMap = match options {
            ScriptOptions::Empty => {
                converted = HeaderMap::new();
                &converted
            }
            ScriptOptions::Values(map) => map,
            ScriptOptions::Resources(resources) => {
                converted = if resources.check_empty()? {
                    HeaderMap::new()
                } else {
                    self.check_convert_qresources(resources)?
                };
                &converted
            }
        };

        let template = QTemplate::new(self.header_template());
        let identifiers = template.get_identifiers()?;
        let extra: Vec<String> = values
            .keys()
            .filter(|key| !identifiers.contains(*key))
            .cloned()
            .collect();
        if !extra.is_empty() {
            return Err(SchedulerError::UnknownTemplateKeys(extra));
        }

        let header = template.safe_substitute(values);
        Ok(header
            .split('\n')
            .filter(|line| !line.contains(DELIMITER))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn generate_run_commands(&self, commands: &RunCommands) -> String {
        commands.render()
    }

    fn generate_footer(&self) -> String {
        String::new()
    }

    /// Reject resources the adapter cannot express, then convert them.
    fn check_convert_qresources(&self, resources: &QResources) -> Result<HeaderMap> {
        let supported = self.supported_qresources_keys();
        let mut unsupported: Vec<&str> = resources
            .set_keys()
            .into_iter()
            .filter(|key| !supported.contains(key))
            .map(|key| key.as_str())
            .collect();
        if !unsupported.is_empty() {
            unsupported.sort_unstable();
            return Err(SchedulerError::UnsupportedResources(format!(
                "Keys not supported: {}",
                unsupported.join(", ")
            )));
        }
        self.convert_qresources(resources)
    }

    fn get_submit_cmd(&self, script_file: Option<&str>) -> String {
        format!("{} {}", self.submit_cmd(), script_file.unwrap_or_default())
    }

    fn get_cancel_cmd(&self, job: &JobRef) -> Result<String> {
        match job.id() {
            None => Err(SchedulerError::InvalidArgument(
                "The id of the job to be cancelled should be defined. Received: None".to_string(),
            )),
            Some("") => Err(SchedulerError::InvalidArgument(
                "The id of the job to be cancelled should be defined. Received: '' (empty string)"
                    .to_string(),
            )),
            Some(id) => Ok(format!("{} {}", self.cancel_cmd(), id)),
        }
    }

    fn get_job_cmd(&self, job: &JobRef) -> String {
        self.job_cmd(&job.to_string())
    }

    fn get_jobs_list_cmd(&self, jobs: Option<&[JobRef]>, user: Option<&str>) -> Result<String> {
        let job_ids: Option<Vec<String>> =
            jobs.map(|jobs| jobs.iter().map(|j| j.to_string()).collect());
        let user = user.filter(|u| !u.is_empty()).map(shell_quote);
        let cmd = self.jobs_list_cmd(job_ids.as_deref(), user.as_deref())?;
        tracing::debug!(system = self.system_name(), %cmd, "built jobs list command");
        Ok(cmd)
    }

    fn parse_submit_output(
        &self,
        exit_code: i32,
        stdout: &[u8],
        stderr: &[u8],
    ) -> Result<SubmissionResult> {
        self.parse_submit(&CommandOutput::decode(exit_code, stdout, stderr)?)
    }

    fn parse_cancel_output(
        &self,
        exit_code: i32,
        stdout: &[u8],
        stderr: &[u8],
    ) -> Result<CancelResult> {
        self.parse_cancel(&CommandOutput::decode(exit_code, stdout, stderr)?)
    }

    fn parse_job_output(
        &self,
        exit_code: i32,
        stdout: &[u8],
        stderr: &[u8],
    ) -> Result<Option<QJob>> {
        self.parse_job(&CommandOutput::decode(exit_code, stdout, stderr)?)
    }

    fn parse_jobs_list_output(
        &self,
        exit_code: i32,
        stdout: &[u8],
        stderr: &[u8],
    ) -> Result<Vec<QJob>> {
        self.parse_jobs_list(&CommandOutput::decode(exit_code, stdout, stderr)?)
    }
}

/// Insert `value` under `key` when present.
pub fn insert_header<T: ToString>(header: &mut HeaderMap, key: &str, value: Option<T>) {
    if let Some(value) = value {
        header.insert(key.to_string(), value.to_string());
    }
}

/// Reject listings restricted by both job ids and user.
///
/// Shared by adapters whose list command cannot combine both filters.
pub fn check_ids_or_user(
    system: &str,
    job_ids: Option<&[String]>,
    user: Option<&str>,
) -> Result<()> {
    if user.is_some() && job_ids.is_some_and(|ids| !ids.is_empty()) {
        return Err(SchedulerError::InvalidArgument(format!(
            "Cannot query by user and job(s) in {system}"
        )));
    }
    Ok(())
}

//! Error taxonomy shared by every scheduler adapter.

use qbatch_parsers::ParseError;
use thiserror::Error;

pub type Result<T, E = SchedulerError> = std::result::Result<T, E>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The resource request cannot be expressed for the target scheduler,
    /// or is internally inconsistent.
    #[error("{0}")]
    UnsupportedResources(String),

    /// Scheduler output did not have the expected shape.
    #[error("{message}")]
    OutputParsing {
        message: String,
        job_id: Option<String>,
        fragment: Option<String>,
    },

    /// A scheduler command reported failure where failure cannot be tolerated.
    #[error("command {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("{0}")]
    InvalidArgument(String),

    #[error("The following keys are not present in the template: {}", .0.join(", "))]
    UnknownTemplateKeys(Vec<String>),

    #[error("Template error: {0}")]
    Template(String),
}

impl SchedulerError {
    pub fn parsing(message: impl Into<String>) -> Self {
        Self::OutputParsing {
            message: message.into(),
            job_id: None,
            fragment: None,
        }
    }

    pub fn command_failed(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Attach the job id being parsed. No-op for other variants.
    pub fn with_job_id(mut self, id: impl Into<String>) -> Self {
        if let Self::OutputParsing { job_id, .. } = &mut self {
            *job_id = Some(id.into());
        }
        self
    }

    /// Attach the offending output fragment. No-op for other variants.
    pub fn with_fragment(mut self, text: impl Into<String>) -> Self {
        if let Self::OutputParsing { fragment, .. } = &mut self {
            *fragment = Some(text.into());
        }
        self
    }
}

impl From<ParseError> for SchedulerError {
    fn from(err: ParseError) -> Self {
        Self::parsing(err.to_string())
    }
}

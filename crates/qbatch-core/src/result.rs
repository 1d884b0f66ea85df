//! Outcomes of submit and cancel operations, and raw command output.

use crate::error::{Result, SchedulerError};
use qbatch_parsers::decode_output;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Successful,
    Failed,
    /// The command succeeded but no job id could be read from its output.
    JobIdUnknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelStatus {
    Successful,
    Failed,
    JobIdUnknown,
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Successful => "SUCCESSFUL",
            Self::Failed => "FAILED",
            Self::JobIdUnknown => "JOB_ID_UNKNOWN",
        })
    }
}

impl fmt::Display for CancelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Successful => "SUCCESSFUL",
            Self::Failed => "FAILED",
            Self::JobIdUnknown => "JOB_ID_UNKNOWN",
        })
    }
}

/// Result of a submit command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub job_id: Option<String>,
    pub step_id: Option<u32>,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub status: SubmissionStatus,
}

/// Result of a cancel command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResult {
    pub job_id: Option<String>,
    pub step_id: Option<u32>,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub status: CancelStatus,
}

impl SubmissionResult {
    pub fn new(output: &CommandOutput, job_id: Option<String>, status: SubmissionStatus) -> Self {
        Self {
            job_id,
            step_id: None,
            exit_code: output.exit_code,
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
            status,
        }
    }
}

impl CancelResult {
    pub fn new(output: &CommandOutput, job_id: Option<String>, status: CancelStatus) -> Self {
        Self {
            job_id,
            step_id: None,
            exit_code: output.exit_code,
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
            status,
        }
    }
}

/// Exit code and decoded output streams of an executed command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Decode raw process output. Both streams must be valid UTF-8.
    pub fn decode(exit_code: i32, stdout: &[u8], stderr: &[u8]) -> Result<Self> {
        let stdout = decode_output(stdout)
            .map_err(|e| SchedulerError::parsing(format!("stdout: {e}")))?;
        let stderr = decode_output(stderr)
            .map_err(|e| SchedulerError::parsing(format!("stderr: {e}")))?;
        Ok(Self {
            exit_code,
            stdout,
            stderr,
        })
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode() {
        let out = CommandOutput::decode(0, b"Submitted batch job 10\n", b"").unwrap();
        assert_eq!(out.stdout, "Submitted batch job 10\n");
        assert!(out.success());

        let err = CommandOutput::decode(0, b"ok", &[0xc3, 0x28]).unwrap_err();
        assert!(matches!(err, SchedulerError::OutputParsing { .. }));
    }

    #[test]
    fn test_status_display_and_serde() {
        assert_eq!(SubmissionStatus::JobIdUnknown.to_string(), "JOB_ID_UNKNOWN");
        assert_eq!(CancelStatus::Successful.to_string(), "SUCCESSFUL");
        assert_eq!(
            serde_json::to_string(&CancelStatus::Failed).unwrap(),
            "\"FAILED\""
        );
    }

    #[test]
    fn test_result_copies_output() {
        let out = CommandOutput::new(1, "", "sbatch: error: invalid partition");
        let result = SubmissionResult::new(&out, None, SubmissionStatus::Failed);
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.stderr, "sbatch: error: invalid partition");
        assert_eq!(result.job_id, None);
    }
}

//! Job records as reported by a scheduler.

use crate::state::{QState, SubState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource facts of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QJobInfo {
    /// Job memory in KB.
    pub memory: Option<u64>,
    /// Memory per CPU in KB.
    pub memory_per_cpu: Option<u64>,
    pub nodes: Option<u32>,
    pub cpus: Option<u32>,
    pub threads_per_process: Option<u32>,
    /// Time limit in seconds.
    pub time_limit: Option<u64>,
    pub submit_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
}

/// A job known to the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QJob {
    pub name: Option<String>,
    pub job_id: Option<String>,
    /// Shell exit status.
    pub exit_status: Option<i32>,
    pub state: Option<QState>,
    /// Native scheduler state.
    pub sub_state: Option<SubState>,
    pub info: QJobInfo,
    /// Account (user) the job runs under.
    pub account: Option<String>,
    /// Runtime in seconds.
    pub runtime: Option<u64>,
    pub queue_name: Option<String>,
}

impl QJob {
    /// Set both the native state and the standardized state derived from it.
    pub fn set_sub_state(&mut self, sub_state: impl Into<SubState>) {
        let sub_state = sub_state.into();
        self.state = Some(sub_state.qstate());
        self.sub_state = Some(sub_state);
    }
}

/// Reference to a job by id: from a [`QJob`], a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobRef(Option<String>);

impl JobRef {
    pub fn id(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(id) => f.write_str(id),
            None => f.write_str("None"),
        }
    }
}

impl From<&QJob> for JobRef {
    fn from(job: &QJob) -> Self {
        Self(job.job_id.clone())
    }
}

impl From<&str> for JobRef {
    fn from(id: &str) -> Self {
        Self(Some(id.to_string()))
    }
}

impl From<String> for JobRef {
    fn from(id: String) -> Self {
        Self(Some(id))
    }
}

impl From<&String> for JobRef {
    fn from(id: &String) -> Self {
        Self(Some(id.clone()))
    }
}

impl From<u32> for JobRef {
    fn from(id: u32) -> Self {
        Self(Some(id.to_string()))
    }
}

impl From<u64> for JobRef {
    fn from(id: u64) -> Self {
        Self(Some(id.to_string()))
    }
}

impl From<i64> for JobRef {
    fn from(id: i64) -> Self {
        Self(Some(id.to_string()))
    }
}

impl<T: Into<JobRef>> From<Option<T>> for JobRef {
    fn from(id: Option<T>) -> Self {
        id.map(Into::into).unwrap_or_default()
    }
}

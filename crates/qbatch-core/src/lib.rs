//! Core types for qbatch.
//!
//! This crate holds everything that does not depend on a particular
//! scheduler: the resource request model, job and result records, the native
//! and standardized job states, the header template engine and the
//! [`SchedulerIo`] adapter contract.

pub mod error;
pub mod io;
pub mod job;
pub mod resources;
pub mod result;
pub mod state;
pub mod template;

pub use error::{Result, SchedulerError};
pub use io::{
    check_ids_or_user, insert_header, HeaderMap, RunCommands, SchedulerIo, ScriptOptions,
};
pub use job::{JobRef, QJob, QJobInfo};
pub use resources::{ProcessDistribution, ProcessPlacement, QResources, QResourcesBuilder, ResourceKey};
pub use result::{CancelResult, CancelStatus, CommandOutput, SubmissionResult, SubmissionStatus};
pub use state::{
    PbsState, QState, QSubState, SgeState, ShellState, SlurmState, SubState, UnknownState,
};
pub use template::QTemplate;

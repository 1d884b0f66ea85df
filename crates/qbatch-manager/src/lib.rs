//! Job management on top of the qbatch scheduler adapters.
//!
//! Adapters only build command strings and parse output. This crate runs
//! those commands on a [`Host`], writes submission scripts next to the job
//! and wraps the job commands with environment setup and a `cd` into the
//! working directory.

pub mod environment;
pub mod error;
pub mod host;
pub mod manager;

pub use environment::{load_json, load_resources, EnvironmentSetup};
pub use error::{ManagerError, Result};
pub use host::{ExecOutput, Host, LocalHost};
pub use manager::{JobScript, QueueManager, SubmitOptions, DEFAULT_SCRIPT_NAME};

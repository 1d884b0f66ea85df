use camino::Utf8PathBuf;
use qbatch_core::SchedulerError;
use thiserror::Error;

pub type Result<T, E = ManagerError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// The command could not be started at all.
    #[error("Failed to execute {command}: {error}")]
    Execution { command: String, error: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ManagerError {
    pub(crate) fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

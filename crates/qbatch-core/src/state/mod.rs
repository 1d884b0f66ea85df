//! Standardized job states and the per-scheduler native states that map onto them.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Declares a native scheduler state enum from its code table.
///
/// The first code of each variant is its canonical spelling; any further codes
/// are aliases accepted when parsing. Matching is case sensitive.
macro_rules! sub_state_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident ($system:literal) {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $canonical:literal $(| $alias:literal)*
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant, )*
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),*];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $canonical,)*
                }
            }

            /// Canonical code followed by its aliases.
            pub fn codes(self) -> &'static [&'static str] {
                match self {
                    $(Self::$variant => &[$canonical $(, $alias)*],)*
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::state::UnknownState;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|state| state.codes().contains(&s))
                    .ok_or_else(|| $crate::state::UnknownState {
                        system: $system,
                        value: s.to_string(),
                    })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let code = String::deserialize(deserializer)?;
                code.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

pub mod pbs;
pub mod sge;
pub mod shell;
pub mod slurm;

pub use pbs::PbsState;
pub use sge::SgeState;
pub use shell::ShellState;
pub use slurm::SlurmState;

/// A native state code that is not in the scheduler's table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {system} job state {value}")]
pub struct UnknownState {
    pub system: &'static str,
    pub value: String,
}

/// Scheduler-agnostic job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QState {
    /// The state cannot be determined, permanently.
    Undetermined,
    Queued,
    /// Held by the system, an administrator or the user.
    QueuedHeld,
    Running,
    Suspended,
    /// Re-queued by the scheduler and eligible to run.
    Requeued,
    RequeuedHeld,
    /// Finished without error.
    Done,
    /// Exited abnormally.
    Failed,
}

impl QState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undetermined => "UNDETERMINED",
            Self::Queued => "QUEUED",
            Self::QueuedHeld => "QUEUED_HELD",
            Self::Running => "RUNNING",
            Self::Suspended => "SUSPENDED",
            Self::Requeued => "REQUEUED",
            Self::RequeuedHeld => "REQUEUED_HELD",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    /// Whether the job has left the scheduler for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for QState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scheduler's native job state.
pub trait QSubState {
    /// Canonical native code.
    fn canonical(&self) -> &'static str;

    /// Every native code that parses to this state, canonical first.
    fn aliases(&self) -> &'static [&'static str];

    /// Standardized state for this native state.
    fn qstate(&self) -> QState;
}

/// Native state of a job, tagged with the scheduler that reported it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheduler", content = "state", rename_all = "snake_case")]
pub enum SubState {
    Slurm(SlurmState),
    Pbs(PbsState),
    Sge(SgeState),
    Shell(ShellState),
}

impl SubState {
    fn inner(&self) -> &dyn QSubState {
        match self {
            Self::Slurm(s) => s,
            Self::Pbs(s) => s,
            Self::Sge(s) => s,
            Self::Shell(s) => s,
        }
    }

    pub fn canonical(&self) -> &'static str {
        self.inner().canonical()
    }

    pub fn qstate(&self) -> QState {
        self.inner().qstate()
    }
}

impl fmt::Display for SubState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical())
    }
}

impl From<SlurmState> for SubState {
    fn from(s: SlurmState) -> Self {
        Self::Slurm(s)
    }
}

impl From<PbsState> for SubState {
    fn from(s: PbsState) -> Self {
        Self::Pbs(s)
    }
}

impl From<SgeState> for SubState {
    fn from(s: SgeState) -> Self {
        Self::Sge(s)
    }
}

impl From<ShellState> for SubState {
    fn from(s: ShellState) -> Self {
        Self::Shell(s)
    }
}

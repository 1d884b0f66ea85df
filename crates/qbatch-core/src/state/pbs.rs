//! PBS job states (`qstat -f` `job_state` codes).

use super::{QState, QSubState};

sub_state_enum! {
    pub enum PbsState ("PBS") {
        ArrayRunning = "B",
        Exiting = "E",
        Finished = "F",
        Held = "H",
        Moved = "M",
        Queued = "Q",
        Running = "R",
        Suspended = "S",
        Transiting = "T",
        SuspendedKeyboard = "U",
        Waiting = "W",
        ArrayFinished = "X",
    }
}

impl QSubState for PbsState {
    fn canonical(&self) -> &'static str {
        self.as_str()
    }

    fn aliases(&self) -> &'static [&'static str] {
        self.codes()
    }

    fn qstate(&self) -> QState {
        match self {
            Self::ArrayRunning => QState::Running,
            Self::Exiting => QState::Running,
            Self::Finished => QState::Done,
            Self::Held => QState::QueuedHeld,
            Self::Moved => QState::Requeued,
            Self::Queued => QState::Queued,
            Self::Running => QState::Running,
            Self::Suspended => QState::Suspended,
            Self::Transiting => QState::Requeued,
            Self::SuspendedKeyboard => QState::Suspended,
            Self::Waiting => QState::Queued,
            Self::ArrayFinished => QState::Done,
        }
    }
}

//! Process states as printed by `ps -o state`.

use super::{QState, QSubState};

sub_state_enum! {
    pub enum ShellState ("shell") {
        UninterruptibleSleep = "D",
        Running = "R",
        InterruptibleSleep = "S",
        Stopped = "T",
        StoppedDebugger = "t",
        Paging = "W",
        Dead = "X",
        Defunct = "Z",
    }
}

impl QSubState for ShellState {
    fn canonical(&self) -> &'static str {
        self.as_str()
    }

    fn aliases(&self) -> &'static [&'static str] {
        self.codes()
    }

    fn qstate(&self) -> QState {
        match self {
            Self::UninterruptibleSleep => QState::Running,
            Self::Running => QState::Running,
            Self::InterruptibleSleep => QState::Running,
            Self::Stopped => QState::Suspended,
            Self::StoppedDebugger => QState::Suspended,
            Self::Paging => QState::Running,
            Self::Dead => QState::Done,
            // A zombie has exited; its status is not visible from ps.
            Self::Defunct => QState::Done,
        }
    }
}

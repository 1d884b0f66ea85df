//! SGE job states (`qstat` state column).

use super::{QState, QSubState};

sub_state_enum! {
    pub enum SgeState ("SGE") {
        Finished = "z",
        QueuedWaiting = "qw",
        Waiting = "w",
        JobSuspended = "s",
        Transferring = "t",
        Running = "r",
        Hold = "hqw",
        Restarted = "R",
        Deletion = "d",
        ErrorPending = "Eqw",
        ErrorPendingHold = "Ehqw",
        ErrorPendingHoldRequeue = "EhRqw",
        DeletionRunning = "dr",
        DeletionTransferring = "dt",
        DeletionRunningResubmit = "dRr",
        DeletionTransferringResubmit = "dRt",
        DeletionSuspendedJob = "ds",
        DeletionSuspendedQueue = "dS",
        DeletionSuspendedAlarm = "dT",
        DeletionSuspendedResubmitJob = "dRs",
        DeletionSuspendedResubmitQueue = "dRS",
        DeletionSuspendedResubmitAlarm = "dRT",
    }
}

impl QSubState for SgeState {
    fn canonical(&self) -> &'static str {
        self.as_str()
    }

    fn aliases(&self) -> &'static [&'static str] {
        self.codes()
    }

    fn qstate(&self) -> QState {
        match self {
            Self::Finished => QState::Done,
            Self::QueuedWaiting | Self::Waiting => QState::Queued,
            Self::Hold => QState::QueuedHeld,
            Self::ErrorPending | Self::ErrorPendingHold | Self::ErrorPendingHoldRequeue => {
                QState::Failed
            }
            Self::Running | Self::Transferring | Self::Restarted => QState::Running,
            Self::JobSuspended => QState::Suspended,
            Self::Deletion
            | Self::DeletionRunning
            | Self::DeletionTransferring
            | Self::DeletionRunningResubmit
            | Self::DeletionTransferringResubmit => QState::Failed,
            Self::DeletionSuspendedJob
            | Self::DeletionSuspendedQueue
            | Self::DeletionSuspendedAlarm
            | Self::DeletionSuspendedResubmitJob
            | Self::DeletionSuspendedResubmitQueue
            | Self::DeletionSuspendedResubmitAlarm => QState::Suspended,
        }
    }
}

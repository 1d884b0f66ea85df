//! SLURM job states (`squeue` short codes and long names).

use super::{QState, QSubState};

sub_state_enum! {
    pub enum SlurmState ("SLURM") {
        BootFail = "BOOT_FAIL" | "BF",
        Cancelled = "CANCELLED" | "CA",
        Completing = "COMPLETING" | "CG",
        Completed = "COMPLETED" | "CD",
        Configuring = "CONFIGURING" | "CF",
        Deadline = "DEADLINE" | "DL",
        Failed = "FAILED" | "F",
        NodeFail = "NODE_FAIL" | "NF",
        OutOfMemory = "OUT_OF_MEMORY" | "OOM",
        Pending = "PENDING" | "PD",
        Preempted = "PREEMPTED" | "PR",
        ResvDelHold = "RESV_DEL_HOLD" | "RD",
        RequeueFed = "REQUEUE_FED" | "RF",
        RequeueHold = "REQUEUE_HOLD" | "RH",
        Resizing = "RESIZING" | "RS",
        Revoked = "REVOKED" | "RV",
        Running = "RUNNING" | "R",
        Signaling = "SIGNALING" | "SI",
        SpecialExit = "SPECIAL_EXIT" | "SE",
        StageOut = "STAGE_OUT" | "SO",
        Stopped = "STOPPED" | "ST",
        Suspended = "SUSPENDED" | "S",
        Timeout = "TIMEOUT" | "TO",
    }
}

impl QSubState for SlurmState {
    fn canonical(&self) -> &'static str {
        self.as_str()
    }

    fn aliases(&self) -> &'static [&'static str] {
        self.codes()
    }

    fn qstate(&self) -> QState {
        match self {
            Self::BootFail => QState::Failed,
            Self::Cancelled => QState::Failed,
            Self::Completing => QState::Running,
            Self::Completed => QState::Done,
            Self::Configuring => QState::Queued,
            Self::Deadline => QState::Failed,
            Self::Failed => QState::Failed,
            Self::NodeFail => QState::Failed,
            Self::OutOfMemory => QState::Failed,
            Self::Pending => QState::Queued,
            Self::Preempted => QState::Failed,
            Self::ResvDelHold => QState::QueuedHeld,
            // Could also read as queued or held; requeue wins.
            Self::RequeueFed => QState::Requeued,
            Self::RequeueHold => QState::Requeued,
            Self::Resizing => QState::Running,
            Self::Revoked => QState::Failed,
            Self::Running => QState::Running,
            Self::Signaling => QState::Running,
            Self::SpecialExit => QState::Failed,
            Self::StageOut => QState::Running,
            Self::Stopped => QState::Running,
            Self::Suspended => QState::Suspended,
            Self::Timeout => QState::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_long_and_short_codes() {
        assert_eq!("PD".parse::<SlurmState>(), Ok(SlurmState::Pending));
        assert_eq!("PENDING".parse::<SlurmState>(), Ok(SlurmState::Pending));
        assert_eq!("OOM".parse::<SlurmState>(), Ok(SlurmState::OutOfMemory));
        assert!("pd".parse::<SlurmState>().is_err());
        assert!("XX".parse::<SlurmState>().is_err());
    }

    #[test]
    fn test_qstate_mapping() {
        assert_eq!(SlurmState::Completing.qstate(), QState::Running);
        assert_eq!(SlurmState::Completed.qstate(), QState::Done);
        assert_eq!(SlurmState::ResvDelHold.qstate(), QState::QueuedHeld);
        assert_eq!(SlurmState::RequeueHold.qstate(), QState::Requeued);
        assert_eq!(SlurmState::Stopped.qstate(), QState::Running);
        assert_eq!(SlurmState::Timeout.qstate(), QState::Failed);
    }

    #[test]
    fn test_every_code_round_trips() {
        for state in SlurmState::ALL {
            for code in state.aliases() {
                assert_eq!(code.parse::<SlurmState>(), Ok(*state));
            }
            assert_eq!(state.to_string(), state.canonical());
        }
        assert_eq!(SlurmState::ALL.len(), 23);
    }
}

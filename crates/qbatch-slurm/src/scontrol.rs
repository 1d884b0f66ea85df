//! Single-job query through `scontrol show job -o`.

use qbatch_core::{CommandOutput, QJob, QJobInfo, Result, SchedulerError, SlurmState};
use qbatch_parsers::{
    non_empty_string, parse_duration_secs, parse_exit_code, parse_memory_kb,
    parse_slurm_timestamp, DurationFormat, MemoryFormat,
};
use std::collections::HashMap;

pub fn scontrol_cmd(job_id: &str) -> String {
    format!("SLURM_TIME_FORMAT='standard' scontrol show job -o {job_id}")
}

/// Split one-line scontrol output into `KEY=value` pairs.
///
/// Values end at the next whitespace; tokens without `=` are skipped.
fn parse_fields(stdout: &str) -> HashMap<&str, &str> {
    stdout
        .split_whitespace()
        .filter_map(|token| token.split_once('='))
        .collect()
}

/// Parse `scontrol show job -o` output. Empty output means the job is unknown.
pub fn parse_scontrol(output: &CommandOutput) -> Result<Option<QJob>> {
    if !output.success() {
        return Err(SchedulerError::command_failed("scontrol", output.stderr.trim()));
    }

    let fields = parse_fields(&output.stdout);
    if fields.is_empty() {
        return Ok(None);
    }

    let job_id = fields.get("JobId").copied();
    let raw_state = fields.get("JobState").ok_or_else(|| {
        let err = SchedulerError::parsing("JobState missing from scontrol output");
        match job_id {
            Some(id) => err.with_job_id(id),
            None => err,
        }
    })?;
    let state: SlurmState = raw_state.parse().map_err(|_| {
        SchedulerError::parsing(format!(
            "Unknown job state {} for job id {}",
            raw_state,
            job_id.unwrap_or("None")
        ))
    })?;

    let field = |key: &str| fields.get(key).copied().unwrap_or_default();
    let memory = |key: &str| {
        parse_memory_kb(field(key), MemoryFormat::Slurm)
            .ok()
            .flatten()
            .filter(|&kb| kb > 0)
    };
    let duration = |key: &str| {
        parse_duration_secs(field(key), DurationFormat::Slurm)
            .ok()
            .flatten()
    };

    let mut job = QJob {
        name: fields.get("JobName").map(|s| s.to_string()),
        job_id: job_id.map(str::to_string),
        exit_status: fields.get("ExitCode").map(|s| parse_exit_code(s)),
        // UserId=name(uid)
        account: fields
            .get("UserId")
            .map(|s| s.split('(').next().unwrap_or_default().to_string()),
        runtime: duration("RunTime"),
        queue_name: non_empty_string(field("Partition")),
        info: QJobInfo {
            memory: memory("MinMemoryNode"),
            memory_per_cpu: memory("MinMemoryCPU"),
            nodes: field("NumNodes").parse().ok(),
            cpus: field("NumCPUs").parse().ok(),
            threads_per_process: field("CPUs/Task").parse().ok(),
            time_limit: duration("TimeLimit"),
            submit_time: parse_slurm_timestamp(field("SubmitTime")),
            start_time: parse_slurm_timestamp(field("StartTime")),
        },
        ..Default::default()
    };
    job.set_sub_state(state);
    Ok(Some(job))
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbatch_core::{QState, SubState};

    const JOB_270: &str = "JobId=270 JobName=submit.script UserId=matgenix-dwa(1001) \
GroupId=matgenix-dwa(1002) MCS_label=N/A Priority=4294901497 Nice=0 Account=(null) QOS=normal \
JobState=COMPLETED Reason=None Dependency=(null) Requeue=1 Restarts=0 BatchFlag=1 Reboot=0 \
ExitCode=0:0 RunTime=00:05:00 TimeLimit=UNLIMITED TimeMin=N/A SubmitTime=2023-10-11T11:08:17 \
EligibleTime=2023-10-11T11:08:17 AccrueTime=2023-10-11T11:08:17 StartTime=2023-10-11T11:08:17 \
EndTime=2023-10-11T11:13:17 Deadline=N/A SuspendTime=None SecsPreSuspend=0 \
LastSchedEval=2023-10-11T11:08:17 Scheduler=Main Partition=main AllocNode:Sid=matgenixdb:2556938 \
ReqNodeList=(null) ExcNodeList=(null) NodeList=matgenixdb BatchHost=matgenixdb NumNodes=1 \
NumCPUs=1 NumTasks=1 CPUs/Task=1 ReqB:S:C:T=0:0:*:* TRES=cpu=1,mem=96G,node=1,billing=1 \
Socks/Node=* NtasksPerN:B:S:C=0:0:*:* CoreSpec=* MinCPUsNode=1 MinMemoryNode=0 MinTmpDiskNode=0 \
Features=(null) DelayBoot=00:00:00 OverSubscribe=OK Contiguous=0 Licenses=(null) Network=(null) \
Command=/home/matgenix-dwa/slurm/submit.script WorkDir=/home/matgenix-dwa/slurm \
StdErr=/home/matgenix-dwa/slurm/slurm-270.out StdIn=/dev/null \
StdOut=/home/matgenix-dwa/slurm/slurm-270.out Power= \n";

    #[test]
    fn test_scontrol_cmd() {
        assert_eq!(
            scontrol_cmd("3"),
            "SLURM_TIME_FORMAT='standard' scontrol show job -o 3"
        );
    }

    #[test]
    fn test_parse_fields() {
        let fields = parse_fields("A=1 TRES=cpu=1,mem=2G junk Power= ");
        assert_eq!(fields["A"], "1");
        assert_eq!(fields["TRES"], "cpu=1,mem=2G");
        assert_eq!(fields["Power"], "");
        assert!(!fields.contains_key("junk"));
    }

    #[test]
    fn test_parse_completed_job() {
        let job = parse_scontrol(&CommandOutput::new(0, JOB_270, ""))
            .unwrap()
            .unwrap();
        assert_eq!(job.job_id.as_deref(), Some("270"));
        assert_eq!(job.name.as_deref(), Some("submit.script"));
        assert_eq!(job.state, Some(QState::Done));
        assert_eq!(job.sub_state, Some(SubState::Slurm(SlurmState::Completed)));
        assert_eq!(job.account.as_deref(), Some("matgenix-dwa"));
        assert_eq!(job.queue_name.as_deref(), Some("main"));
        assert_eq!(job.exit_status, Some(0));
        assert_eq!(job.runtime, Some(300));
        assert_eq!(job.info.nodes, Some(1));
        assert_eq!(job.info.cpus, Some(1));
        assert_eq!(job.info.threads_per_process, Some(1));
        assert_eq!(job.info.time_limit, None);
        assert_eq!(job.info.memory, None);
        assert_eq!(
            job.info.start_time.map(|t| t.to_rfc3339()),
            Some("2023-10-11T11:08:17+00:00".to_string())
        );
    }

    #[test]
    fn test_parse_empty_and_failed() {
        assert_eq!(parse_scontrol(&CommandOutput::new(0, "", "")).unwrap(), None);

        let err = parse_scontrol(&CommandOutput::new(
            1,
            "",
            "slurm_load_jobs error: Invalid job id specified\n",
        ))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "command scontrol failed: slurm_load_jobs error: Invalid job id specified"
        );
    }

    #[test]
    fn test_parse_bad_state() {
        let err = parse_scontrol(&CommandOutput::new(0, "JobId=4 JobState=LOST", ""))
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown job state LOST for job id 4");

        let err = parse_scontrol(&CommandOutput::new(0, "JobId=4 JobName=x", "")).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::OutputParsing { job_id: Some(ref id), .. } if id == "4"
        ));
    }
}

//! Single-job query through sacct.
//!
//! Unlike scontrol, sacct reads the accounting database and keeps reporting
//! jobs long after they finish.

use qbatch_core::{CommandOutput, QJob, QJobInfo, Result, SchedulerError, SlurmState};
use qbatch_parsers::{
    non_empty_string, parse_duration_secs, parse_exit_code, parse_memory_kb,
    parse_slurm_timestamp, split_delimited, DurationFormat, MemoryFormat,
};

/// sacct output format (--parsable2 uses | delimiter)
const SACCT_FORMAT: &str =
    "JobIDRaw,JobName,State,Partition,User,AllocCPUS,NNodes,ReqMem,Timelimit,Elapsed,ExitCode,Submit,Start";

const SACCT_FIELD_COUNT: usize = 13;

pub fn sacct_cmd(job_id: &str) -> String {
    format!("sacct -j {job_id} -X --parsable2 --noheader --format {SACCT_FORMAT}")
}

/// sacct states can have suffixes like "CANCELLED by 12345".
fn parse_state(state: &str, job_id: &str) -> Result<SlurmState> {
    let base = state.split_whitespace().next().unwrap_or(state);
    base.parse().map_err(|_| {
        SchedulerError::parsing(format!("Unknown job state {base} for job id {job_id}"))
            .with_job_id(job_id)
    })
}

/// Strip sub-second precision (e.g., "01:30:00.123" -> "01:30:00").
fn parse_elapsed(s: &str) -> Option<u64> {
    let clean = s.split('.').next().unwrap_or(s);
    parse_duration_secs(clean, DurationFormat::Slurm).ok().flatten()
}

fn parse_sacct_line(line: &str) -> Result<QJob> {
    let fields = split_delimited(line, "|", SACCT_FIELD_COUNT)
        .map_err(|msg| SchedulerError::parsing(msg).with_fragment(line))?;

    let job_id = fields[0];
    let state = parse_state(fields[2], job_id)?;

    // ReqMem ends in 'c' when requested per CPU, 'n' or nothing when per node.
    let req_mem = fields[7].trim();
    let mem_kb = parse_memory_kb(req_mem, MemoryFormat::SlurmSacct).ok().flatten();
    let (memory, memory_per_cpu) = if req_mem.ends_with('c') {
        (None, mem_kb)
    } else {
        (mem_kb, None)
    };

    let mut job = QJob {
        name: non_empty_string(fields[1]),
        job_id: Some(job_id.to_string()),
        exit_status: non_empty_string(fields[10]).map(|s| parse_exit_code(&s)),
        account: non_empty_string(fields[4]),
        runtime: parse_elapsed(fields[9]),
        queue_name: non_empty_string(fields[3]),
        info: QJobInfo {
            memory,
            memory_per_cpu,
            nodes: fields[6].parse().ok(),
            cpus: fields[5].parse().ok(),
            threads_per_process: None,
            time_limit: parse_duration_secs(fields[8], DurationFormat::Slurm)
                .ok()
                .flatten(),
            submit_time: parse_slurm_timestamp(fields[11]),
            start_time: parse_slurm_timestamp(fields[12]),
        },
        ..Default::default()
    };
    job.set_sub_state(state);
    Ok(job)
}

/// Parse sacct output for one job. No rows means the job is unknown.
pub fn parse_sacct(output: &CommandOutput) -> Result<Option<QJob>> {
    if !output.success() {
        return Err(SchedulerError::command_failed("sacct", output.stderr.trim()));
    }

    match output.stdout.lines().find(|l| !l.trim().is_empty()) {
        Some(line) => parse_sacct_line(line).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbatch_core::QState;

    #[test]
    fn test_sacct_cmd() {
        assert_eq!(
            sacct_cmd("12345"),
            "sacct -j 12345 -X --parsable2 --noheader --format \
             JobIDRaw,JobName,State,Partition,User,AllocCPUS,NNodes,ReqMem,Timelimit,Elapsed,\
             ExitCode,Submit,Start"
        );
    }

    #[test]
    fn test_parse_state() {
        assert_eq!(parse_state("COMPLETED", "1").unwrap(), SlurmState::Completed);
        assert_eq!(
            parse_state("CANCELLED by 12345", "1").unwrap(),
            SlurmState::Cancelled
        );
        let err = parse_state("WEIRD", "1").unwrap_err();
        assert_eq!(err.to_string(), "Unknown job state WEIRD for job id 1");
    }

    #[test]
    fn test_parse_sacct_line() {
        let line = "12345|test_job|FAILED|short|johndoe|4|1|4Gn|1:00:00|00:10:00.250|1:0|2024-01-15T10:00:00|2024-01-15T10:05:00";
        let job = parse_sacct_line(line).unwrap();
        assert_eq!(job.job_id.as_deref(), Some("12345"));
        assert_eq!(job.name.as_deref(), Some("test_job"));
        assert_eq!(job.state, Some(QState::Failed));
        assert_eq!(job.account.as_deref(), Some("johndoe"));
        assert_eq!(job.queue_name.as_deref(), Some("short"));
        assert_eq!(job.exit_status, Some(1));
        assert_eq!(job.runtime, Some(600));
        assert_eq!(job.info.cpus, Some(4));
        assert_eq!(job.info.nodes, Some(1));
        assert_eq!(job.info.memory, Some(4 * 1024 * 1024));
        assert_eq!(job.info.memory_per_cpu, None);
        assert_eq!(job.info.time_limit, Some(3600));
        assert!(job.info.submit_time.is_some());
    }

    #[test]
    fn test_parse_per_cpu_memory() {
        let line = "7|x|RUNNING|main|u|2|1|1000Mc|UNLIMITED|00:00:05|0:0|2024-01-15T10:00:00|Unknown";
        let job = parse_sacct_line(line).unwrap();
        assert_eq!(job.info.memory_per_cpu, Some(1000 * 1024));
        assert_eq!(job.info.memory, None);
        assert_eq!(job.info.time_limit, None);
        assert_eq!(job.info.start_time, None);
    }

    #[test]
    fn test_parse_sacct() {
        assert_eq!(parse_sacct(&CommandOutput::new(0, "\n", "")).unwrap(), None);

        let stdout = "42|relax|PENDING|main|u|1|1|2G|10:00|00:00:00|0:0|2024-01-15T10:00:00|Unknown\n";
        let job = parse_sacct(&CommandOutput::new(0, stdout, "")).unwrap().unwrap();
        assert_eq!(job.state, Some(QState::Queued));
        assert_eq!(job.info.time_limit, Some(600));

        let err = parse_sacct(&CommandOutput::new(1, "", "sacct: error: Problem talking to the database"))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::CommandFailed { .. }));

        let err = parse_sacct(&CommandOutput::new(0, "1|2|3", "")).unwrap_err();
        assert!(err.to_string().starts_with("Wrong number of fields"));
    }
}

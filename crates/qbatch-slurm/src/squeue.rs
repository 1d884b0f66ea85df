//! Job listing through squeue.

use qbatch_core::{
    check_ids_or_user, CommandOutput, QJob, QJobInfo, Result, SchedulerError, SlurmState,
};
use qbatch_parsers::{
    non_empty_string, parse_duration_secs, parse_memory_kb, split_delimited, DurationFormat,
    MemoryFormat,
};

/// Column separator for squeue output. Must not occur in job names.
pub const DEFAULT_SEPARATOR: &str = "<><>";

/// squeue format codes, in output order.
/// job id, compact state, reason, name, user, partition, time limit,
/// nodes, cpus, time used, minimum memory
const SQUEUE_FIELDS: [&str; 11] = [
    "%i", "%t", "%r", "%j", "%u", "%P", "%l", "%D", "%C", "%M", "%m",
];

/// Build the squeue listing command.
///
/// A single job id is repeated since squeue treats a one-element `--jobs`
/// list differently.
pub fn squeue_cmd(separator: &str, job_ids: Option<&[String]>, user: Option<&str>) -> Result<String> {
    check_ids_or_user("SLURM", job_ids, user)?;

    // The space after each separator keeps empty columns visible.
    let joiner = format!("{separator} ");
    let fields = SQUEUE_FIELDS.join(joiner.as_str());
    let mut cmd = format!("SLURM_TIME_FORMAT='standard' squeue --noheader -o '{fields}'");

    if let Some(user) = user {
        cmd.push_str(&format!(" -u {user}"));
    }

    if let Some(ids) = job_ids.filter(|ids| !ids.is_empty()) {
        let ids = match ids {
            [single] => format!("{single},{single}"),
            _ => ids.join(","),
        };
        cmd.push_str(&format!(" --jobs={ids}"));
    }

    Ok(cmd)
}

/// Parse squeue output into jobs. Lines without the separator are ignored.
pub fn parse_squeue(output: &CommandOutput, separator: &str) -> Result<Vec<QJob>> {
    if !output.success() {
        return Err(SchedulerError::command_failed("squeue", output.stderr.trim()));
    }

    let mut jobs = Vec::new();
    for line in output.stdout.lines() {
        if !line.contains(separator) {
            if !line.trim().is_empty() {
                tracing::debug!(line, "skipping squeue line without separator");
            }
            continue;
        }
        jobs.push(parse_squeue_line(line, separator)?);
    }
    Ok(jobs)
}

fn parse_squeue_line(line: &str, separator: &str) -> Result<QJob> {
    let fields: Vec<&str> = split_delimited(line, separator, SQUEUE_FIELDS.len())
        .map_err(|msg| SchedulerError::parsing(msg).with_fragment(line))?
        .into_iter()
        .map(str::trim)
        .collect();

    let job_id = fields[0];
    let state: SlurmState = fields[1].parse().map_err(|_| {
        SchedulerError::parsing(format!(
            "Unknown job state {} for job id {}",
            fields[1], job_id
        ))
        .with_job_id(job_id)
    })?;

    // A bad time limit is an error, a bad time used only means the job has not started.
    let time_limit = parse_duration_secs(fields[6], DurationFormat::Slurm)
        .map_err(|e| SchedulerError::from(e).with_job_id(job_id))?;
    let runtime = parse_duration_secs(fields[9], DurationFormat::Slurm)
        .ok()
        .flatten();

    let mut job = QJob {
        name: Some(fields[3].to_string()),
        job_id: Some(job_id.to_string()),
        account: non_empty_string(fields[4]),
        queue_name: non_empty_string(fields[5]),
        runtime,
        info: QJobInfo {
            nodes: fields[7].parse().ok(),
            cpus: fields[8].parse().ok(),
            memory_per_cpu: parse_memory_kb(fields[10], MemoryFormat::Slurm).ok().flatten(),
            time_limit,
            ..Default::default()
        },
        ..Default::default()
    };
    job.set_sub_state(state);
    Ok(job)
}

//! Process listing through `ps`.

use qbatch_core::{CommandOutput, QJob, Result, SchedulerError, ShellState};
use qbatch_parsers::{parse_duration_secs, DurationFormat};

/// `etime` rather than `etimes`, which older procps lacks.
const PS_COLUMNS: &str = "pid,user,etime,state,comm";

const PS_FIELD_COUNT: usize = 5;

/// Build the `ps` command for the given pids or user.
pub fn ps_cmd(pids: Option<&[String]>, user: Option<&str>) -> Result<String> {
    let pids = pids.filter(|ids| !ids.is_empty());
    if user.is_some() && pids.is_some() {
        return Err(SchedulerError::InvalidArgument(
            "Cannot query by user and job(s) with ps, as the user option will override the ids list"
                .to_string(),
        ));
    }

    let mut cmd = format!("ps -o {PS_COLUMNS}");
    if let Some(user) = user {
        cmd.push_str(&format!(" -U {user}"));
    }
    if let Some(pids) = pids {
        cmd.push_str(&format!(" -p {}", pids.join(",")));
    }
    Ok(cmd)
}

fn parse_ps_line(line: &str) -> Result<QJob> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    // comm may contain spaces; everything after the state belongs to it
    if fields.len() < PS_FIELD_COUNT {
        return Err(SchedulerError::parsing(format!(
            "Wrong number of fields. Found {}, expected {}: {}",
            fields.len(),
            PS_FIELD_COUNT,
            line.trim()
        ))
        .with_fragment(line));
    }

    let pid = fields[0];
    let raw_state = fields[3];
    // ps may append modifiers such as "s" or "+" after the state letter
    let state: ShellState = raw_state
        .get(..1)
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| {
            SchedulerError::parsing(format!("Unknown job state {raw_state} for job id {pid}"))
                .with_job_id(pid)
        })?;

    let runtime = parse_duration_secs(fields[2], DurationFormat::Etime)
        .map_err(|e| SchedulerError::from(e).with_job_id(pid))?;

    let mut job = QJob {
        job_id: Some(pid.to_string()),
        account: Some(fields[1].to_string()),
        runtime,
        name: Some(fields[4..].join(" ")),
        ..Default::default()
    };
    job.set_sub_state(state);
    Ok(job)
}

/// Parse `ps` output, skipping the header row.
///
/// ps exits non-zero when none of the requested pids exist. That only counts
/// as a failure when something was printed on stderr.
pub fn parse_ps(output: &CommandOutput) -> Result<Vec<QJob>> {
    if !output.success() && !output.stderr.trim().is_empty() {
        return Err(SchedulerError::command_failed("ps", output.stderr.trim()));
    }

    output
        .stdout
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(parse_ps_line)
        .collect()
}

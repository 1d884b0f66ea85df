//! PBS Pro / Torque adapter.

use crate::qsub::{self, COMMON_KEYS};
use once_cell::sync::Lazy;
use qbatch_core::{
    insert_header, CancelResult, CommandOutput, HeaderMap, PbsState, QJob, QJobInfo, QResources,
    ResourceKey, Result, SchedulerError, SchedulerIo, SubmissionResult,
};
use qbatch_parsers::{non_empty_string, parse_memory_kb, MemoryFormat};
use regex::Regex;
use std::collections::HashMap;

pub const PBS_HEADER_TEMPLATE: &str = "
#PBS -q $${queue}
#PBS -N $${job_name}
#PBS -A $${account}
#PBS -l $${select}
#PBS -l walltime=$${walltime}
#PBS -l model=$${model}
#PBS -l place=$${place}
#PBS -W group_list=$${group_list}
#PBS -M $${mail_user}
#PBS -m $${mail_type}
#PBS -o $${qout_path}
#PBS -e $${qerr_path}
#PBS -p $${priority}
#PBS -r $${rerunnable}
#PBS -J $${array}
$${qverbatim}";

static SUPPORTED_KEYS: Lazy<Vec<ResourceKey>> = Lazy::new(|| {
    let mut keys = vec![
        ResourceKey::QueueName,
        ResourceKey::JobName,
        ResourceKey::Account,
        ResourceKey::Priority,
        ResourceKey::OutputFilepath,
        ResourceKey::ErrorFilepath,
        ResourceKey::Project,
        ResourceKey::MemoryPerThread,
        ResourceKey::Rerunnable,
    ];
    keys.extend_from_slice(COMMON_KEYS);
    keys
});

/// Start of a job block in `qstat -f` output.
static JOB_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*Job Id: ").expect("valid job id regex"));

/// `key = value` attribute line; keys may contain dots. Both sides of `=`
/// need whitespace, so wrapped values holding `x =y` stay continuations.
static ATTRIBUTE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_.]+)\s+=\s+(.*)$").expect("valid attribute regex")
});

#[derive(Debug, Clone, Default)]
pub struct PbsIo;

impl PbsIo {
    pub fn new() -> Self {
        Self
    }
}

/// Split one `qstat -f` job block into attributes.
///
/// Long values wrap onto indented continuation lines, which are glued back
/// onto the previous value.
fn parse_attributes(block: &str) -> HashMap<String, String> {
    let mut attributes: HashMap<String, String> = HashMap::new();
    let mut current: Option<String> = None;

    for line in block.lines() {
        if let Some(caps) = ATTRIBUTE_RE.captures(line) {
            let key = caps[1].to_string();
            attributes.insert(key.clone(), caps[2].trim_end().to_string());
            current = Some(key);
        } else if let Some(value) = current.as_ref().and_then(|k| attributes.get_mut(k)) {
            value.push_str(line.trim());
        }
    }
    attributes
}

fn parse_job_block(job_id: &str, block: &str) -> Result<Option<QJob>> {
    let data = parse_attributes(block);
    if data.is_empty() {
        return Ok(None);
    }
    let get = |key: &str| data.get(key).map(String::as_str).unwrap_or_default();

    let raw_state = data.get("job_state").ok_or_else(|| {
        SchedulerError::parsing(format!("job_state missing for job id {job_id}"))
            .with_job_id(job_id)
    })?;
    let state: PbsState = raw_state.parse().map_err(|_| {
        SchedulerError::parsing(format!(
            "Unknown job state {raw_state} for job id {job_id}"
        ))
        .with_job_id(job_id)
    })?;

    let time_limit = qsub::parse_qsub_time(get("Resource_List.walltime"))
        .map_err(|e| e.with_job_id(job_id))?;
    let runtime = qsub::parse_qsub_time(get("resources_used.walltime"))
        .ok()
        .flatten();

    let mut job = QJob {
        name: non_empty_string(get("Job_Name")),
        job_id: Some(job_id.to_string()),
        exit_status: get("Exit_status").trim().parse().ok(),
        account: non_empty_string(get("Job_Owner")),
        runtime,
        queue_name: non_empty_string(get("queue")),
        info: QJobInfo {
            nodes: get("Resource_List.nodect").trim().parse().ok(),
            cpus: get("Resource_List.ncpus").trim().parse().ok(),
            memory_per_cpu: parse_memory_kb(get("Resource_List.mem"), MemoryFormat::Pbs)
                .ok()
                .flatten(),
            time_limit,
            ..Default::default()
        },
        ..Default::default()
    };
    job.set_sub_state(state);
    Ok(Some(job))
}

/// Parse `qstat -f` output, keeping jobs in output order.
///
/// The exit code is ignored: qstat fails when some of the requested jobs are
/// unknown or finished but still prints the others.
pub fn parse_qstat_full(stdout: &str) -> Result<Vec<QJob>> {
    let mut jobs = Vec::new();
    for chunk in JOB_ID_RE.split(stdout) {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        let Some((job_id, block)) = chunk.split_once('\n') else {
            tracing::debug!(chunk, "skipping qstat block without attributes");
            continue;
        };
        if let Some(job) = parse_job_block(job_id.trim(), block)? {
            jobs.push(job);
        }
    }
    Ok(jobs)
}

impl SchedulerIo for PbsIo {
    fn system_name(&self) -> &str {
        "PBS"
    }

    fn header_template(&self) -> &str {
        PBS_HEADER_TEMPLATE
    }

    fn submit_cmd(&self) -> &str {
        "qsub"
    }

    fn cancel_cmd(&self) -> &str {
        "qdel"
    }

    fn supported_qresources_keys(&self) -> &[ResourceKey] {
        &SUPPORTED_KEYS
    }

    fn convert_qresources(&self, resources: &QResources) -> Result<HeaderMap> {
        let mut header = HeaderMap::new();
        insert_header(&mut header, "queue", resources.queue_name.as_ref());
        insert_header(&mut header, "job_name", resources.job_name.as_ref());
        insert_header(&mut header, "account", resources.account.as_ref());
        insert_header(&mut header, "priority", resources.priority.as_ref());
        insert_header(&mut header, "qout_path", resources.output_filepath.as_ref());
        insert_header(&mut header, "qerr_path", resources.error_filepath.as_ref());
        insert_header(&mut header, "group_list", resources.project.as_ref());

        qsub::convert_common(resources, self.system_name(), false, &mut header)?;
        header.extend(resources.scheduler_kwargs.clone());
        Ok(header)
    }

    fn job_cmd(&self, job_id: &str) -> String {
        format!("qstat -f {job_id}")
    }

    fn jobs_list_cmd(&self, job_ids: Option<&[String]>, user: Option<&str>) -> Result<String> {
        qsub::qstat_list_cmd(self.system_name(), "qstat -f", job_ids, user, |ids| ids.join(" "))
    }

    // qsub prints the bare job id
    fn parse_submit(&self, output: &CommandOutput) -> Result<SubmissionResult> {
        let job_id = non_empty_string(&output.stdout);
        Ok(qsub::submission_result(output, job_id))
    }

    fn parse_cancel(&self, output: &CommandOutput) -> Result<CancelResult> {
        Ok(qsub::cancel_result(output, None))
    }

    fn parse_job(&self, output: &CommandOutput) -> Result<Option<QJob>> {
        Ok(self.parse_jobs_list(output)?.into_iter().next())
    }

    fn parse_jobs_list(&self, output: &CommandOutput) -> Result<Vec<QJob>> {
        if !output.success() {
            tracing::debug!(
                exit_code = output.exit_code,
                stderr = output.stderr.trim(),
                "qstat reported errors, parsing remaining output"
            );
        }
        parse_qstat_full(&output.stdout)
    }
}

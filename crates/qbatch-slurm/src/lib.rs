//! SLURM adapter for qbatch.
//!
//! Renders `#SBATCH` headers and builds `sbatch`, `scancel` and `squeue`
//! command lines, then reads their output back. Single jobs are queried with
//! `scontrol` by default, or with `sacct`, which also sees finished jobs when
//! the accounting database is available.

pub mod sacct;
pub mod scontrol;
pub mod squeue;

use once_cell::sync::Lazy;
use qbatch_core::{
    insert_header, CancelResult, CancelStatus, CommandOutput, HeaderMap, QJob, QResources,
    ResourceKey, Result, SchedulerIo, SubmissionResult, SubmissionStatus,
};
use qbatch_parsers::format_duration_slurm;
use regex::Regex;

pub use squeue::DEFAULT_SEPARATOR;

pub const SLURM_HEADER_TEMPLATE: &str = "
#SBATCH --partition=$${partition}
#SBATCH --job-name=$${job_name}
#SBATCH --nodes=$${nodes}
#SBATCH --ntasks=$${ntasks}
#SBATCH --ntasks-per-node=$${ntasks_per_node}
#SBATCH --cpus-per-task=$${cpus_per_task}
#SBATCH --mem=$${mem}
#SBATCH --mem-per-cpu=$${mem_per_cpu}
#SBATCH --hint=$${hint}
#SBATCH --time=$${time}
#SBATCH --exclude=$${exclude_nodes}
#SBATCH --account=$${account}
#SBATCH --mail-user=$${mail_user}
#SBATCH --mail-type=$${mail_type}
#SBATCH --constraint=$${constraint}
#SBATCH --gres=$${gres}
#SBATCH --requeue=$${requeue}
#SBATCH --nodelist=$${nodelist}
#SBATCH --propagate=$${propagate}
#SBATCH --licenses=$${licenses}
#SBATCH --output=$${qout_path}
#SBATCH --error=$${qerr_path}
#SBATCH --qos=$${qos}
#SBATCH --priority=$${priority}
#SBATCH --array=$${array}
#SBATCH --exclusive=$${exclusive}
$${qverbatim}";

const SUPPORTED_KEYS: &[ResourceKey] = &[
    ResourceKey::QueueName,
    ResourceKey::JobName,
    ResourceKey::MemoryPerThread,
    ResourceKey::Account,
    ResourceKey::Qos,
    ResourceKey::Priority,
    ResourceKey::OutputFilepath,
    ResourceKey::ErrorFilepath,
    ResourceKey::Njobs,
    ResourceKey::TimeLimit,
    ResourceKey::Processes,
    ResourceKey::ProcessesPerNode,
    ResourceKey::ProcessPlacement,
    ResourceKey::Nodes,
    ResourceKey::ThreadsPerProcess,
    ResourceKey::GpusPerJob,
    ResourceKey::EmailAddress,
    ResourceKey::SchedulerKwargs,
];

static SUBMITTED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*:\s*)?([Gg]ranted job allocation|[Ss]ubmitted batch job)\s+(?P<jobid>\d+)")
        .expect("valid sbatch regex")
});

static CANCELLED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*:\s*)?(Terminating job)\s+(?P<jobid>\d+)").expect("valid scancel regex")
});

/// Tool used to query a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobQueryTool {
    /// `scontrol show job`: queued and recently finished jobs.
    #[default]
    Scontrol,
    /// `sacct`: needs slurmdbd, keeps finished jobs.
    Sacct,
}

impl JobQueryTool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scontrol => "scontrol",
            Self::Sacct => "sacct",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SlurmIo {
    job_query: JobQueryTool,
    separator: String,
}

impl Default for SlurmIo {
    fn default() -> Self {
        Self {
            job_query: JobQueryTool::default(),
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

impl SlurmIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use another squeue column separator. It must not occur in job data.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_job_query(mut self, tool: JobQueryTool) -> Self {
        self.job_query = tool;
        self
    }

    pub fn job_query(&self) -> JobQueryTool {
        self.job_query
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }
}

impl SchedulerIo for SlurmIo {
    fn system_name(&self) -> &str {
        "SLURM"
    }

    fn header_template(&self) -> &str {
        SLURM_HEADER_TEMPLATE
    }

    fn submit_cmd(&self) -> &str {
        "sbatch"
    }

    // scancel prints nothing without -v
    fn cancel_cmd(&self) -> &str {
        "scancel -v"
    }

    fn supported_qresources_keys(&self) -> &[ResourceKey] {
        SUPPORTED_KEYS
    }

    fn convert_qresources(&self, resources: &QResources) -> Result<HeaderMap> {
        let mut header = HeaderMap::new();
        insert_header(&mut header, "partition", resources.queue_name.as_ref());
        insert_header(&mut header, "job_name", resources.job_name.as_ref());
        insert_header(&mut header, "mem_per_cpu", resources.memory_per_thread);
        insert_header(&mut header, "account", resources.account.as_ref());
        insert_header(&mut header, "qos", resources.qos.as_ref());
        insert_header(&mut header, "priority", resources.priority.as_ref());
        insert_header(&mut header, "qout_path", resources.output_filepath.as_ref());
        insert_header(&mut header, "qerr_path", resources.error_filepath.as_ref());

        if let Some(njobs) = resources.njobs.filter(|&n| n > 1) {
            header.insert("array".into(), format!("1-{njobs}"));
        }
        insert_header(
            &mut header,
            "time",
            resources
                .time_limit
                .filter(|&t| t > 0)
                .map(format_duration_slurm),
        );

        let dist = resources.get_processes_distribution()?;
        insert_header(&mut header, "ntasks", dist.processes.filter(|&n| n > 0));
        insert_header(
            &mut header,
            "ntasks_per_node",
            dist.processes_per_node.filter(|&n| n > 0),
        );
        insert_header(&mut header, "nodes", dist.nodes.filter(|&n| n > 0));

        insert_header(
            &mut header,
            "cpus_per_task",
            resources.threads_per_process.filter(|&n| n > 0),
        );
        insert_header(
            &mut header,
            "gres",
            resources
                .gpus_per_job
                .filter(|&n| n > 0)
                .map(|n| format!("gpu:{n}")),
        );
        if let Some(email) = resources.email_address.as_deref().filter(|e| !e.is_empty()) {
            header.insert("mail_user".into(), email.to_string());
            header.insert("mail_type".into(), "ALL".into());
        }

        header.extend(resources.scheduler_kwargs.clone());
        Ok(header)
    }

    fn job_cmd(&self, job_id: &str) -> String {
        match self.job_query {
            JobQueryTool::Scontrol => scontrol::scontrol_cmd(job_id),
            JobQueryTool::Sacct => sacct::sacct_cmd(job_id),
        }
    }

    fn jobs_list_cmd(&self, job_ids: Option<&[String]>, user: Option<&str>) -> Result<String> {
        squeue::squeue_cmd(&self.separator, job_ids, user)
    }

    fn parse_submit(&self, output: &CommandOutput) -> Result<SubmissionResult> {
        if !output.success() {
            return Ok(SubmissionResult::new(output, None, SubmissionStatus::Failed));
        }
        let job_id = SUBMITTED_RE
            .captures(output.stdout.trim())
            .map(|caps| caps["jobid"].to_string());
        let status = match job_id {
            Some(_) => SubmissionStatus::Successful,
            None => SubmissionStatus::JobIdUnknown,
        };
        Ok(SubmissionResult::new(output, job_id, status))
    }

    fn parse_cancel(&self, output: &CommandOutput) -> Result<CancelResult> {
        // Possible failures:
        //   scancel: error: No job identification provided
        //   scancel: error: Kill job error on job id 958: Invalid job id specified
        if !output.success() {
            return Ok(CancelResult::new(output, None, CancelStatus::Failed));
        }
        // Cancelling an already finished job also exits 0 without the message.
        let job_id = CANCELLED_RE
            .captures(output.stderr.trim())
            .map(|caps| caps["jobid"].to_string());
        let status = match job_id {
            Some(_) => CancelStatus::Successful,
            None => CancelStatus::JobIdUnknown,
        };
        Ok(CancelResult::new(output, job_id, status))
    }

    fn parse_job(&self, output: &CommandOutput) -> Result<Option<QJob>> {
        match self.job_query {
            JobQueryTool::Scontrol => scontrol::parse_scontrol(output),
            JobQueryTool::Sacct => sacct::parse_sacct(output),
        }
    }

    fn parse_jobs_list(&self, output: &CommandOutput) -> Result<Vec<QJob>> {
        squeue::parse_squeue(output, &self.separator)
    }
}

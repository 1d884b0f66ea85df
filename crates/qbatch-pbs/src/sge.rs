//! Sun/Son of Grid Engine adapter.
//!
//! Listings come from `qstat -xml`. Single jobs are read from `qstat -j`,
//! which prints either XML or `key: value` text depending on the site setup.

use crate::qsub::{self, COMMON_KEYS};
use once_cell::sync::Lazy;
use qbatch_core::{
    insert_header, CancelResult, CommandOutput, HeaderMap, QJob, QJobInfo, QResources,
    ResourceKey, Result, SchedulerError, SchedulerIo, SgeState, SubmissionResult,
};
use qbatch_parsers::{non_empty_string, parse_memory_kb, MemoryFormat};
use regex::Regex;
use roxmltree::{Document, Node};
use std::collections::HashMap;

pub const SGE_HEADER_TEMPLATE: &str = "
#$ -cwd $${cwd}
#$ -q $${queue}
#$ -N $${job_name}
#$ -P $${device}
#$ -l $${select}
#$ -l gpu=$${gpus}
#$ -l h_rt=$${walltime}
#$ -l s_rt=$${soft_walltime}
#$ -pe $${model}
#$ -binding $${place}
#$ -W group_list=$${group_list}
#$ -M $${mail_user}
#$ -m $${mail_type}
#$ -o $${qout_path}
#$ -e $${qerr_path}
#$ -p $${priority}
#$ -r $${rerunnable}
#$ -t $${array}
$${qverbatim}";

pub const DEFAULT_JOB_QUERY: &str = "qstat";

static SUPPORTED_KEYS: Lazy<Vec<ResourceKey>> = Lazy::new(|| {
    let mut keys = vec![
        ResourceKey::QueueName,
        ResourceKey::JobName,
        ResourceKey::Priority,
        ResourceKey::OutputFilepath,
        ResourceKey::ErrorFilepath,
        ResourceKey::Project,
        ResourceKey::MemoryPerThread,
        ResourceKey::GpusPerJob,
    ];
    keys.extend_from_slice(COMMON_KEYS);
    keys
});

static SUBMITTED_RES: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r#"Your job (\d+) \(".*?"\) has been submitted"#).expect("valid job regex"),
        Regex::new(r#"Your job-array (\d+)\.\d+-\d+:\d+ \(".*?"\) has been submitted"#)
            .expect("valid job-array regex"),
    ]
});

static CANCELLED_RES: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"qdel: job (\d+) deleted").expect("valid qdel regex"),
        Regex::new(r"has deleted job (\d+)").expect("valid qdel regex"),
        Regex::new(r"has registered the job (\d+) for deletion").expect("valid qdel regex"),
    ]
});

/// Output of an MPI run that failed inside a job that SGE still reports as fine.
static MPI_FAILURE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"Primary job\s+terminated normally, but\s+(\d+)\s+process returned a non-zero exit code",
        r"mpiexec detected that one or more processes exited with non-zero status",
        r"An error occurred in MPI_Allreduce",
        r"Error: mca_pml_ucx_send_nbr failed: -25, Connection reset by remote peer",
        r"mpi_errors_are_fatal",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).expect("valid MPI failure regex"))
    .collect()
});

fn first_capture<'a>(patterns: &[Regex], texts: &[&'a str]) -> Option<&'a str> {
    texts.iter().find_map(|text| {
        patterns
            .iter()
            .find_map(|re| re.captures(text))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    })
}

#[derive(Debug, Clone)]
pub struct SgeIo {
    job_query: String,
}

impl Default for SgeIo {
    fn default() -> Self {
        Self::new()
    }
}

impl SgeIo {
    pub fn new() -> Self {
        Self {
            job_query: DEFAULT_JOB_QUERY.to_string(),
        }
    }

    /// Use another tool for single-job queries, e.g. a site wrapper around qstat.
    pub fn with_job_query(mut self, tool: impl Into<String>) -> Self {
        self.job_query = tool.into();
        self
    }

    pub fn job_query(&self) -> &str {
        &self.job_query
    }
}

fn child_text<'a>(node: Node<'a, '_>, tag: &str) -> &'a str {
    node.children()
        .find(|c| c.has_tag_name(tag))
        .and_then(|c| c.text())
        .unwrap_or_default()
}

fn hard_request<'a>(node: Node<'a, '_>, name: &str) -> &'a str {
    node.children()
        .find(|c| c.has_tag_name("hard_request") && c.attribute("name") == Some(name))
        .and_then(|c| c.text())
        .unwrap_or_default()
}

fn parse_state(raw: &str, job_id: &str) -> Result<SgeState> {
    raw.trim().parse().map_err(|_| {
        SchedulerError::parsing(format!("Unknown job state {raw} for job id {job_id}"))
            .with_job_id(job_id)
    })
}

fn job_from_xml(node: Node<'_, '_>) -> Result<QJob> {
    let job_id = child_text(node, "JB_job_number").trim();
    let state = parse_state(child_text(node, "state"), job_id)?;
    let time_limit =
        qsub::parse_qsub_time(hard_request(node, "h_rt")).map_err(|e| e.with_job_id(job_id))?;

    let mut job = QJob {
        name: non_empty_string(child_text(node, "JB_name")),
        job_id: non_empty_string(job_id),
        account: non_empty_string(child_text(node, "JB_owner")),
        queue_name: non_empty_string(child_text(node, "queue_name")),
        info: QJobInfo {
            cpus: child_text(node, "slots").trim().parse().ok(),
            memory_per_cpu: parse_memory_kb(hard_request(node, "mem_free"), MemoryFormat::Sge)
                .ok()
                .flatten(),
            time_limit,
            ..Default::default()
        },
        ..Default::default()
    };
    job.set_sub_state(state);
    Ok(job)
}

fn parse_xml_document(stdout: &str) -> Result<Document<'_>> {
    Document::parse(stdout).map_err(|e| {
        tracing::debug!(error = %e, "invalid qstat XML");
        SchedulerError::parsing("XML parsing of stdout failed").with_fragment(e.to_string())
    })
}

/// Parse `qstat -xml` output. Running and pending jobs are both collected,
/// in document order.
pub fn parse_qstat_xml(stdout: &str) -> Result<Vec<QJob>> {
    let doc = parse_xml_document(stdout)?;
    doc.descendants()
        .filter(|n| n.has_tag_name("job_list"))
        .map(job_from_xml)
        .collect()
}

/// Parse the `key: value` text printed by `qstat -j`.
fn parse_job_text(stdout: &str) -> Result<QJob> {
    let mut data: HashMap<&str, &str> = HashMap::new();
    for line in stdout.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        // "job_state    1:" carries the task number after the key
        if let Some(key) = key.split_whitespace().next() {
            data.insert(key, value.trim());
        }
    }
    let field = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| data.get(k).copied())
            .unwrap_or_default()
    };

    let job_id = field(&["job_number", "job_id"]);
    let raw_state = field(&["job_state", "state"]);
    if raw_state.is_empty() {
        let err = SchedulerError::parsing("Job state not found in qstat output");
        return Err(match non_empty_string(job_id) {
            Some(id) => err.with_job_id(id),
            None => err,
        });
    }
    let state = parse_state(raw_state, job_id)?;

    let slots = non_empty_string(field(&["slots"])).unwrap_or_else(|| "1".into());
    let tasks = non_empty_string(field(&["tasks"])).unwrap_or_else(|| "1".into());
    let (cpus, nodes, threads) = match (slots.parse::<u32>(), tasks.parse::<u32>()) {
        (Ok(cpus), Ok(nodes)) if nodes > 0 => (Some(cpus), Some(nodes), Some(cpus / nodes)),
        _ => (None, None, None),
    };

    let mut job = QJob {
        name: non_empty_string(field(&["job_name"])),
        job_id: non_empty_string(job_id),
        account: non_empty_string(field(&["owner"])),
        queue_name: non_empty_string(field(&["hard_queue_list", "queue_name"])),
        info: QJobInfo {
            cpus,
            nodes,
            threads_per_process: threads,
            ..Default::default()
        },
        ..Default::default()
    };
    job.set_sub_state(state);
    Ok(job)
}

impl SchedulerIo for SgeIo {
    fn system_name(&self) -> &str {
        "SGE"
    }

    fn header_template(&self) -> &str {
        SGE_HEADER_TEMPLATE
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
        insert_header(&mut header, "priority", resources.priority.as_ref());
        insert_header(&mut header, "qout_path", resources.output_filepath.as_ref());
        insert_header(&mut header, "qerr_path", resources.error_filepath.as_ref());
        insert_header(&mut header, "group_list", resources.project.as_ref());

        qsub::convert_common(resources, self.system_name(), true, &mut header)?;
        insert_header(
            &mut header,
            "gpus",
            resources.gpus_per_job.filter(|&g| g > 0),
        );
        header.extend(resources.scheduler_kwargs.clone());
        Ok(header)
    }

    fn job_cmd(&self, job_id: &str) -> String {
        format!("{} -j {job_id}", self.job_query)
    }

    fn jobs_list_cmd(&self, job_ids: Option<&[String]>, user: Option<&str>) -> Result<String> {
        qsub::qstat_list_cmd(self.system_name(), "qstat -ext -urg -xml", job_ids, user, |ids| {
            format!("-j {}", ids.join(","))
        })
    }

    fn parse_submit(&self, output: &CommandOutput) -> Result<SubmissionResult> {
        let texts = [output.stdout.as_str(), output.stderr.as_str()];
        let job_id = first_capture(&SUBMITTED_RES[..], &texts);
        Ok(qsub::submission_result(output, job_id.map(str::to_string)))
    }

    fn parse_cancel(&self, output: &CommandOutput) -> Result<CancelResult> {
        let texts = [output.stderr.as_str(), output.stdout.as_str()];
        let job_id = first_capture(&CANCELLED_RES[..], &texts);
        Ok(qsub::cancel_result(output, job_id.map(str::to_string)))
    }

    fn parse_job(&self, output: &CommandOutput) -> Result<Option<QJob>> {
        if !output.success() {
            return Err(SchedulerError::command_failed(
                &self.job_query,
                output.stderr.trim(),
            ));
        }

        for text in [&output.stderr, &output.stdout] {
            if let Some(re) = MPI_FAILURE_RES.iter().find(|re| re.is_match(text)) {
                tracing::warn!(pattern = re.as_str(), "MPI failure detected in job output");
                return Err(SchedulerError::command_failed(
                    &self.job_query,
                    format!("MPI failure detected: {}", text.trim()),
                ));
            }
        }

        let stdout = output.stdout.trim();
        if stdout.is_empty() {
            return Ok(None);
        }
        if stdout.starts_with('<') {
            let doc = parse_xml_document(stdout)?;
            return doc
                .descendants()
                .find(|n| n.has_tag_name("job_list"))
                .map(job_from_xml)
                .transpose();
        }
        parse_job_text(stdout).map(Some)
    }

    fn parse_jobs_list(&self, output: &CommandOutput) -> Result<Vec<QJob>> {
        if !output.success() {
            return Err(SchedulerError::command_failed("qstat", output.stderr.trim()));
        }
        parse_qstat_xml(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbatch_core::{
        CancelStatus, JobRef, QState, RunCommands, ScriptOptions, SubState, SubmissionStatus,
    };

    const QSTAT_XML: &str = r#"<?xml version='1.0'?>
<job_info  xmlns:xsd="http://arc.liv.ac.uk/repos/darcs/sge/source/dist/util/resources/schemas/qstat/qstat.xsd">
  <queue_info>
    <job_list state="running">
      <JB_job_number>2710</JB_job_number>
      <JAT_prio>0.55500</JAT_prio>
      <JB_name>relax</JB_name>
      <JB_owner>johndoe</JB_owner>
      <state>r</state>
      <JAT_start_time>2024-01-15T10:05:00</JAT_start_time>
      <queue_name>all.q@node01</queue_name>
      <slots>4</slots>
      <hard_request name="h_rt" resource_contribution="0.000000">01:00:00</hard_request>
      <hard_request name="mem_free" resource_contribution="0.000000">2G</hard_request>
    </job_list>
  </queue_info>
  <job_info>
    <job_list state="pending">
      <JB_job_number>2711</JB_job_number>
      <JAT_prio>0.00000</JAT_prio>
      <JB_name>static</JB_name>
      <JB_owner>johndoe</JB_owner>
      <state>Eqw</state>
      <JB_submission_time>2024-01-15T10:06:00</JB_submission_time>
      <queue_name></queue_name>
      <slots>1</slots>
    </job_list>
  </job_info>
</job_info>
"#;

    const QSTAT_J: &str = "\
==============================================================
job_number:                 2710
exec_file:                  job_scripts/2710
submission_time:            Mon Jan 15 10:00:00 2024
owner:                      johndoe
sge_o_home:                 /home/johndoe
job_name:                   relax
hard_queue_list:            all.q
slots:                      8
tasks:                      2
job_state             1:    r
";

    #[test]
    fn test_parse_jobs_list() {
        let jobs = SgeIo::new()
            .parse_jobs_list(&CommandOutput::new(0, QSTAT_XML, ""))
            .unwrap();
        assert_eq!(jobs.len(), 2);

        let running = &jobs[0];
        assert_eq!(running.job_id.as_deref(), Some("2710"));
        assert_eq!(running.name.as_deref(), Some("relax"));
        assert_eq!(running.state, Some(QState::Running));
        assert_eq!(running.account.as_deref(), Some("johndoe"));
        assert_eq!(running.queue_name.as_deref(), Some("all.q@node01"));
        assert_eq!(running.info.cpus, Some(4));
        assert_eq!(running.info.time_limit, Some(3600));
        assert_eq!(running.info.memory_per_cpu, Some(2 * 1024 * 1024));

        let errored = &jobs[1];
        assert_eq!(errored.state, Some(QState::Failed));
        assert_eq!(errored.sub_state, Some(SubState::Sge(SgeState::ErrorPending)));
        assert_eq!(errored.queue_name, None);
        assert_eq!(errored.info.time_limit, None);
    }

    #[test]
    fn test_parse_jobs_list_errors() {
        let err = SgeIo::new()
            .parse_jobs_list(&CommandOutput::new(0, "<job_info><job_list>", ""))
            .unwrap_err();
        assert_eq!(err.to_string(), "XML parsing of stdout failed");

        let err = SgeIo::new()
            .parse_jobs_list(&CommandOutput::new(1, "", "error: no such user"))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::CommandFailed { .. }));

        let xml = "<job_info><job_list><JB_job_number>5</JB_job_number><state>q</state></job_list></job_info>";
        let err = SgeIo::new()
            .parse_jobs_list(&CommandOutput::new(0, xml, ""))
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown job state q for job id 5");
    }

    #[test]
    fn test_parse_job_text() {
        let job = SgeIo::new()
            .parse_job(&CommandOutput::new(0, QSTAT_J, ""))
            .unwrap()
            .unwrap();
        assert_eq!(job.job_id.as_deref(), Some("2710"));
        assert_eq!(job.name.as_deref(), Some("relax"));
        assert_eq!(job.account.as_deref(), Some("johndoe"));
        assert_eq!(job.queue_name.as_deref(), Some("all.q"));
        assert_eq!(job.state, Some(QState::Running));
        assert_eq!(job.info.cpus, Some(8));
        assert_eq!(job.info.nodes, Some(2));
        assert_eq!(job.info.threads_per_process, Some(4));
    }

    #[test]
    fn test_parse_job_text_defaults() {
        let job = parse_job_text("job_number: 3\nstate: qw\n").unwrap();
        assert_eq!(job.state, Some(QState::Queued));
        assert_eq!(job.info.cpus, Some(1));
        assert_eq!(job.info.nodes, Some(1));

        let job = parse_job_text("job_number: 3\nstate: qw\nslots: 2-4\n").unwrap();
        assert_eq!(job.info.cpus, None);
        assert_eq!(job.info.threads_per_process, None);

        let err = parse_job_text("job_number: 3\n").unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::OutputParsing { job_id: Some(ref id), .. } if id == "3"
        ));
    }

    #[test]
    fn test_parse_job_xml_and_empty() {
        let job = SgeIo::new()
            .parse_job(&CommandOutput::new(0, QSTAT_XML, ""))
            .unwrap()
            .unwrap();
        assert_eq!(job.job_id.as_deref(), Some("2710"));

        assert_eq!(
            SgeIo::new().parse_job(&CommandOutput::new(0, "\n", "")).unwrap(),
            None
        );
    }

    #[test]
    fn test_parse_job_failures() {
        let sge = SgeIo::new().with_job_query("qstat_wrapper");
        let err = sge
            .parse_job(&CommandOutput::new(1, "", "Following jobs do not exist: 9"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "command qstat_wrapper failed: Following jobs do not exist: 9"
        );

        let stderr = "Primary job  terminated normally, but 1 process returned\n\
                      a non-zero exit code.";
        let err = sge
            .parse_job(&CommandOutput::new(0, QSTAT_J, stderr.replace('\n', " ")))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::CommandFailed { .. }));

        let err = sge
            .parse_job(&CommandOutput::new(0, "... MPI_ERRORS_ARE_FATAL ...", ""))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::CommandFailed { .. }));
    }

    #[test]
    fn test_parse_submit() {
        let sge = SgeIo::new();
        let sr = sge
            .parse_submit(&CommandOutput::new(
                0,
                "Your job 2710 (\"relax\") has been submitted\n",
                "",
            ))
            .unwrap();
        assert_eq!(sr.job_id.as_deref(), Some("2710"));
        assert_eq!(sr.status, SubmissionStatus::Successful);

        let sr = sge
            .parse_submit(&CommandOutput::new(
                0,
                "Your job-array 2712.1-10:1 (\"sweep\") has been submitted\n",
                "",
            ))
            .unwrap();
        assert_eq!(sr.job_id.as_deref(), Some("2712"));

        let sr = sge.parse_submit(&CommandOutput::new(0, "ok\n", "")).unwrap();
        assert_eq!(sr.status, SubmissionStatus::JobIdUnknown);

        let sr = sge
            .parse_submit(&CommandOutput::new(1, "", "Unable to run job: unknown queue"))
            .unwrap();
        assert_eq!(sr.status, SubmissionStatus::Failed);
    }

    #[test]
    fn test_parse_cancel() {
        let sge = SgeIo::new();
        for (stdout, stderr) in [
            ("", "qdel: job 2710 deleted\n"),
            ("johndoe has deleted job 2710\n", ""),
            ("johndoe has registered the job 2710 for deletion\n", ""),
        ] {
            let cr = sge.parse_cancel(&CommandOutput::new(0, stdout, stderr)).unwrap();
            assert_eq!(cr.status, CancelStatus::Successful);
            assert_eq!(cr.job_id.as_deref(), Some("2710"));
        }

        let cr = sge
            .parse_cancel(&CommandOutput::new(1, "", "denied: job \"9\" does not exist"))
            .unwrap();
        assert_eq!(cr.status, CancelStatus::Failed);
    }

    #[test]
    fn test_commands() {
        let sge = SgeIo::new();
        assert_eq!(sge.get_job_cmd(&JobRef::from(5u32)), "qstat -j 5");
        assert_eq!(sge.get_submit_cmd(Some("job.sh")), "qsub job.sh");

        let jobs = [JobRef::from("1"), JobRef::from("3"), JobRef::from("56"), JobRef::from("15")];
        assert_eq!(
            sge.get_jobs_list_cmd(Some(&jobs[..]), None).unwrap(),
            "qstat -ext -urg -xml -j 1,3,56,15"
        );
        assert_eq!(
            sge.get_jobs_list_cmd(Some(&jobs[..1]), None).unwrap(),
            "qstat -ext -urg -xml -j 1"
        );
        assert_eq!(
            sge.get_jobs_list_cmd(None, Some("johndoe")).unwrap(),
            "qstat -ext -urg -xml -u johndoe"
        );
        assert!(sge.get_jobs_list_cmd(Some(&jobs[..]), Some("johndoe")).is_err());
    }

    #[test]
    fn test_submission_script() {
        let res = QResources::no_constraints(4)
            .job_name("relax")
            .time_limit(3600)
            .gpus_per_job(2)
            .email_address("john@doe.org")
            .build()
            .unwrap();
        let script = SgeIo::new()
            .get_submission_script(&RunCommands::from("mpirun code"), ScriptOptions::from(&res))
            .unwrap();
        assert_eq!(
            script,
            "#!/bin/bash\n\n\
             #$ -N relax\n\
             #$ -l select=4\n\
             #$ -l gpu=2\n\
             #$ -l h_rt=1:0:0\n\
             #$ -l s_rt=0:59:24\n\
             #$ -M john@doe.org\n\
             #$ -m abe\n\
             mpirun code"
        );
    }

    #[test]
    fn test_unsupported_keys() {
        let res = QResources::no_constraints(1).rerunnable(true).build().unwrap();
        let err = SgeIo::new().check_convert_qresources(&res).unwrap_err();
        assert_eq!(err.to_string(), "Keys not supported: rerunnable");

        let res = QResources::no_constraints(1)
            .scheduler_kwarg("select", "custom")
            .build()
            .unwrap();
        let header = SgeIo::new().check_convert_qresources(&res).unwrap();
        assert_eq!(header["select"], "custom");
    }
}

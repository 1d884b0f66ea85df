//! Pieces shared by the qsub-family schedulers (PBS and SGE).
//!
//! Both accept a `select=` resource chunk, a wall time in `H:M:S`, `-M`/`-m`
//! mail directives and `-r y|n`. Their submit and cancel outputs are judged
//! the same way: any non-zero exit is a failure.

use qbatch_core::{
    check_ids_or_user, CancelResult, CancelStatus, CommandOutput, HeaderMap, ProcessPlacement,
    QResources, ResourceKey, Result, SchedulerError, SubmissionResult, SubmissionStatus,
};
use qbatch_parsers::{format_duration_qsub, parse_duration_secs, DurationFormat};

/// Keys every qsub-family adapter converts.
pub const COMMON_KEYS: &[ResourceKey] = &[
    ResourceKey::Njobs,
    ResourceKey::TimeLimit,
    ResourceKey::Processes,
    ResourceKey::ProcessesPerNode,
    ResourceKey::ProcessPlacement,
    ResourceKey::Nodes,
    ResourceKey::ThreadsPerProcess,
    ResourceKey::EmailAddress,
    ResourceKey::SchedulerKwargs,
];

/// Soft wall time as a share of the hard limit, in percent.
const SOFT_WALLTIME_PERCENT: u64 = 99;

/// `floor(limit * 99 / 100)` without overflowing on huge limits.
fn soft_walltime(limit: u64) -> u64 {
    limit / 100 * SOFT_WALLTIME_PERCENT + limit % 100 * SOFT_WALLTIME_PERCENT / 100
}

/// Build the `select=` chunk and the matching `place` value.
pub fn select_clause(
    resources: &QResources,
    system: &str,
) -> Result<(String, Option<&'static str>)> {
    let dist = resources.get_processes_distribution()?;
    let threads = resources.threads_per_process.filter(|&t| t > 0);
    let memory = resources.memory_per_thread.filter(|&m| m > 0);

    match resources.process_placement {
        Some(ProcessPlacement::NoConstraints) => {
            let mut select = format!("select={}", dist.processes.unwrap_or(1));
            if let Some(threads) = threads {
                select.push_str(&format!(":ncpus={threads}:ompthreads={threads}"));
            }
            if let Some(memory) = memory {
                let per_process = u64::from(threads.unwrap_or(1)) * memory;
                select.push_str(&format!(":mem={per_process}mb"));
            }
            Ok((select, None))
        }
        Some(
            placement @ (ProcessPlacement::EvenlyDistributed
            | ProcessPlacement::SameNode
            | ProcessPlacement::Scattered),
        ) => {
            let nodes = dist.nodes.unwrap_or(1);
            let ppn = dist.processes_per_node.unwrap_or(1);
            let (cpus, ompthreads) = match threads {
                Some(t) if t > 1 => (t * ppn, Some(t)),
                _ => (ppn, None),
            };

            let mut select = format!("select={nodes}:ncpus={cpus}:mpiprocs={ppn}");
            if let Some(omp) = ompthreads {
                select.push_str(&format!(":ompthreads={omp}"));
            }
            if let Some(memory) = memory {
                select.push_str(&format!(":mem={}mb", u64::from(cpus) * memory));
            }

            let place = match placement {
                ProcessPlacement::SameNode => "pack",
                _ => "scatter",
            };
            Ok((select, Some(place)))
        }
        None => Err(SchedulerError::UnsupportedResources(format!(
            "process placement None is not supported for {system}"
        ))),
    }
}

/// Fill the header entries PBS and SGE compute the same way.
///
/// `soft_walltime` adds the SGE `s_rt` limit next to the hard one. The
/// caller merges `scheduler_kwargs` afterwards so they override everything.
pub fn convert_common(
    resources: &QResources,
    system: &str,
    soft_walltime: bool,
    header: &mut HeaderMap,
) -> Result<()> {
    if let Some(njobs) = resources.njobs.filter(|&n| n > 1) {
        header.insert("array".into(), format!("1-{njobs}"));
    }

    if let Some(limit) = resources.time_limit.filter(|&t| t > 0) {
        header.insert("walltime".into(), format_duration_qsub(limit));
        if soft_walltime {
            header.insert(
                "soft_walltime".into(),
                format_duration_qsub(self::soft_walltime(limit)),
            );
        }
    }

    if let Some(rerunnable) = resources.rerunnable {
        header.insert("rerunnable".into(), if rerunnable { "y" } else { "n" }.into());
    }

    let (select, place) = select_clause(resources, system)?;
    header.insert("select".into(), select);
    if let Some(place) = place {
        header.insert("place".into(), place.into());
    }

    if let Some(email) = resources.email_address.as_deref().filter(|e| !e.is_empty()) {
        header.insert("mail_user".into(), email.to_string());
        header.insert("mail_type".into(), "abe".into());
    }
    Ok(())
}

/// `qstat` listing command: base, then `-u user` or the formatted ids.
pub fn qstat_list_cmd(
    system: &str,
    base: &str,
    job_ids: Option<&[String]>,
    user: Option<&str>,
    ids_flag: impl Fn(&[String]) -> String,
) -> Result<String> {
    check_ids_or_user(system, job_ids, user)?;
    let mut cmd = base.to_string();
    if let Some(user) = user {
        cmd.push_str(&format!(" -u {user}"));
    }
    if let Some(ids) = job_ids.filter(|ids| !ids.is_empty()) {
        cmd.push(' ');
        cmd.push_str(&ids_flag(ids));
    }
    Ok(cmd)
}

/// Wall times as `[[[D:]H:]M:]S`.
pub fn parse_qsub_time(s: &str) -> Result<Option<u64>> {
    Ok(parse_duration_secs(s, DurationFormat::Qsub)?)
}

pub fn submission_result(output: &CommandOutput, job_id: Option<String>) -> SubmissionResult {
    if !output.success() {
        return SubmissionResult::new(output, None, SubmissionStatus::Failed);
    }
    let status = match job_id {
        Some(_) => SubmissionStatus::Successful,
        None => SubmissionStatus::JobIdUnknown,
    };
    SubmissionResult::new(output, job_id, status)
}

/// qdel does not always name the job, so success depends on the exit code alone.
pub fn cancel_result(output: &CommandOutput, job_id: Option<String>) -> CancelResult {
    if !output.success() {
        return CancelResult::new(output, None, CancelStatus::Failed);
    }
    CancelResult::new(output, job_id, CancelStatus::Successful)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_no_constraints() {
        let res = QResources::no_constraints(24).build().unwrap();
        assert_eq!(select_clause(&res, "PBS").unwrap(), ("select=24".to_string(), None));

        let res = QResources::no_constraints(4)
            .threads_per_process(2)
            .memory_per_thread(1000)
            .build()
            .unwrap();
        assert_eq!(
            select_clause(&res, "PBS").unwrap().0,
            "select=4:ncpus=2:ompthreads=2:mem=2000mb"
        );
    }

    #[test]
    fn test_select_node_placements() {
        let res = QResources::evenly_distributed(4, 3)
            .threads_per_process(2)
            .memory_per_thread(2048)
            .build()
            .unwrap();
        assert_eq!(
            select_clause(&res, "SGE").unwrap(),
            (
                "select=4:ncpus=6:mpiprocs=3:ompthreads=2:mem=12288mb".to_string(),
                Some("scatter")
            )
        );

        let res = QResources::same_node(8).build().unwrap();
        assert_eq!(
            select_clause(&res, "PBS").unwrap(),
            ("select=1:ncpus=8:mpiprocs=8".to_string(), Some("pack"))
        );

        let res = QResources::scattered(3).threads_per_process(1).build().unwrap();
        assert_eq!(
            select_clause(&res, "PBS").unwrap(),
            ("select=3:ncpus=1:mpiprocs=1".to_string(), Some("scatter"))
        );
    }

    #[test]
    fn test_select_without_placement() {
        let res = QResources {
            processes: Some(2),
            ..Default::default()
        };
        let err = select_clause(&res, "PBS").unwrap_err();
        assert_eq!(err.to_string(), "process placement None is not supported for PBS");
    }

    #[test]
    fn test_convert_common() {
        let res = QResources::no_constraints(24).time_limit(39073).build().unwrap();

        let mut header = HeaderMap::new();
        convert_common(&res, "SGE", true, &mut header).unwrap();
        assert_eq!(header["walltime"], "10:51:13");
        assert_eq!(header["soft_walltime"], "10:44:42");
        assert_eq!(header["select"], "select=24");
        assert_eq!(header.len(), 3);

        let mut header = HeaderMap::new();
        convert_common(&res, "PBS", false, &mut header).unwrap();
        assert!(!header.contains_key("soft_walltime"));
    }

    #[test]
    fn test_soft_walltime() {
        assert_eq!(soft_walltime(39073), 38682);
        assert_eq!(soft_walltime(100), 99);
        assert_eq!(soft_walltime(1), 0);
        assert_eq!(soft_walltime(u64::MAX), 18262276632972456098);

        let res = QResources::no_constraints(1).time_limit(u64::MAX).build().unwrap();
        let mut header = HeaderMap::new();
        convert_common(&res, "SGE", true, &mut header).unwrap();
        assert_eq!(
            header["soft_walltime"],
            format_duration_qsub(18262276632972456098)
        );
    }

    #[test]
    fn test_rerunnable_and_mail() {
        let res = QResources::no_constraints(1)
            .rerunnable(false)
            .email_address("a@b.c")
            .njobs(3)
            .build()
            .unwrap();
        let mut header = HeaderMap::new();
        convert_common(&res, "PBS", false, &mut header).unwrap();
        assert_eq!(header["rerunnable"], "n");
        assert_eq!(header["mail_user"], "a@b.c");
        assert_eq!(header["mail_type"], "abe");
        assert_eq!(header["array"], "1-3");
    }

    #[test]
    fn test_parse_qsub_time() {
        assert_eq!(parse_qsub_time("10:51:13").unwrap(), Some(39073));
        assert_eq!(parse_qsub_time("02:10:02").unwrap(), Some(7802));
        assert_eq!(parse_qsub_time("10:02").unwrap(), Some(602));
        assert_eq!(parse_qsub_time("45").unwrap(), Some(45));
        assert_eq!(parse_qsub_time("1:00:00:00").unwrap(), Some(86400));
        assert_eq!(parse_qsub_time("").unwrap(), None);
        assert!(parse_qsub_time("2:10:a").is_err());
        assert!(parse_qsub_time("1:2:10:02:10").is_err());
    }

    #[test]
    fn test_results() {
        let failed = CommandOutput::new(1, "", "qsub: Invalid queue specified: abcd\n");
        let sr = submission_result(&failed, Some("3".into()));
        assert_eq!(sr.status, SubmissionStatus::Failed);
        assert_eq!(sr.job_id, None);

        let ok = CommandOutput::new(0, "", "");
        assert_eq!(submission_result(&ok, None).status, SubmissionStatus::JobIdUnknown);
        assert_eq!(cancel_result(&ok, None).status, CancelStatus::Successful);
        assert_eq!(cancel_result(&failed, None).status, CancelStatus::Failed);
    }
}

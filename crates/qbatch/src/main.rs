//! qbatch - write, submit and track batch jobs from the command line.

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use miette::{IntoDiagnostic, Result, bail, miette};
use qbatch_cli::{Args, Command, SchedulerKind, ScriptArgs};
use qbatch_core::{
    CancelStatus, JobRef, QJob, QResources, RunCommands, SchedulerIo, SubmissionStatus,
};
use qbatch_manager::{
    EnvironmentSetup, JobScript, LocalHost, QueueManager, SubmitOptions, load_resources,
};
use qbatch_parsers::format_duration;
use qbatch_pbs::{PbsIo, SgeIo};
use qbatch_shell::ShellIo;
use qbatch_slurm::{JobQueryTool, SlurmIo};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .map_err(|e| miette!("invalid log filter {level:?}: {e}"))?;
    // stdout carries scripts and JSON, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| miette!("failed to install logger: {e}"))
}

fn scheduler_io(args: &Args) -> Box<dyn SchedulerIo> {
    match args.scheduler {
        SchedulerKind::Slurm => {
            let query = if args.sacct {
                JobQueryTool::Sacct
            } else {
                JobQueryTool::Scontrol
            };
            Box::new(SlurmIo::new().with_job_query(query))
        }
        SchedulerKind::Pbs => Box::new(PbsIo::new()),
        SchedulerKind::Sge => Box::new(SgeIo::new()),
        SchedulerKind::Shell => Box::new(ShellIo::new().blocking(args.blocking)),
    }
}

/// Files and commands named on the command line, loaded.
struct LoadedScript {
    commands: RunCommands,
    pre_run: Option<RunCommands>,
    post_run: Option<RunCommands>,
    resources: Option<QResources>,
    environment: Option<EnvironmentSetup>,
    workdir: Option<Utf8PathBuf>,
}

impl LoadedScript {
    fn load(args: ScriptArgs) -> Result<Self> {
        let lines = |v: Vec<String>| (!v.is_empty()).then(|| RunCommands::from(v));
        let resources = args
            .resources
            .as_deref()
            .map(load_resources)
            .transpose()
            .into_diagnostic()?;
        let environment = args
            .environment
            .as_deref()
            .map(EnvironmentSetup::from_file)
            .transpose()
            .into_diagnostic()?;
        Ok(Self {
            commands: RunCommands::from(args.commands),
            pre_run: lines(args.pre_run),
            post_run: lines(args.post_run),
            resources,
            environment,
            workdir: args.workdir,
        })
    }

    fn job_script(&self) -> JobScript<'_> {
        let mut script = JobScript::new(&self.commands).options(self.resources.as_ref());
        if let Some(dir) = &self.workdir {
            script = script.workdir(dir);
        }
        if let Some(pre) = &self.pre_run {
            script = script.pre_run(pre);
        }
        if let Some(post) = &self.post_run {
            script = script.post_run(post);
        }
        if let Some(env) = &self.environment {
            script = script.environment(env);
        }
        script
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn job_line(job: &QJob) -> String {
    let state = job.state.as_ref().map(ToString::to_string);
    format!(
        "{:<12} {:<12} {:<20} {:<12} {:>12}",
        or_dash(job.job_id.as_deref()),
        or_dash(state.as_deref()),
        or_dash(job.name.as_deref()),
        or_dash(job.account.as_deref()),
        job.runtime.map(format_duration).unwrap_or_else(|| "-".into()),
    )
}

fn print_jobs(jobs: &[QJob]) {
    println!(
        "{:<12} {:<12} {:<20} {:<12} {:>12}",
        "JOB ID", "STATE", "NAME", "ACCOUNT", "RUNTIME"
    );
    for job in jobs {
        println!("{}", job_line(job));
    }
}

async fn run(args: Args) -> Result<()> {
    let manager: QueueManager<LocalHost> = QueueManager::local(scheduler_io(&args));
    let system = manager.scheduler().system_name().to_string();

    match args.command {
        Command::Script { script, output } => {
            let loaded = LoadedScript::load(script)?;
            let text = manager
                .get_submission_script(&loaded.job_script())
                .into_diagnostic()?;
            match output {
                Some(path) => write_script(&path, &text)?,
                None => println!("{text}"),
            }
        }
        Command::Submit {
            script,
            script_name,
            create_workdir,
        } => {
            let loaded = LoadedScript::load(script)?;
            let options = SubmitOptions {
                script_name,
                create_workdir,
            };
            let result = manager
                .submit(&loaded.job_script(), &options)
                .await
                .into_diagnostic()?;
            if args.json {
                print_json(&result)?;
            }
            match result.status {
                SubmissionStatus::Failed => {
                    bail!("{system} submission failed: {}", result.stderr.trim())
                }
                _ if args.json => {}
                SubmissionStatus::Successful => {
                    println!("Submitted job {}", or_dash(result.job_id.as_deref()))
                }
                SubmissionStatus::JobIdUnknown => {
                    println!("Submitted, but {system} reported no job id")
                }
            }
        }
        Command::Cancel { job_id } => {
            let result = manager
                .cancel(&JobRef::from(job_id.as_str()))
                .await
                .into_diagnostic()?;
            if args.json {
                print_json(&result)?;
            }
            match result.status {
                CancelStatus::Failed => {
                    bail!("cancelling {job_id} failed: {}", result.stderr.trim())
                }
                _ if args.json => {}
                _ => println!("Cancelled job {job_id}"),
            }
        }
        Command::Status { job_id } => {
            let job = manager
                .get_job(&JobRef::from(job_id.as_str()))
                .await
                .into_diagnostic()?;
            match job {
                Some(job) if args.json => print_json(&job)?,
                Some(job) => print_jobs(std::slice::from_ref(&job)),
                None => bail!("job {job_id} not found in {system}"),
            }
        }
        Command::List { user, job_ids } => {
            let jobs: Vec<JobRef> = job_ids.iter().map(JobRef::from).collect();
            let jobs = (!jobs.is_empty()).then_some(jobs.as_slice());
            let list = manager
                .get_jobs_list(jobs, user.as_deref())
                .await
                .into_diagnostic()?;
            if args.json {
                print_json(&list)?;
            } else {
                print_jobs(&list);
            }
        }
    }
    Ok(())
}

fn write_script(path: &Utf8Path, text: &str) -> Result<()> {
    std::fs::write(path, text).into_diagnostic()?;
    tracing::info!("wrote {path}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;
    run(args).await
}

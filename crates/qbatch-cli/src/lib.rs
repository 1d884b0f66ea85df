//! CLI argument parsing for qbatch.

use camino::Utf8PathBuf;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "qbatch")]
#[command(about = "Write, submit and track batch jobs on SLURM, PBS, SGE or a plain shell")]
#[command(version)]
pub struct Args {
    /// Scheduler to talk to
    #[arg(long, short, value_enum, env = "QBATCH_SCHEDULER", global = true, default_value = "slurm")]
    pub scheduler: SchedulerKind,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Log filter, e.g. "debug" or "qbatch_slurm=trace"
    #[arg(long, env = "QBATCH_LOG", global = true, default_value = "warn")]
    pub log_level: String,

    /// Query single SLURM jobs with sacct instead of scontrol
    #[arg(long, global = true)]
    pub sacct: bool,

    /// Run shell jobs in the foreground
    #[arg(long, global = true)]
    pub blocking: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchedulerKind {
    Slurm,
    Pbs,
    Sge,
    Shell,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the submission script without submitting it
    Script {
        #[command(flatten)]
        script: ScriptArgs,

        /// Write the script to this file instead of stdout
        #[arg(long, short)]
        output: Option<Utf8PathBuf>,
    },

    /// Write the submission script to the working directory and submit it
    Submit {
        #[command(flatten)]
        script: ScriptArgs,

        /// File name of the script inside the working directory
        #[arg(long, default_value = "submit.script")]
        script_name: String,

        /// Create the working directory if it does not exist
        #[arg(long)]
        create_workdir: bool,
    },

    /// Cancel a job
    Cancel { job_id: String },

    /// Show the state of one job
    Status { job_id: String },

    /// List jobs by id or by user
    List {
        /// Only jobs of this user
        #[arg(long, short, conflicts_with = "job_ids")]
        user: Option<String>,

        job_ids: Vec<String>,
    },
}

/// What goes into a submission script.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ScriptArgs {
    /// Resource request as a JSON file
    #[arg(long, short)]
    pub resources: Option<Utf8PathBuf>,

    /// Environment setup (modules, conda, variables) as a JSON file
    #[arg(long, short)]
    pub environment: Option<Utf8PathBuf>,

    /// Directory the job runs in
    #[arg(long, short, env = "QBATCH_WORKDIR")]
    pub workdir: Option<Utf8PathBuf>,

    /// Command run before the job commands, repeatable
    #[arg(long)]
    pub pre_run: Vec<String>,

    /// Command run after the job commands, repeatable
    #[arg(long)]
    pub post_run: Vec<String>,

    /// Job commands, one script line each
    #[arg(required = true, trailing_var_arg = true)]
    pub commands: Vec<String>,
}

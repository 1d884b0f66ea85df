//! Scheduler-agnostic description of the compute resources a job requests.

use crate::error::{Result, SchedulerError};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How the processes of a job are laid out over nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessPlacement {
    /// Let the scheduler decide.
    NoConstraints,
    /// One process per node.
    Scattered,
    /// All processes on a single node.
    SameNode,
    /// The same number of processes on each node.
    EvenlyDistributed,
}

impl ProcessPlacement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoConstraints => "NO_CONSTRAINTS",
            Self::Scattered => "SCATTERED",
            Self::SameNode => "SAME_NODE",
            Self::EvenlyDistributed => "EVENLY_DISTRIBUTED",
        }
    }
}

impl fmt::Display for ProcessPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names of the `QResources` fields, used to declare what an adapter supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKey {
    QueueName,
    JobName,
    MemoryPerThread,
    Nodes,
    Processes,
    ProcessesPerNode,
    ThreadsPerProcess,
    GpusPerJob,
    TimeLimit,
    Account,
    Qos,
    Priority,
    OutputFilepath,
    ErrorFilepath,
    ProcessPlacement,
    EmailAddress,
    Rerunnable,
    Project,
    Njobs,
    SchedulerKwargs,
}

impl ResourceKey {
    pub const ALL: &'static [ResourceKey] = &[
        Self::QueueName,
        Self::JobName,
        Self::MemoryPerThread,
        Self::Nodes,
        Self::Processes,
        Self::ProcessesPerNode,
        Self::ThreadsPerProcess,
        Self::GpusPerJob,
        Self::TimeLimit,
        Self::Account,
        Self::Qos,
        Self::Priority,
        Self::OutputFilepath,
        Self::ErrorFilepath,
        Self::ProcessPlacement,
        Self::EmailAddress,
        Self::Rerunnable,
        Self::Project,
        Self::Njobs,
        Self::SchedulerKwargs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueueName => "queue_name",
            Self::JobName => "job_name",
            Self::MemoryPerThread => "memory_per_thread",
            Self::Nodes => "nodes",
            Self::Processes => "processes",
            Self::ProcessesPerNode => "processes_per_node",
            Self::ThreadsPerProcess => "threads_per_process",
            Self::GpusPerJob => "gpus_per_job",
            Self::TimeLimit => "time_limit",
            Self::Account => "account",
            Self::Qos => "qos",
            Self::Priority => "priority",
            Self::OutputFilepath => "output_filepath",
            Self::ErrorFilepath => "error_filepath",
            Self::ProcessPlacement => "process_placement",
            Self::EmailAddress => "email_address",
            Self::Rerunnable => "rerunnable",
            Self::Project => "project",
            Self::Njobs => "njobs",
            Self::SchedulerKwargs => "scheduler_kwargs",
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved process layout: `(nodes, processes, processes_per_node)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProcessDistribution {
    pub nodes: Option<u32>,
    pub processes: Option<u32>,
    pub processes_per_node: Option<u32>,
}

impl ProcessDistribution {
    pub fn new(nodes: Option<u32>, processes: Option<u32>, processes_per_node: Option<u32>) -> Self {
        Self {
            nodes,
            processes,
            processes_per_node,
        }
    }
}

/// Resources requested by a job (submitted or to be submitted).
///
/// Every field is optional. A value counts as "set" when it is present and
/// truthy: non-zero numbers, non-empty strings and maps, `true`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QResources {
    pub queue_name: Option<String>,
    pub job_name: Option<String>,
    /// Memory per thread in MB.
    pub memory_per_thread: Option<u64>,
    pub nodes: Option<u32>,
    pub processes: Option<u32>,
    pub processes_per_node: Option<u32>,
    pub threads_per_process: Option<u32>,
    pub gpus_per_job: Option<u32>,
    /// Time limit in seconds.
    pub time_limit: Option<u64>,
    pub account: Option<String>,
    pub qos: Option<String>,
    #[serde(deserialize_with = "string_or_integer")]
    pub priority: Option<String>,
    pub output_filepath: Option<String>,
    pub error_filepath: Option<String>,
    pub process_placement: Option<ProcessPlacement>,
    pub email_address: Option<String>,
    pub rerunnable: Option<bool>,
    pub project: Option<String>,
    /// Number of jobs in a job array.
    pub njobs: Option<u32>,
    /// Extra header values passed straight to the scheduler template.
    pub scheduler_kwargs: BTreeMap<String, String>,
}

/// Priorities are strings for some schedulers and integers for others.
fn string_or_integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Str(s) => s,
        Raw::Int(i) => i.to_string(),
    }))
}

fn set_str(v: &Option<String>) -> bool {
    v.as_deref().is_some_and(|s| !s.is_empty())
}

fn set_u32(v: Option<u32>) -> bool {
    v.is_some_and(|n| n != 0)
}

fn set_u64(v: Option<u64>) -> bool {
    v.is_some_and(|n| n != 0)
}

impl QResources {
    pub fn builder() -> QResourcesBuilder {
        QResourcesBuilder::default()
    }

    /// Processes placed wherever the scheduler likes.
    pub fn no_constraints(processes: u32) -> QResourcesBuilder {
        QResourcesBuilder::named(ProcessPlacement::NoConstraints).processes(processes)
    }

    /// `nodes` nodes running `processes_per_node` processes each.
    pub fn evenly_distributed(nodes: u32, processes_per_node: u32) -> QResourcesBuilder {
        QResourcesBuilder::named(ProcessPlacement::EvenlyDistributed)
            .nodes(nodes)
            .processes_per_node(processes_per_node)
    }

    /// One process per node.
    pub fn scattered(processes: u32) -> QResourcesBuilder {
        QResourcesBuilder::named(ProcessPlacement::Scattered).processes(processes)
    }

    /// All processes on one node.
    pub fn same_node(processes: u32) -> QResourcesBuilder {
        QResourcesBuilder::named(ProcessPlacement::SameNode).processes(processes)
    }

    /// Keys whose value counts as set.
    pub fn set_keys(&self) -> Vec<ResourceKey> {
        ResourceKey::ALL
            .iter()
            .copied()
            .filter(|key| self.is_set(*key))
            .collect()
    }

    pub fn is_set(&self, key: ResourceKey) -> bool {
        match key {
            ResourceKey::QueueName => set_str(&self.queue_name),
            ResourceKey::JobName => set_str(&self.job_name),
            ResourceKey::MemoryPerThread => set_u64(self.memory_per_thread),
            ResourceKey::Nodes => set_u32(self.nodes),
            ResourceKey::Processes => set_u32(self.processes),
            ResourceKey::ProcessesPerNode => set_u32(self.processes_per_node),
            ResourceKey::ThreadsPerProcess => set_u32(self.threads_per_process),
            ResourceKey::GpusPerJob => set_u32(self.gpus_per_job),
            ResourceKey::TimeLimit => set_u64(self.time_limit),
            ResourceKey::Account => set_str(&self.account),
            ResourceKey::Qos => set_str(&self.qos),
            ResourceKey::Priority => set_str(&self.priority),
            ResourceKey::OutputFilepath => set_str(&self.output_filepath),
            ResourceKey::ErrorFilepath => set_str(&self.error_filepath),
            ResourceKey::ProcessPlacement => self.process_placement.is_some(),
            ResourceKey::EmailAddress => set_str(&self.email_address),
            ResourceKey::Rerunnable => self.rerunnable == Some(true),
            ResourceKey::Project => set_str(&self.project),
            ResourceKey::Njobs => set_u32(self.njobs),
            ResourceKey::SchedulerKwargs => !self.scheduler_kwargs.is_empty(),
        }
    }

    /// Infer a missing placement, rejecting requests that leave it ambiguous.
    ///
    /// Requests read from JSON must go through this before use.
    pub fn validated(mut self) -> Result<Self> {
        if self.process_placement.is_none() {
            let processes = set_u32(self.processes);
            let nodes = set_u32(self.nodes);
            let ppn = set_u32(self.processes_per_node);

            if processes && !ppn && !nodes {
                self.process_placement = Some(ProcessPlacement::NoConstraints);
            } else if nodes && ppn && !processes {
                self.process_placement = Some(ProcessPlacement::EvenlyDistributed);
            } else if !self.set_keys().is_empty() {
                return Err(SchedulerError::UnsupportedResources(
                    "When process_placement is None either define only nodes plus \
                     processes_per_node or only processes to get a default value. \
                     Otherwise all the fields must be empty."
                        .to_string(),
                ));
            }
        }
        Ok(self)
    }

    /// True for the empty request, false once a placement is set.
    pub fn check_empty(&self) -> Result<bool> {
        if self.process_placement.is_some() {
            return Ok(false);
        }
        if !self.set_keys().is_empty() {
            return Err(SchedulerError::InvalidArgument(
                "process_placement is None, but some values are set".to_string(),
            ));
        }
        Ok(true)
    }

    /// Resolve nodes, processes and processes per node for the placement.
    pub fn get_processes_distribution(&self) -> Result<ProcessDistribution> {
        let mut nodes = self.nodes;
        let mut processes = self.processes;
        let mut ppn = self.processes_per_node;
        let unsupported = |msg: String| Err(SchedulerError::UnsupportedResources(msg));

        match self.process_placement {
            Some(ProcessPlacement::Scattered) => {
                match (nodes, processes) {
                    (None, _) => nodes = processes,
                    (_, None) => processes = nodes,
                    (Some(n), Some(p)) if n != p => {
                        return unsupported(
                            "ProcessPlacement.SCATTERED is incompatible with different values \
                             of nodes and processes"
                                .to_string(),
                        );
                    }
                    _ => {}
                }
                if !set_u32(nodes) && !set_u32(processes) {
                    nodes = Some(1);
                    processes = Some(1);
                }
                if let Some(value) = ppn.filter(|&v| v != 1) {
                    return unsupported(format!(
                        "ProcessPlacement.SCATTERED is incompatible with {value} processes_per_node"
                    ));
                }
                ppn = Some(1);
            }
            Some(ProcessPlacement::SameNode) => {
                if let Some(value) = nodes.filter(|&v| v != 1) {
                    return unsupported(format!(
                        "ProcessPlacement.SAME_NODE is incompatible with {value} nodes"
                    ));
                }
                nodes = Some(1);
                match (processes, ppn) {
                    (None, _) => processes = ppn,
                    (_, None) => ppn = processes,
                    (Some(p), Some(n)) if p != n => {
                        return unsupported(
                            "ProcessPlacement.SAME_NODE is incompatible with different values \
                             of nodes and processes"
                                .to_string(),
                        );
                    }
                    _ => {}
                }
                if !set_u32(ppn) && !set_u32(processes) {
                    ppn = Some(1);
                    processes = Some(1);
                }
            }
            Some(ProcessPlacement::EvenlyDistributed) => {
                if nodes.is_none() {
                    nodes = Some(1);
                }
                if set_u32(processes) {
                    return unsupported(
                        "ProcessPlacement.EVENLY_DISTRIBUTED is incompatible with processes \
                         attribute"
                            .to_string(),
                    );
                }
                if !set_u32(ppn) {
                    ppn = Some(1);
                }
            }
            Some(ProcessPlacement::NoConstraints) => {
                if set_u32(ppn) || set_u32(nodes) {
                    return unsupported(
                        "ProcessPlacement.NO_CONSTRAINTS is incompatible with \
                         processes_per_node and nodes attribute"
                            .to_string(),
                    );
                }
                if !set_u32(processes) {
                    processes = Some(1);
                }
            }
            None => {}
        }

        Ok(ProcessDistribution::new(nodes, processes, ppn))
    }
}

/// Builder for [`QResources`], validating on [`build`](QResourcesBuilder::build).
#[derive(Debug, Clone, Default)]
pub struct QResourcesBuilder {
    resources: QResources,
    named: Option<ProcessPlacement>,
}

macro_rules! setters {
    ($($field:ident: $ty:ty),* $(,)?) => {
        $(
            pub fn $field(mut self, value: $ty) -> Self {
                self.resources.$field = Some(value.into());
                self
            }
        )*
    };
}

impl QResourcesBuilder {
    fn named(placement: ProcessPlacement) -> Self {
        Self {
            resources: QResources {
                process_placement: Some(placement),
                ..QResources::default()
            },
            named: Some(placement),
        }
    }

    setters! {
        queue_name: impl Into<String>,
        job_name: impl Into<String>,
        memory_per_thread: u64,
        nodes: u32,
        processes: u32,
        processes_per_node: u32,
        threads_per_process: u32,
        gpus_per_job: u32,
        time_limit: u64,
        account: impl Into<String>,
        qos: impl Into<String>,
        output_filepath: impl Into<String>,
        error_filepath: impl Into<String>,
        process_placement: ProcessPlacement,
        email_address: impl Into<String>,
        rerunnable: bool,
        project: impl Into<String>,
        njobs: u32,
    }

    pub fn priority(mut self, value: impl ToString) -> Self {
        self.resources.priority = Some(value.to_string());
        self
    }

    pub fn scheduler_kwarg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.resources
            .scheduler_kwargs
            .insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<QResources> {
        let r = &self.resources;
        let message = match self.named {
            Some(ProcessPlacement::NoConstraints)
                if r.nodes.is_some() || r.processes_per_node.is_some() =>
            {
                Some("nodes and processes_per_node are incompatible with no constraints jobs")
            }
            Some(ProcessPlacement::Scattered)
                if r.nodes.is_some() || r.processes_per_node.is_some() =>
            {
                Some("nodes and processes_per_node are incompatible with scattered jobs")
            }
            Some(ProcessPlacement::SameNode)
                if r.nodes.is_some() || r.processes_per_node.is_some() =>
            {
                Some("nodes and processes_per_node are incompatible with same node jobs")
            }
            Some(ProcessPlacement::EvenlyDistributed) if r.processes.is_some() => {
                Some("processes is incompatible with evenly distributed jobs")
            }
            _ => None,
        };
        if let Some(message) = message {
            return Err(SchedulerError::UnsupportedResources(message.to_string()));
        }
        self.resources.validated()
    }
}

//! Minimal object model of the workload platform and the operations the
//! executor needs from it.

mod memory;
pub use memory::MemoryCluster;

#[cfg(feature = "proc")]
mod process;
#[cfg(feature = "proc")]
pub use process::ProcessCluster;

use std::{collections::BTreeMap, time::SystemTime};

use async_trait::async_trait;
use tern_model::WorkloadSpec;
use tokio::{io::AsyncRead, sync::mpsc};

use crate::error::ClusterError;

/// Followed output of one container.
pub type LogStream = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PodPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    Waiting { reason: String, message: String },
    Running,
    Terminated { exit_code: i32 },
}

impl Default for ContainerState {
    fn default() -> Self {
        ContainerState::Waiting {
            reason: "ContainerCreating".into(),
            message: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStatus {
    pub name: String,
    pub state: ContainerState,
    pub restart_count: u32,
}

impl ContainerStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.state, ContainerState::Terminated { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadStatus {
    pub phase: PodPhase,
    pub init_containers: Vec<ContainerStatus>,
    pub containers: Vec<ContainerStatus>,
}

impl WorkloadStatus {
    /// Initial status of a freshly scheduled workload.
    pub fn pending(spec: &WorkloadSpec) -> Self {
        Self {
            phase: PodPhase::Pending,
            init_containers: spec
                .init_containers
                .iter()
                .map(|c| ContainerStatus::new(&c.name))
                .collect(),
            containers: spec
                .containers
                .iter()
                .map(|c| ContainerStatus::new(&c.name))
                .collect(),
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &ContainerStatus> {
        self.init_containers.iter().chain(self.containers.iter())
    }

    pub fn container_mut(&mut self, name: &str) -> Option<&mut ContainerStatus> {
        self.init_containers
            .iter_mut()
            .chain(self.containers.iter_mut())
            .find(|c| c.name == name)
    }
}

/// One scheduled unit of execution and its observed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub spec: WorkloadSpec,
    pub status: WorkloadStatus,
    pub deletion_requested: bool,
    /// Bumped by every change; updates carrying a stale version conflict.
    pub resource_version: u64,
    pub created: SystemTime,
}

impl Workload {
    pub fn new(name: impl Into<String>, spec: WorkloadSpec) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            status: WorkloadStatus::pending(&spec),
            spec,
            deletion_requested: false,
            resource_version: 0,
            created: SystemTime::now(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Added(Workload),
    Modified(Workload),
    Deleted(Workload),
}

impl WatchEvent {
    pub fn workload(&self) -> &Workload {
        match self {
            WatchEvent::Added(w) | WatchEvent::Modified(w) | WatchEvent::Deleted(w) => w,
        }
    }
}

/// Equality label selector; an empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    terms: BTreeMap<String, String>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.terms.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.terms.iter().all(|(k, v)| labels.get(k) == Some(v))
    }
}

/// Workload platform.
///
/// A watch only reports changes made after it was established. Its channel
/// closing means the connection was lost.
#[async_trait]
pub trait Cluster: Send + Sync + 'static {
    async fn create(&self, workload: Workload) -> Result<Workload, ClusterError>;

    async fn get(&self, name: &str) -> Result<Workload, ClusterError>;

    async fn list(&self, selector: &Selector) -> Result<Vec<Workload>, ClusterError>;

    async fn watch(&self, selector: &Selector) -> Result<mpsc::Receiver<WatchEvent>, ClusterError>;

    /// Replace labels and annotations. Fails with `Conflict` when
    /// `resource_version` is stale.
    async fn update(&self, workload: Workload) -> Result<Workload, ClusterError>;

    /// Request deletion; running containers are killed.
    async fn delete(&self, name: &str) -> Result<(), ClusterError>;

    /// Output of `container`, followed until the container terminates.
    async fn logs(&self, workload: &str, container: &str) -> Result<LogStream, ClusterError>;
}

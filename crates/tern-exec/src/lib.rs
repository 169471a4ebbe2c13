mod error;
pub use error::{ClusterError, ConfigError, SupervisorError};

pub mod cluster;
pub use cluster::{
    Cluster, ContainerState, ContainerStatus, LogStream, MemoryCluster, PodPhase, Selector,
    WatchEvent, Workload, WorkloadStatus,
};
#[cfg(feature = "proc")]
pub use cluster::ProcessCluster;

mod config;
pub use config::ExecutorConfig;

pub mod labels;
pub use labels::LabelSet;

pub mod status;

mod loglistener;
mod trace;

pub mod supervise;
pub use supervise::{TaskSupervisor, WatchMonitor};

mod executor;
pub use executor::Executor;

pub mod prelude {
    pub use crate::error::ClusterError;
    pub use crate::{Cluster, Executor, ExecutorConfig, MemoryCluster, TaskSupervisor};
}

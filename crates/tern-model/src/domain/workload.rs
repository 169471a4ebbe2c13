use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::KeyValue;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("workload has no containers")]
    NoContainers,
    #[error("container name is empty")]
    EmptyName,
    #[error("duplicate container name: {0}")]
    DuplicateName(String),
    #[error("container {0} has neither image nor command")]
    NothingToRun(String),
    #[error("invalid job spec: {0}")]
    Invalid(String),
}

/// Restart behaviour of failed containers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RestartPolicy {
    #[default]
    OnFailure,
    Never,
}

/// One container of a workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<KeyValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(KeyValue::new(key, value));
        self
    }
}

/// The unit of execution scheduled on the cluster for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    /// Run sequentially before the main containers (job preparation).
    #[serde(default)]
    pub init_containers: Vec<ContainerSpec>,
    pub containers: Vec<ContainerSpec>,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
}

impl WorkloadSpec {
    pub fn new(containers: Vec<ContainerSpec>) -> Self {
        Self {
            containers,
            ..Default::default()
        }
    }

    pub fn with_init_container(mut self, container: ContainerSpec) -> Self {
        self.init_containers.push(container);
        self
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    /// Check the workload is schedulable at all.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.containers.is_empty() {
            return Err(SpecError::NoContainers);
        }

        let mut seen = HashSet::new();
        for c in self.init_containers.iter().chain(self.containers.iter()) {
            if c.name.trim().is_empty() {
                return Err(SpecError::EmptyName);
            }
            if !seen.insert(c.name.as_str()) {
                return Err(SpecError::DuplicateName(c.name.clone()));
            }
            if c.image.trim().is_empty() && c.command.is_empty() {
                return Err(SpecError::NothingToRun(c.name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn main(name: &str) -> ContainerSpec {
        ContainerSpec::new(name).with_command(["echo", "hi"])
    }

    #[test]
    fn valid_workload() {
        let spec = WorkloadSpec::new(vec![main("build")]).with_init_container(main("checkout"));
        assert_eq!(spec.validate(), Ok(()));
    }

    #[test]
    fn rejects_empty_workload() {
        assert_eq!(WorkloadSpec::default().validate(), Err(SpecError::NoContainers));
    }

    #[test]
    fn rejects_duplicate_names_across_init_and_main() {
        let spec = WorkloadSpec::new(vec![main("build")]).with_init_container(main("build"));
        assert_eq!(
            spec.validate(),
            Err(SpecError::DuplicateName("build".into()))
        );
    }

    #[test]
    fn rejects_container_without_command_or_image() {
        let spec = WorkloadSpec::new(vec![ContainerSpec::new("idle")]);
        assert_eq!(spec.validate(), Err(SpecError::NothingToRun("idle".into())));
    }
}

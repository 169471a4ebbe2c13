use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::KeyValue;
use crate::domain::time_serde;

/// What caused a job to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Trigger {
    #[default]
    Unknown,
    Manual,
    Push,
    Deleted,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Unknown => "unknown",
            Trigger::Manual => "manual",
            Trigger::Push => "push",
            Trigger::Deleted => "deleted",
        }
    }
}

/// Source coordinates of the code a job runs against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub host: String,
    pub owner: String,
    pub repo: String,
    #[serde(rename = "ref")]
    pub r#ref: String,
    pub revision: String,
}

impl Repository {
    pub fn new(host: impl Into<String>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            owner: owner.into(),
            repo: repo.into(),
            ..Default::default()
        }
    }

    pub fn with_ref(mut self, r#ref: impl Into<String>) -> Self {
        self.r#ref = r#ref.into();
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }
}

/// Who started a job, against what, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetadata {
    pub owner: String,
    pub trigger: Trigger,
    pub repository: Repository,
    #[serde(default)]
    pub annotations: Vec<KeyValue>,
    #[serde(with = "time_serde")]
    pub created: SystemTime,
    #[serde(
        default,
        with = "time_serde::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub finished: Option<SystemTime>,
}

impl JobMetadata {
    pub fn new(owner: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            owner: owner.into(),
            trigger,
            repository: Repository::default(),
            annotations: Vec::new(),
            created: SystemTime::now(),
            finished: None,
        }
    }

    pub fn with_repository(mut self, repository: Repository) -> Self {
        self.repository = repository;
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.push(KeyValue::new(key, value));
        self
    }

    /// Value of the last annotation with the given key.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .iter()
            .rev()
            .find(|kv| kv.key() == key)
            .map(|kv| kv.value())
    }
}

impl Default for JobMetadata {
    fn default() -> Self {
        Self::new("", Trigger::Unknown)
    }
}

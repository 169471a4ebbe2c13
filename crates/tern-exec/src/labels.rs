//! Names of the labels and annotations that tie workloads to jobs.

use std::collections::BTreeMap;

use tern_model::{JobMetadata, KeyValue};

use crate::cluster::{Selector, Workload};

/// Label and annotation keys under one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    /// Discovery label, always `true`.
    pub marker: String,
    pub job_name: String,
    pub mutex: String,
    pub annotation_metadata: String,
    pub annotation_failure_limit: String,
    pub annotation_failed: String,
    pub annotation_results: String,
    pub annotation_sidecars: String,
    pub user_data_prefix: String,
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::new("tern.dev/")
    }
}

impl LabelSet {
    pub fn new(prefix: &str) -> Self {
        Self {
            marker: format!("{prefix}job"),
            job_name: format!("{prefix}jobName"),
            mutex: format!("{prefix}mutex"),
            annotation_metadata: format!("{prefix}metadata"),
            annotation_failure_limit: format!("{prefix}failureLimit"),
            annotation_failed: format!("{prefix}failed"),
            annotation_results: format!("{prefix}results"),
            annotation_sidecars: format!("{prefix}sidecars"),
            user_data_prefix: format!("{prefix}userdata."),
        }
    }

    /// Every workload the executor owns.
    pub fn discovery(&self) -> Selector {
        Selector::new().with(&self.marker, "true")
    }

    pub fn for_job(&self, name: &str) -> Selector {
        self.discovery().with(&self.job_name, name)
    }

    pub fn for_mutex(&self, mutex: &str) -> Selector {
        self.discovery().with(&self.mutex, mutex)
    }

    pub fn job_name<'a>(&self, w: &'a Workload) -> Option<&'a str> {
        w.labels.get(&self.job_name).map(String::as_str)
    }

    pub fn failure_limit(&self, w: &Workload) -> u32 {
        w.annotations
            .get(&self.annotation_failure_limit)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    pub fn is_sidecar(&self, w: &Workload, container: &str) -> bool {
        w.annotations
            .get(&self.annotation_sidecars)
            .is_some_and(|v| v.split(',').any(|s| s.trim() == container))
    }

    pub fn user_data(&self, annotations: &[KeyValue]) -> BTreeMap<String, String> {
        annotations
            .iter()
            .map(|kv| {
                (
                    format!("{}{}", self.user_data_prefix, kv.key()),
                    kv.value().to_string(),
                )
            })
            .collect()
    }

    /// Metadata of a workload that carries no metadata annotation.
    pub fn metadata_from_user_data(&self, w: &Workload) -> JobMetadata {
        let mut md = JobMetadata {
            created: w.created,
            ..JobMetadata::default()
        };
        for (k, v) in &w.annotations {
            if let Some(key) = k.strip_prefix(&self.user_data_prefix) {
                md.annotations.push(KeyValue::new(key, v.as_str()));
            }
        }
        md
    }
}

//! Derives a [`JobStatus`] from the observed state of a workload.

use std::time::SystemTime;

use tern_model::{JobPhase, JobResult, JobStatus};
use thiserror::Error;

use crate::{
    cluster::{ContainerState, PodPhase, Workload},
    labels::LabelSet,
};

const IMAGE_PULL_FAILURE: &str = "ErrImagePull";

#[derive(Error, Debug)]
pub enum StatusError {
    #[error("workload {0} has no job name")]
    NoName(String),
    #[error("cannot parse metadata of {name}: {reason}")]
    Metadata { name: String, reason: String },
    #[error("cannot parse results of {name}: {reason}")]
    Results { name: String, reason: String },
}

/// Status of the job running as `w`.
pub fn compute_status(w: &Workload, labels: &LabelSet) -> Result<JobStatus, StatusError> {
    let name = labels
        .job_name(w)
        .ok_or_else(|| StatusError::NoName(w.name.clone()))?;

    let metadata = match w.annotations.get(&labels.annotation_metadata) {
        Some(raw) => serde_json::from_str(raw).map_err(|e| StatusError::Metadata {
            name: name.to_string(),
            reason: e.to_string(),
        })?,
        None => labels.metadata_from_user_data(w),
    };
    let results: Vec<JobResult> = match w.annotations.get(&labels.annotation_results) {
        Some(raw) => serde_json::from_str(raw).map_err(|e| StatusError::Results {
            name: name.to_string(),
            reason: e.to_string(),
        })?,
        None => Vec::new(),
    };

    let mut status = JobStatus::new(name, metadata);
    status.results = results;
    status.phase = derive_phase(w, labels, &mut status);
    if status.phase == JobPhase::Done {
        status.metadata.finished = Some(SystemTime::now());
    }
    Ok(status)
}

// Precedence: image pull failure, failed annotation, deletion, restart limit,
// all containers terminated, then the platform phase.
fn derive_phase(w: &Workload, labels: &LabelSet, status: &mut JobStatus) -> JobPhase {
    let mut any_failed = false;
    let mut max_restart = 0;
    let mut all_terminated = w.status.all().next().is_some();

    for cs in w.status.all() {
        match &cs.state {
            ContainerState::Waiting { reason, message } if reason == IMAGE_PULL_FAILURE => {
                status.conditions.success = false;
                status.details = Some(message.clone());
                return JobPhase::Done;
            }
            ContainerState::Terminated { exit_code } => any_failed |= *exit_code != 0,
            _ => all_terminated = false,
        }
        max_restart = max_restart.max(cs.restart_count);
    }

    let limit = labels.failure_limit(w);
    status.conditions.failure_count = max_restart;
    status.conditions.success = !(any_failed || max_restart > limit);

    if let Some(msg) = w.annotations.get(&labels.annotation_failed) {
        status.conditions.success = false;
        status.details = Some(msg.clone());
        return if w.deletion_requested {
            JobPhase::Cleanup
        } else {
            JobPhase::Done
        };
    }
    if w.deletion_requested {
        return JobPhase::Cleanup;
    }
    if max_restart > limit || all_terminated {
        return JobPhase::Done;
    }

    match w.status.phase {
        PodPhase::Pending => {
            let init = &w.status.init_containers;
            if !init.is_empty() && init.iter().all(|c| c.is_terminated()) {
                JobPhase::Starting
            } else {
                JobPhase::Preparing
            }
        }
        PodPhase::Running => JobPhase::Running,
        _ => JobPhase::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_model::{ContainerSpec, JobMetadata, Trigger, WorkloadSpec};

    fn workload(labels: &LabelSet) -> Workload {
        let spec = WorkloadSpec::new(vec![ContainerSpec::new("main").with_command(["make"])])
            .with_init_container(ContainerSpec::new("checkout").with_command(["git"]));
        let md = JobMetadata::new("alice", Trigger::Push);
        Workload::new("job.0", spec)
            .with_label(&labels.marker, "true")
            .with_label(&labels.job_name, "job.0")
            .with_annotation(&labels.annotation_metadata, serde_json::to_string(&md).unwrap())
    }

    fn set(w: &mut Workload, container: &str, state: ContainerState) {
        w.status.container_mut(container).unwrap().state = state;
    }

    fn compute(w: &Workload, l: &LabelSet) -> JobStatus {
        compute_status(w, l).unwrap()
    }

    #[test]
    fn pending_then_starting_then_running() {
        let l = LabelSet::default();
        let mut w = workload(&l);
        assert_eq!(compute(&w, &l).phase, JobPhase::Preparing);

        set(&mut w, "checkout", ContainerState::Terminated { exit_code: 0 });
        assert_eq!(compute(&w, &l).phase, JobPhase::Starting);

        w.status.phase = PodPhase::Running;
        set(&mut w, "main", ContainerState::Running);
        let st = compute(&w, &l);
        assert_eq!(st.phase, JobPhase::Running);
        assert_eq!(st.metadata.owner, "alice");
        assert!(st.metadata.finished.is_none());
    }

    #[test]
    fn all_terminated_is_done() {
        let l = LabelSet::default();
        let mut w = workload(&l);
        set(&mut w, "checkout", ContainerState::Terminated { exit_code: 0 });
        set(&mut w, "main", ContainerState::Terminated { exit_code: 0 });
        let st = compute(&w, &l);
        assert_eq!(st.phase, JobPhase::Done);
        assert!(st.conditions.success);
        assert!(st.metadata.finished.is_some());

        set(&mut w, "main", ContainerState::Terminated { exit_code: 2 });
        assert!(!compute(&w, &l).conditions.success);
    }

    #[test]
    fn image_pull_failure() {
        let l = LabelSet::default();
        let mut w = workload(&l);
        set(
            &mut w,
            "main",
            ContainerState::Waiting {
                reason: IMAGE_PULL_FAILURE.into(),
                message: "no such image".into(),
            },
        );
        let st = compute(&w, &l);
        assert_eq!(st.phase, JobPhase::Done);
        assert!(!st.conditions.success);
        assert_eq!(st.details.as_deref(), Some("no such image"));
    }

    #[test]
    fn failed_annotation_and_deletion() {
        let l = LabelSet::default();
        let mut w = workload(&l).with_annotation(&l.annotation_failed, "job was stopped manually");
        w.status.phase = PodPhase::Running;

        let st = compute(&w, &l);
        assert_eq!(st.phase, JobPhase::Done);
        assert!(!st.conditions.success);
        assert_eq!(st.details.as_deref(), Some("job was stopped manually"));

        w.deletion_requested = true;
        assert_eq!(compute(&w, &l).phase, JobPhase::Cleanup);

        w.annotations.remove(&l.annotation_failed);
        assert_eq!(compute(&w, &l).phase, JobPhase::Cleanup);
    }

    #[test]
    fn restarts_beyond_limit() {
        let l = LabelSet::default();
        let mut w = workload(&l).with_annotation(&l.annotation_failure_limit, "2");
        w.status.phase = PodPhase::Running;
        w.status.container_mut("main").unwrap().state = ContainerState::Running;

        w.status.container_mut("main").unwrap().restart_count = 2;
        let st = compute(&w, &l);
        assert_eq!(st.phase, JobPhase::Running);
        assert_eq!(st.conditions.failure_count, 2);
        assert!(st.conditions.success);

        w.status.container_mut("main").unwrap().restart_count = 3;
        let st = compute(&w, &l);
        assert_eq!(st.phase, JobPhase::Done);
        assert!(!st.conditions.success);
    }

    #[test]
    fn results_and_missing_metadata() {
        let l = LabelSet::default();
        let mut w = workload(&l);
        w.annotations.remove(&l.annotation_metadata);
        w.annotations
            .insert(format!("{}pr", l.user_data_prefix), "7".into());
        w.annotations.insert(
            l.annotation_results.clone(),
            serde_json::to_string(&vec![JobResult::new("url", "https://x")]).unwrap(),
        );

        let st = compute(&w, &l);
        assert_eq!(st.metadata.annotation("pr"), Some("7"));
        assert_eq!(st.results.len(), 1);
    }

    #[test]
    fn rejects_unowned_and_garbage() {
        let l = LabelSet::default();
        let mut w = workload(&l);
        w.labels.remove(&l.job_name);
        assert!(matches!(compute_status(&w, &l), Err(StatusError::NoName(_))));

        let w = workload(&l).with_annotation(&l.annotation_results, "not json");
        assert!(matches!(compute_status(&w, &l), Err(StatusError::Results { .. })));
    }
}

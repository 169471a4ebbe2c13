use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tern_core::{ListenOptions, LogsMode};
use tern_model::{
    ContainerSpec, FilterExpression, FilterOp, FilterTerm, JobConditions, JobMetadata, JobPhase,
    JobResult, JobSpec, JobStatus, KeyValue, LogSliceEvent, LogSliceType, Repository,
    RestartPolicy, Trigger, WorkloadSpec,
};
use tracing::warn;

use crate::error::ApiError;
use crate::proto_api;

fn to_secs(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or_else(|e| {
            warn!(target: "tern.api.grpc", error = %e, "timestamp is before unix epoch, defaulting to 0");
            Duration::ZERO
        })
        .as_secs() as i64
}

fn from_secs(secs: i64) -> Option<SystemTime> {
    u64::try_from(secs)
        .ok()
        .filter(|s| *s > 0)
        .map(|s| UNIX_EPOCH + Duration::from_secs(s))
}

// ============================================================================
// Domain -> proto
// ============================================================================

impl From<JobPhase> for proto_api::JobPhase {
    fn from(phase: JobPhase) -> Self {
        match phase {
            JobPhase::Unknown => proto_api::JobPhase::Unknown,
            JobPhase::Preparing => proto_api::JobPhase::Preparing,
            JobPhase::Starting => proto_api::JobPhase::Starting,
            JobPhase::Running => proto_api::JobPhase::Running,
            JobPhase::Done => proto_api::JobPhase::Done,
            JobPhase::Cleanup => proto_api::JobPhase::Cleanup,
        }
    }
}

impl From<Trigger> for proto_api::Trigger {
    fn from(trigger: Trigger) -> Self {
        match trigger {
            Trigger::Unknown => proto_api::Trigger::Unknown,
            Trigger::Manual => proto_api::Trigger::Manual,
            Trigger::Push => proto_api::Trigger::Push,
            Trigger::Deleted => proto_api::Trigger::Deleted,
        }
    }
}

impl From<LogSliceType> for proto_api::LogSliceType {
    fn from(t: LogSliceType) -> Self {
        match t {
            LogSliceType::Start => proto_api::LogSliceType::Start,
            LogSliceType::Content => proto_api::LogSliceType::Content,
            LogSliceType::Done => proto_api::LogSliceType::Done,
            LogSliceType::Fail => proto_api::LogSliceType::Fail,
            LogSliceType::Result => proto_api::LogSliceType::Result,
            LogSliceType::Phase => proto_api::LogSliceType::Phase,
            LogSliceType::Abandoned => proto_api::LogSliceType::Abandoned,
        }
    }
}

impl From<KeyValue> for proto_api::KeyValue {
    fn from(kv: KeyValue) -> Self {
        proto_api::KeyValue {
            key: kv.key().to_string(),
            value: kv.value().to_string(),
        }
    }
}

impl From<Repository> for proto_api::Repository {
    fn from(repo: Repository) -> Self {
        proto_api::Repository {
            host: repo.host,
            owner: repo.owner,
            repo: repo.repo,
            r#ref: repo.r#ref,
            revision: repo.revision,
        }
    }
}

impl From<JobMetadata> for proto_api::JobMetadata {
    fn from(md: JobMetadata) -> Self {
        proto_api::JobMetadata {
            owner: md.owner,
            trigger: proto_api::Trigger::from(md.trigger) as i32,
            repository: Some(md.repository.into()),
            annotations: md.annotations.into_iter().map(Into::into).collect(),
            created: to_secs(md.created),
            finished: md.finished.map(to_secs).unwrap_or(0),
        }
    }
}

impl From<JobResult> for proto_api::JobResult {
    fn from(res: JobResult) -> Self {
        proto_api::JobResult {
            r#type: res.r#type,
            payload: res.payload,
            description: res.description,
            channels: res.channels,
        }
    }
}

impl From<JobStatus> for proto_api::JobStatus {
    fn from(st: JobStatus) -> Self {
        proto_api::JobStatus {
            name: st.name,
            phase: proto_api::JobPhase::from(st.phase) as i32,
            conditions: Some(proto_api::JobConditions {
                success: st.conditions.success,
                failure_count: st.conditions.failure_count,
            }),
            metadata: Some(st.metadata.into()),
            results: st.results.into_iter().map(Into::into).collect(),
            details: st.details,
        }
    }
}

impl From<LogSliceEvent> for proto_api::LogSliceEvent {
    fn from(evt: LogSliceEvent) -> Self {
        proto_api::LogSliceEvent {
            name: evt.name,
            r#type: proto_api::LogSliceType::from(evt.r#type) as i32,
            payload: evt.payload,
        }
    }
}

// ============================================================================
// Proto -> domain
// ============================================================================

impl TryFrom<proto_api::JobStatus> for JobStatus {
    type Error = ApiError;

    fn try_from(st: proto_api::JobStatus) -> Result<Self, Self::Error> {
        let phase = match proto_api::JobPhase::try_from(st.phase)
            .map_err(|_| ApiError::InvalidRequest(format!("invalid phase: {}", st.phase)))?
        {
            proto_api::JobPhase::Unknown => JobPhase::Unknown,
            proto_api::JobPhase::Preparing => JobPhase::Preparing,
            proto_api::JobPhase::Starting => JobPhase::Starting,
            proto_api::JobPhase::Running => JobPhase::Running,
            proto_api::JobPhase::Done => JobPhase::Done,
            proto_api::JobPhase::Cleanup => JobPhase::Cleanup,
        };
        let conditions = st.conditions.unwrap_or_default();
        let metadata = st
            .metadata
            .ok_or_else(|| ApiError::InvalidRequest("missing metadata".into()))?;

        Ok(JobStatus {
            name: st.name,
            phase,
            conditions: JobConditions {
                success: conditions.success,
                failure_count: conditions.failure_count,
            },
            metadata: convert_metadata(metadata)?,
            results: st
                .results
                .into_iter()
                .map(|r| JobResult {
                    r#type: r.r#type,
                    payload: r.payload,
                    description: r.description,
                    channels: r.channels,
                })
                .collect(),
            details: st.details,
        })
    }
}

impl TryFrom<proto_api::JobSpec> for JobSpec {
    type Error = ApiError;

    fn try_from(spec: proto_api::JobSpec) -> Result<Self, Self::Error> {
        let metadata = spec
            .metadata
            .ok_or_else(|| ApiError::InvalidRequest("missing metadata".into()))?;
        let workload = spec
            .workload
            .ok_or_else(|| ApiError::InvalidRequest("missing workload".into()))?;

        Ok(JobSpec {
            job: spec.job,
            metadata: convert_metadata(metadata)?,
            workload: convert_workload(workload)?,
            mutex: spec.mutex,
            backoff_limit: spec.backoff_limit,
        })
    }
}

impl TryFrom<proto_api::FilterExpression> for FilterExpression {
    type Error = ApiError;

    fn try_from(expr: proto_api::FilterExpression) -> Result<Self, Self::Error> {
        if expr.terms.is_empty() {
            return Err(ApiError::InvalidRequest("empty filter expression".into()));
        }
        let terms = expr
            .terms
            .into_iter()
            .map(convert_term)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FilterExpression::new(terms))
    }
}

pub(crate) fn convert_filter(
    exprs: Vec<proto_api::FilterExpression>,
) -> Result<Vec<FilterExpression>, ApiError> {
    exprs.into_iter().map(FilterExpression::try_from).collect()
}

pub(crate) fn convert_listen(req: &proto_api::ListenRequest) -> Result<ListenOptions, ApiError> {
    let logs = match proto_api::LogsMode::try_from(req.logs)
        .map_err(|_| ApiError::InvalidRequest(format!("invalid logs mode: {}", req.logs)))?
    {
        proto_api::LogsMode::Disabled => LogsMode::Disabled,
        proto_api::LogsMode::Sliced => LogsMode::Sliced,
        proto_api::LogsMode::Unsliced => LogsMode::Unsliced,
    };
    if logs == LogsMode::Disabled && !req.updates {
        return Err(ApiError::InvalidRequest(
            "nothing to listen to: logs disabled and no updates requested".into(),
        ));
    }
    Ok(ListenOptions::default()
        .with_logs(logs)
        .with_updates(req.updates))
}

fn convert_term(term: proto_api::FilterTerm) -> Result<FilterTerm, ApiError> {
    if term.field.trim().is_empty() {
        return Err(ApiError::InvalidRequest("filter field is empty".into()));
    }
    let op = match proto_api::FilterOp::try_from(term.op)
        .map_err(|_| ApiError::InvalidRequest(format!("invalid filter op: {}", term.op)))?
    {
        proto_api::FilterOp::Equals => FilterOp::Equals,
        proto_api::FilterOp::Contains => FilterOp::Contains,
        proto_api::FilterOp::StartsWith => FilterOp::StartsWith,
        proto_api::FilterOp::EndsWith => FilterOp::EndsWith,
    };

    let mut out = FilterTerm::new(term.field, op, term.value);
    if term.negate {
        out = out.negated();
    }
    Ok(out)
}

fn convert_metadata(md: proto_api::JobMetadata) -> Result<JobMetadata, ApiError> {
    let trigger = match proto_api::Trigger::try_from(md.trigger)
        .map_err(|_| ApiError::InvalidRequest(format!("invalid trigger: {}", md.trigger)))?
    {
        proto_api::Trigger::Unknown => Trigger::Unknown,
        proto_api::Trigger::Manual => Trigger::Manual,
        proto_api::Trigger::Push => Trigger::Push,
        proto_api::Trigger::Deleted => Trigger::Deleted,
    };
    let repository = md
        .repository
        .map(|r| Repository {
            host: r.host,
            owner: r.owner,
            repo: r.repo,
            r#ref: r.r#ref,
            revision: r.revision,
        })
        .unwrap_or_default();

    let mut out = JobMetadata::new(md.owner, trigger).with_repository(repository);
    out.annotations = convert_env(md.annotations);
    if let Some(created) = from_secs(md.created) {
        out.created = created;
    }
    out.finished = from_secs(md.finished);
    Ok(out)
}

fn convert_workload(w: proto_api::WorkloadSpec) -> Result<WorkloadSpec, ApiError> {
    let restart_policy = match proto_api::RestartPolicy::try_from(w.restart_policy).map_err(|_| {
        ApiError::InvalidRequest(format!("invalid restart policy: {}", w.restart_policy))
    })? {
        proto_api::RestartPolicy::OnFailure => RestartPolicy::OnFailure,
        proto_api::RestartPolicy::Never => RestartPolicy::Never,
    };

    Ok(WorkloadSpec {
        init_containers: w.init_containers.into_iter().map(convert_container).collect(),
        containers: w.containers.into_iter().map(convert_container).collect(),
        restart_policy,
    })
}

fn convert_container(c: proto_api::ContainerSpec) -> ContainerSpec {
    ContainerSpec {
        name: c.name,
        image: c.image,
        command: c.command,
        args: c.args,
        env: convert_env(c.env),
        working_dir: c.working_dir,
    }
}

fn convert_env(env: Vec<proto_api::KeyValue>) -> Vec<KeyValue> {
    env.into_iter()
        .map(|kv| KeyValue::new(kv.key, kv.value))
        .collect()
}

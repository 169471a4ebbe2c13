use std::{convert::Infallible, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tern_core::{ListenEvent, ListenOptions, LogsMode};
use tern_model::{
    FilterExpression, JobMetadata, JobQuery, JobSpec, JobStatus, KeyValue, Repository, Trigger,
    WorkloadSpec, filter,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{error::ApiError, handler::ApiHandler};

const TARGET: &str = "tern.api.http";

/// HTTP API service builder.
pub struct HttpApi<H> {
    handler: Arc<H>,
}

impl<H> HttpApi<H>
where
    H: ApiHandler,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Build axum router with mounted endpoints.
    ///
    /// Routes:
    /// - POST /api/v1/jobs - Start job
    /// - GET /api/v1/jobs - List jobs (`filter`, `limit`, `offset`)
    /// - GET /api/v1/jobs/{name} - Get job status
    /// - POST /api/v1/jobs/{name}/stop - Stop job
    /// - GET /api/v1/jobs/{name}/listen - Follow logs and updates (SSE)
    /// - GET /api/v1/subscribe - Follow status updates (SSE)
    pub fn router(self) -> Router {
        Router::new()
            .route("/api/v1/jobs", post(start_job::<H>).get(list_jobs::<H>))
            .route("/api/v1/jobs/{name}", get(get_job::<H>))
            .route("/api/v1/jobs/{name}/stop", post(stop_job::<H>))
            .route("/api/v1/jobs/{name}/listen", get(listen::<H>))
            .route("/api/v1/subscribe", get(subscribe::<H>))
            .with_state(self.handler)
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartJobRequest {
    #[serde(default)]
    job: String,
    owner: String,
    #[serde(default)]
    trigger: Trigger,
    #[serde(default)]
    repository: Repository,
    #[serde(default)]
    annotations: Vec<KeyValue>,
    workload: WorkloadSpec,
    #[serde(default)]
    mutex: Option<String>,
    #[serde(default)]
    backoff_limit: Option<u32>,
}

impl From<StartJobRequest> for JobSpec {
    fn from(req: StartJobRequest) -> Self {
        let mut metadata = JobMetadata::new(req.owner, req.trigger).with_repository(req.repository);
        metadata.annotations = req.annotations;

        JobSpec {
            job: req.job,
            metadata,
            workload: req.workload,
            mutex: req.mutex,
            backoff_limit: req.backoff_limit,
        }
    }
}

#[derive(Debug, Serialize)]
struct StartJobResponse {
    name: String,
    status: JobStatus,
}

#[derive(Debug, Serialize)]
struct ListJobsResponse {
    jobs: Vec<JobStatus>,
    total: usize,
}

#[derive(Debug, Default, Deserialize)]
struct ListenParams {
    /// `sliced` (default), `unsliced` or `none`
    logs: Option<String>,
    /// Include status updates (default true)
    updates: Option<bool>,
}

impl ListenParams {
    fn options(&self) -> Result<ListenOptions, ApiError> {
        let logs = match self.logs.as_deref().map(str::trim) {
            None | Some("sliced") => LogsMode::Sliced,
            Some("unsliced") => LogsMode::Unsliced,
            Some("none") => LogsMode::Disabled,
            Some(other) => {
                return Err(ApiError::InvalidRequest(format!(
                    "invalid logs mode: '{other}' (valid: sliced, unsliced, none)"
                )));
            }
        };
        let opts = ListenOptions::default()
            .with_logs(logs)
            .with_updates(self.updates.unwrap_or(true));
        if opts.logs == LogsMode::Disabled && !opts.updates {
            return Err(ApiError::InvalidRequest(
                "nothing to listen to: logs=none and updates=false".into(),
            ));
        }
        Ok(opts)
    }
}

// Repeated `filter` parameters are AND-ed, commas inside one are OR-ed.
fn parse_filter(params: &[(String, String)]) -> Result<Vec<FilterExpression>, ApiError> {
    params
        .iter()
        .filter(|(k, _)| k == "filter")
        .map(|(_, v)| filter::parse_expression(v).map_err(ApiError::from))
        .collect()
}

fn parse_number(params: &[(String, String)], key: &str) -> Result<Option<usize>, ApiError> {
    params
        .iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| {
            v.trim()
                .parse()
                .map_err(|_| ApiError::InvalidRequest(format!("invalid {key}: '{v}'")))
        })
        .transpose()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/jobs
async fn start_job<H>(
    State(handler): State<Arc<H>>,
    Json(req): Json<StartJobRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    debug!(target: TARGET, job = %req.job, owner = %req.owner, "starting job");
    let status = handler.start_job(req.into()).await?;

    let response = StartJobResponse {
        name: status.name.clone(),
        status,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/v1/jobs
///
/// Query params (all optional):
/// - ?filter=phase==running,phase==preparing&filter=owner==alice
/// - ?limit=50 - max items per page (default 100, max 1000)
/// - ?offset=0 - pagination offset
async fn list_jobs<H>(
    State(handler): State<Arc<H>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let mut query = JobQuery::new().with_filter(parse_filter(&params)?);
    if let Some(limit) = parse_number(&params, "limit")? {
        query = query.with_limit(limit);
    }
    if let Some(offset) = parse_number(&params, "offset")? {
        query = query.with_offset(offset);
    }

    let page = handler.list_jobs(query).await?;
    debug!(target: TARGET, count = page.items.len(), total = page.total, "jobs listed");

    Ok(Json(ListJobsResponse {
        jobs: page.items,
        total: page.total,
    }))
}

/// GET /api/v1/jobs/{name}
async fn get_job<H>(
    State(handler): State<Arc<H>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    Ok(Json(handler.get_job(&name).await?))
}

/// POST /api/v1/jobs/{name}/stop
async fn stop_job<H>(
    State(handler): State<Arc<H>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    handler.stop_job(&name).await?;
    debug!(target: TARGET, job = %name, "job stop requested");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/jobs/{name}/listen
///
/// Events: `slice` (a `LogSliceEvent`), `update` (a `JobStatus`) and a
/// final `error` when the listener fails or is aborted.
async fn listen<H>(
    State(handler): State<Arc<H>>,
    Path(name): Path<String>,
    Query(params): Query<ListenParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError>
where
    H: ApiHandler,
{
    let cancel = CancellationToken::new();
    let rx = handler.listen(&name, params.options()?, cancel.clone()).await?;
    debug!(target: TARGET, job = %name, "listener attached");

    // The guard cancels the listener once the client goes away.
    let guard = cancel.drop_guard();
    let events = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let event = match rx.recv().await? {
            Ok(ListenEvent::Slice(slice)) => json_event("slice", &slice),
            Ok(ListenEvent::Update(status)) => json_event("update", &status),
            Err(e) => Event::default().event("error").data(e.to_string()),
        };
        Some((Ok(event), (rx, guard)))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// GET /api/v1/subscribe?filter=...
async fn subscribe<H>(
    State(handler): State<Arc<H>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError>
where
    H: ApiHandler,
{
    let sub = handler.subscribe(parse_filter(&params)?);
    debug!(target: TARGET, subscriber = %sub.id(), "subscriber attached");

    let events = stream::unfold(sub, |mut sub| async move {
        let status = sub.recv().await?;
        Some((Ok(json_event("update", &status)), sub))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn json_event<T: Serialize>(kind: &'static str, value: &T) -> Event {
    Event::default()
        .event(kind)
        .json_data(value)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

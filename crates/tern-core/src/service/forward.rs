use std::sync::Arc;

use serde::Deserialize;
use tern_model::{JobResult, LogSliceEvent, LogSliceType};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    cutter::{Cutter, DefaultCutter},
    error::ReportedError,
    executor::JobExecutor,
    logs::LogStore,
};

use super::ErrorHandler;

/// Body of a `[<type>|RESULT] {...}` line.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultPayload {
    payload: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    channels: Vec<String>,
}

/// Extract a job result from a `RESULT` slice event.
///
/// The payload is either a JSON object or `<payload> <description...>`.
pub(crate) fn parse_result(evt: &LogSliceEvent) -> Option<JobResult> {
    if evt.r#type != LogSliceType::Result {
        return None;
    }
    let body = evt.payload.trim();
    let r#type = evt.name.trim();

    if body.starts_with('{') {
        let p: ResultPayload = serde_json::from_str(body).ok()?;
        if p.payload.is_empty() {
            return None;
        }
        let mut res = JobResult::new(r#type, p.payload).with_description(p.description);
        res.channels = p.channels;
        return Some(res);
    }

    let mut fields = body.split_whitespace();
    let payload = fields.next()?;
    let description = fields.collect::<Vec<_>>().join(" ");
    Some(JobResult::new(r#type, payload).with_description(description))
}

/// Copy the executor's output of `name` into its log session until the
/// output ends or `cancel` fires.
pub(crate) async fn forward_logs(
    name: String,
    logs: Arc<dyn LogStore>,
    executor: Arc<dyn JobExecutor>,
    on_error: ErrorHandler,
    cancel: CancellationToken,
) {
    let mut lines = executor.logs(&name, cancel.clone());
    let mut cutter = DefaultCutter::new();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        if let Err(e) = logs.write(&name, format!("{line}\n").as_bytes()) {
            on_error(ReportedError::LogForwarding {
                job: name.clone(),
                reason: e.to_string(),
            });
            let reason = format!("log infrastructure failure: {e}");
            if let Err(e) = executor.stop(&name, &reason).await {
                warn!(target: "tern.core.forward", job = %name, error = %e, "cannot stop job after log failure");
            }
            return;
        }

        for evt in cutter.feed(&line) {
            let Some(result) = parse_result(&evt) else {
                continue;
            };
            if let Err(e) = executor.register_result(&name, result).await {
                warn!(target: "tern.core.forward", job = %name, error = %e, "cannot register result");
            }
        }
    }
    debug!(target: "tern.core.forward", job = %name, "log forwarding ended");
}

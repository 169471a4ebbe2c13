use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use tern_core::{Notifier, NotifyError};
use tern_model::JobStatus;
use tracing::{debug, trace};

use crate::{config::WebhookConfig, error::WebhookError};

/// Body of one webhook call.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Notification<'a> {
    origin: &'a str,
    sent_at: u64,
    job: &'a JobStatus,
}

/// POSTs job statuses as JSON to a fixed endpoint.
pub struct WebhookNotifier {
    cfg: WebhookConfig,
    client: reqwest::Client,
    origin: String,
}

impl WebhookNotifier {
    pub fn new(cfg: WebhookConfig) -> Result<Self, WebhookError> {
        if !cfg.endpoint.starts_with("http://") && !cfg.endpoint.starts_with("https://") {
            return Err(WebhookError::InvalidEndpoint(cfg.endpoint.clone()));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &cfg.headers {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|_| WebhookError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::try_from(value.as_str())
                .map_err(|_| WebhookError::InvalidHeader(name.to_string()))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .default_headers(headers)
            .build()?;

        let origin = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "tern".to_string());

        Ok(Self {
            cfg,
            client,
            origin,
        })
    }

    async fn send(&self, status: &JobStatus) -> Result<(), WebhookError> {
        let body = Notification {
            origin: &self.origin,
            sent_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            job: status,
        };

        self.client
            .post(&self.cfg.endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, status: &JobStatus) -> Result<(), NotifyError> {
        if !self.cfg.phases.contains(&status.phase) {
            trace!(target: "tern.notify.webhook", job = %status.name, phase = %status.phase, "phase not subscribed");
            return Ok(());
        }

        self.send(status)
            .await
            .map_err(|e| NotifyError(format!("webhook {}: {e}", self.cfg.endpoint)))?;
        debug!(target: "tern.notify.webhook", job = %status.name, phase = %status.phase, "webhook delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::post,
    };
    use std::time::Duration;
    use tern_model::{JobMetadata, JobPhase, Trigger};
    use tokio::{net::TcpListener, sync::mpsc};

    type Received = mpsc::UnboundedSender<(Option<String>, serde_json::Value)>;

    async fn hook(
        State(tx): State<Received>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        let token = headers
            .get("x-tern-token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let _ = tx.send((token, body));
        StatusCode::NO_CONTENT
    }

    async fn broken() -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    async fn serve() -> (String, mpsc::UnboundedReceiver<(Option<String>, serde_json::Value)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new()
            .route("/hook", post(hook))
            .route("/broken", post(broken))
            .with_state(tx);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}"), rx)
    }

    fn status(phase: JobPhase) -> JobStatus {
        JobStatus::new("widget-build-main.0", JobMetadata::new("alice", Trigger::Push))
            .with_phase(phase)
    }

    #[tokio::test]
    async fn posts_done_statuses() {
        let (base, mut rx) = serve().await;
        let notifier = WebhookNotifier::new(
            WebhookConfig::new(format!("{base}/hook")).with_header("x-tern-token", "s3cret"),
        )
        .unwrap();

        notifier.notify(&status(JobPhase::Running)).await.unwrap();
        notifier.notify(&status(JobPhase::Done)).await.unwrap();

        let (token, body) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.as_deref(), Some("s3cret"));
        assert_eq!(body["job"]["name"], "widget-build-main.0");
        assert_eq!(body["job"]["phase"], "done");
        assert!(body["origin"].is_string());
        assert!(rx.try_recv().is_err(), "running status was sent");
    }

    #[tokio::test]
    async fn server_errors_are_reported() {
        let (base, _rx) = serve().await;
        let notifier = WebhookNotifier::new(WebhookConfig::new(format!("{base}/broken"))).unwrap();

        let err = notifier.notify(&status(JobPhase::Done)).await.unwrap_err();
        assert!(err.0.contains("/broken"), "{err}");
    }

    #[test]
    fn rejects_bad_config() {
        assert!(matches!(
            WebhookNotifier::new(WebhookConfig::new("ftp://ci.local")),
            Err(WebhookError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            WebhookNotifier::new(WebhookConfig::new("http://ci.local").with_header("bad header", "x")),
            Err(WebhookError::InvalidHeader(_))
        ));
    }
}

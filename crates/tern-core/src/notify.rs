use async_trait::async_trait;
use tern_model::JobStatus;

use crate::error::NotifyError;

/// External status notifications (commit status, chat, webhooks).
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, status: &JobStatus) -> Result<(), NotifyError>;
}

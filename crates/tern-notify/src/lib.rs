//! Outbound notifications about job transitions.

mod config;
pub use config::WebhookConfig;

mod error;
pub use error::WebhookError;

mod webhook;
pub use webhook::WebhookNotifier;

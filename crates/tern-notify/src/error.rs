use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("invalid webhook endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("invalid header {0}")]
    InvalidHeader(String),

    #[error("http request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),
}

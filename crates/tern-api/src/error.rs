use tern_core::ServiceError;
use tern_model::FilterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("aborted: {0}")]
    Aborted(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidArgument(msg) => ApiError::InvalidRequest(msg),
            ServiceError::NotFound(msg) => ApiError::NotFound(msg),
            ServiceError::FailedPrecondition(msg) => ApiError::FailedPrecondition(msg),
            ServiceError::Aborted(msg) => ApiError::Aborted(msg),
            ServiceError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        ApiError::InvalidRequest(format!("invalid filter: {err}"))
    }
}

#[cfg(feature = "grpc")]
impl From<ApiError> for tonic::Status {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::InvalidRequest(msg) => tonic::Status::invalid_argument(msg),
            ApiError::NotFound(msg) => tonic::Status::not_found(msg),
            ApiError::FailedPrecondition(msg) => tonic::Status::failed_precondition(msg),
            ApiError::Aborted(msg) => tonic::Status::aborted(msg),
            ApiError::Internal(msg) => tonic::Status::internal(format!("internal error: {msg}")),
        }
    }
}

#[cfg(feature = "http")]
impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let code = match &self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::FailedPrecondition(_) => StatusCode::CONFLICT,
            ApiError::Aborted(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if code.is_server_error() {
            tracing::warn!(target: "tern.api.http", error = %self, "request failed");
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (code, axum::Json(body)).into_response()
    }
}

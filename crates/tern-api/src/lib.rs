//! Transport boundary of the job service.
//!
//! [`ApiHandler`] is the seam every transport talks to; [`ServiceAdapter`]
//! backs it with a [`tern_core::JobService`]. The `http` feature mounts it
//! as a JSON + server-sent-events API, the `grpc` feature as a tonic service
//! with server streaming.

mod error;
pub use error::ApiError;

mod handler;
pub use handler::{ApiHandler, ListenStream};

mod adapter;
pub use adapter::ServiceAdapter;

#[cfg(feature = "grpc")]
mod proto_api {
    tonic::include_proto!("tern.v1");
}

#[cfg(feature = "grpc")]
mod convert;

#[cfg(feature = "grpc")]
mod grpc;

#[cfg(feature = "grpc")]
pub use grpc::TernApiService;

#[cfg(feature = "grpc")]
pub use proto_api::tern_api_server::TernApiServer;

#[cfg(feature = "grpc")]
pub use tonic;

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpApi;

#[cfg(feature = "http")]
pub use axum;

#[cfg(test)]
mod testing;

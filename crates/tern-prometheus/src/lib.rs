//! Prometheus metrics for tern job orchestration.
//!
//! [`PrometheusMetrics`] is fed with every published job status and every
//! reported background failure; the process exposes the result on its own
//! HTTP server.
//!
//! ## Example
//! ```rust
//! use tern_prometheus::PrometheusMetrics;
//! use tern_model::{JobMetadata, JobPhase, JobStatus, Trigger};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let status = JobStatus::new("widget-build-main.0", JobMetadata::new("alice", Trigger::Push))
//!     .with_phase(JobPhase::Running);
//! metrics.observe(&status);
//!
//! let text = metrics.encode()?;
//! assert!(text.contains("tern_job_transitions_total"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `tern_job_transitions_total{phase}` - Counter
//! - `tern_jobs_finished_total{outcome}` - Counter
//! - `tern_job_duration_seconds` - Histogram
//! - `tern_reported_errors_total{kind}` - Counter

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};

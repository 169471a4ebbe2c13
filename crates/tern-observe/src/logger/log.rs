use thiserror::Error;
use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing::{Subscriber, debug};
use tracing_subscriber::{
    EnvFilter, fmt, fmt::time::OffsetTime, layer::SubscriberExt, registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, format::LoggerFormat};

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("unknown log format {0:?}, expected one of text, json, journald")]
    InvalidFormat(String),
    #[error("journald output needs Linux and the `journald` feature")]
    JournaldNotSupported,
    #[error("a global log subscriber is already installed")]
    AlreadyInitialized,
    #[error("cannot install log subscriber: {0}")]
    InitializationFailed(String),
    #[error("invalid log filter {directives:?}: {reason}")]
    InvalidLogLevel { directives: String, reason: String },
}

/// Install the process-wide subscriber described by `cfg`.
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let base = tracing_subscriber::registry().with(mk_filter(&cfg.level)?);
    match cfg.format {
        LoggerFormat::Text => install(
            base.with(
                fmt::layer()
                    .with_ansi(cfg.use_color)
                    .with_target(cfg.with_targets)
                    .with_timer(mk_timer()),
            ),
        )?,
        // One JSON object per line; span fields are flattened into the event.
        LoggerFormat::Json => install(
            base.with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_ansi(false)
                    .with_target(cfg.with_targets)
                    .with_timer(mk_timer()),
            ),
        )?,
        LoggerFormat::Journald => journald(base)?,
    }
    debug!(target: "tern.observe.logger", format = ?cfg.format, level = %cfg.level, "logger installed");
    Ok(())
}

pub(crate) fn mk_filter(directives: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(directives).map_err(|e| LoggerError::InvalidLogLevel {
        directives: directives.to_string(),
        reason: e.to_string(),
    })
}

fn mk_timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

fn install<S>(subscriber: S) -> Result<(), LoggerError>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber.try_init().map_err(|e| {
        let msg = e.to_string();
        if msg.contains("already") {
            LoggerError::AlreadyInitialized
        } else {
            LoggerError::InitializationFailed(msg)
        }
    })
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald<S>(base: S) -> Result<(), LoggerError>
where
    S: Subscriber + Send + Sync + for<'a> LookupSpan<'a> + 'static,
{
    let layer = tracing_journald::layer()
        .map_err(|e| LoggerError::InitializationFailed(format!("journald: {e}")))?
        .with_syslog_identifier("tern".to_string());
    install(base.with(layer))
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald<S>(_base: S) -> Result<(), LoggerError>
where
    S: Subscriber + Send + Sync + for<'a> LookupSpan<'a> + 'static,
{
    Err(LoggerError::JournaldNotSupported)
}

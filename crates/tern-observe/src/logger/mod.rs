mod config;
mod format;
mod log;

pub use config::LoggerConfig;
pub use format::LoggerFormat;
pub use log::{LoggerError, logger_init};

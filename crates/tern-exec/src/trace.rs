use std::{
    fs::OpenOptions,
    io::{self, Write},
    sync::{Mutex, PoisonError},
};

use tern_model::JobStatus;

use crate::error::ConfigError;

/// JSON-lines record of every status the executor computed.
pub(crate) struct EventTrace {
    out: Mutex<Box<dyn Write + Send>>,
}

impl EventTrace {
    /// `-` writes to stdout, anything else is a file opened for appending.
    pub(crate) fn open(path: &str) -> Result<Self, ConfigError> {
        let out: Box<dyn Write + Send> = if path == "-" {
            Box::new(io::stdout())
        } else {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| ConfigError::TraceLog {
                    path: path.to_string(),
                    reason: e.to_string(),
                })?;
            Box::new(file)
        };
        Ok(Self {
            out: Mutex::new(out),
        })
    }

    /// Failures are ignored.
    pub(crate) fn record(&self, status: &JobStatus) {
        let Ok(line) = serde_json::to_string(status) else {
            return;
        };
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }
}

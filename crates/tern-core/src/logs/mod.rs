//! Append-only log sessions that can be read while they are written.
//!
//! Every session is independently locked. Readers start at offset 0, wait
//! for more bytes while the session is open and see end-of-stream once it
//! is closed and drained.

mod file;
pub use file::FileLogStore;

mod memory;
pub use memory::MemoryLogStore;

mod session;
pub use session::{LogReader, LogWriter};

use crate::error::LogError;

/// Durable single-writer, multi-reader log sink keyed by job name.
pub trait LogStore: Send + Sync + 'static {
    /// Create a new session for `id`.
    fn open(&self, id: &str) -> Result<LogWriter, LogError>;

    /// Append to the open session of `id`.
    fn write(&self, id: &str, bytes: &[u8]) -> Result<(), LogError>;

    /// Reader positioned at the start of the session of `id`.
    fn read(&self, id: &str) -> Result<LogReader, LogError>;
}

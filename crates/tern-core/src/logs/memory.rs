use std::{
    io,
    sync::{Arc, PoisonError, RwLock},
};

use crate::error::LogError;
use crate::logs::{
    LogReader, LogStore, LogWriter,
    session::{Cursor, Registry, Segment},
};

#[derive(Default)]
struct MemorySegment(Arc<RwLock<Vec<u8>>>);

impl Segment for MemorySegment {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(bytes);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.0.read().unwrap_or_else(PoisonError::into_inner).len() as u64
    }

    fn cursor(&self) -> io::Result<Box<dyn Cursor>> {
        Ok(Box::new(MemoryCursor(Arc::clone(&self.0))))
    }
}

struct MemoryCursor(Arc<RwLock<Vec<u8>>>);

impl Cursor for MemoryCursor {
    fn read_at(&mut self, pos: u64, dst: &mut [u8]) -> io::Result<usize> {
        let data = self.0.read().unwrap_or_else(PoisonError::into_inner);
        let start = usize::try_from(pos).unwrap_or(usize::MAX).min(data.len());
        let src = &data[start..];
        let n = src.len().min(dst.len());
        dst[..n].copy_from_slice(&src[..n]);
        Ok(n)
    }
}

/// Log store keeping every session in memory.
#[derive(Default)]
pub struct MemoryLogStore {
    registry: Registry,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for MemoryLogStore {
    fn open(&self, id: &str) -> Result<LogWriter, LogError> {
        self.registry
            .open_with(id, || Ok(Box::new(MemorySegment::default())))
    }

    fn write(&self, id: &str, bytes: &[u8]) -> Result<(), LogError> {
        self.registry.write(id, bytes)
    }

    fn read(&self, id: &str) -> Result<LogReader, LogError> {
        self.registry.read(id)
    }
}

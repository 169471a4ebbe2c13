use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::error::LogError;
use crate::logs::{
    LogReader, LogStore, LogWriter,
    session::{Cursor, Registry, Segment},
};

const EXT: &str = "log";

struct FileSegment {
    file: File,
    path: PathBuf,
    len: u64,
}

impl Segment for FileSegment {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)?;
        self.len += bytes.len() as u64;
        Ok(())
    }

    fn len(&self) -> u64 {
        self.len
    }

    // Every reader gets its own handle, so no cursor is shared.
    fn cursor(&self) -> io::Result<Box<dyn Cursor>> {
        Ok(Box::new(FileCursor(File::open(&self.path)?)))
    }

    fn seal(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }
}

struct FileCursor(File);

impl Cursor for FileCursor {
    fn read_at(&mut self, pos: u64, dst: &mut [u8]) -> io::Result<usize> {
        self.0.seek(SeekFrom::Start(pos))?;
        self.0.read(dst)
    }
}

/// Log store persisting each session as `<base>/<id>.log`.
///
/// Files found at start-up are registered as closed, readable sessions.
pub struct FileLogStore {
    base: PathBuf,
    registry: Registry,
}

impl FileLogStore {
    pub fn new(base: impl Into<PathBuf>) -> Result<Self, LogError> {
        let base = base.into();
        fs::create_dir_all(&base)?;

        let registry = Registry::default();
        let mut recovered = 0usize;
        for entry in fs::read_dir(&base)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXT) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let file = File::open(&path)?;
            let len = file.metadata()?.len();
            registry.insert_closed(id, Box::new(FileSegment { file, path: path.clone(), len }));
            recovered += 1;
        }
        debug!(base = %base.display(), recovered, "file log store ready");

        Ok(Self { base, registry })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn path_of(&self, id: &str) -> Result<PathBuf, LogError> {
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && !id.contains(['/', '\\'])
            && !id.contains("..");
        if !valid {
            return Err(LogError::InvalidId(id.to_string()));
        }
        Ok(self.base.join(format!("{id}.{EXT}")))
    }
}

impl LogStore for FileLogStore {
    fn open(&self, id: &str) -> Result<LogWriter, LogError> {
        let path = self.path_of(id)?;
        self.registry.open_with(id, || {
            let file = OpenOptions::new()
                .append(true)
                .create_new(true)
                .open(&path)
                .map_err(|e| match e.kind() {
                    // Written by someone else after start-up.
                    io::ErrorKind::AlreadyExists => LogError::Closed(id.to_string()),
                    _ => LogError::Io(e),
                })?;
            Ok(Box::new(FileSegment { file, path, len: 0 }))
        })
    }

    fn write(&self, id: &str, bytes: &[u8]) -> Result<(), LogError> {
        self.registry.write(id, bytes)
    }

    fn read(&self, id: &str) -> Result<LogReader, LogError> {
        self.registry.read(id)
    }
}

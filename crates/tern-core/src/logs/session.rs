use std::{
    collections::HashMap,
    io,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
    task::{Context, Poll, ready},
};

use tokio::{
    io::{AsyncRead, ReadBuf},
    sync::watch,
};
use tokio_util::sync::ReusableBoxFuture;
use tracing::warn;

use crate::error::LogError;

/// Backing storage of one session.
pub(crate) trait Segment: Send {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn len(&self) -> u64;

    /// Independent read position over the stored bytes. Cursors are used
    /// without holding the session lock.
    fn cursor(&self) -> io::Result<Box<dyn Cursor>>;

    /// Called once when the session is closed.
    fn seal(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub(crate) trait Cursor: Send {
    /// Copy bytes starting at `pos`; only bytes below the observed length are asked for.
    fn read_at(&mut self, pos: u64, dst: &mut [u8]) -> io::Result<usize>;
}

struct SessionState {
    segment: Box<dyn Segment>,
    closed: bool,
}

/// One append-only byte stream with its own lock and wake-up channel.
pub(crate) struct Session {
    id: String,
    state: Mutex<SessionState>,
    // Bumped after every append and on close.
    version: watch::Sender<u64>,
}

impl Session {
    fn new(id: &str, segment: Box<dyn Segment>, closed: bool) -> Arc<Self> {
        let (version, _) = watch::channel(0);
        Arc::new(Self {
            id: id.to_string(),
            state: Mutex::new(SessionState { segment, closed }),
            version,
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn append(&self, bytes: &[u8]) -> Result<(), LogError> {
        {
            let mut st = self.lock();
            if st.closed {
                return Err(LogError::Closed(self.id.clone()));
            }
            st.segment.append(bytes)?;
        }
        self.bump();
        Ok(())
    }

    fn close(&self) -> Result<(), LogError> {
        let res = {
            let mut st = self.lock();
            if st.closed {
                return Ok(());
            }
            st.closed = true;
            st.segment.seal()
        };
        self.bump();
        res.map_err(LogError::from)
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }
}

/// Write handle of an open session. Dropping it closes the session.
pub struct LogWriter {
    session: Arc<Session>,
}

impl LogWriter {
    pub fn id(&self) -> &str {
        &self.session.id
    }

    pub fn write(&self, bytes: &[u8]) -> Result<(), LogError> {
        self.session.append(bytes)
    }

    /// Finalize the session; readers see end-of-stream after draining.
    pub fn close(&self) -> Result<(), LogError> {
        self.session.close()
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        if let Err(e) = self.session.close() {
            warn!(log = %self.session.id, error = %e, "closing log session failed");
        }
    }
}

type Wait = (Result<(), watch::error::RecvError>, watch::Receiver<u64>);

async fn wait_for_write(mut rx: watch::Receiver<u64>) -> Wait {
    let res = rx.changed().await;
    (res, rx)
}

/// Independent reader of one session, starting at offset 0.
pub struct LogReader {
    session: Arc<Session>,
    cursor: Box<dyn Cursor>,
    pos: u64,
    wait: ReusableBoxFuture<'static, Wait>,
}

impl LogReader {
    fn new(session: Arc<Session>) -> io::Result<Self> {
        let cursor = session.lock().segment.cursor()?;
        // Subscribing marks the current version as seen before the first data check.
        let rx = session.version.subscribe();
        Ok(Self {
            session,
            cursor,
            pos: 0,
            wait: ReusableBoxFuture::new(wait_for_write(rx)),
        })
    }

    /// Copy available bytes; `Ok(true)` when the caller can return.
    fn try_read(&mut self, buf: &mut ReadBuf<'_>) -> io::Result<bool> {
        let (len, closed) = {
            let st = self.session.lock();
            (st.segment.len(), st.closed)
        };
        if self.pos < len {
            let want = (len - self.pos).min(buf.remaining() as u64) as usize;
            let dst = buf.initialize_unfilled_to(want);
            let n = self.cursor.read_at(self.pos, dst)?;
            buf.advance(n);
            self.pos += n as u64;
            return Ok(true);
        }
        Ok(closed)
    }
}

impl AsyncRead for LogReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            if this.try_read(buf)? {
                return Poll::Ready(Ok(()));
            }

            let (res, rx) = ready!(this.wait.poll(cx));
            this.wait.set(wait_for_write(rx));
            if res.is_err() {
                return Poll::Ready(Ok(()));
            }
        }
    }
}

/// Sessions by id. The map lock is only held for lookups and inserts.
#[derive(Default)]
pub(crate) struct Registry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl Registry {
    pub(crate) fn open_with<F>(&self, id: &str, make: F) -> Result<LogWriter, LogError>
    where
        F: FnOnce() -> Result<Box<dyn Segment>, LogError>,
    {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = sessions.get(id) {
            return Err(if existing.is_closed() {
                LogError::Closed(id.to_string())
            } else {
                LogError::AlreadyOpen(id.to_string())
            });
        }

        let session = Session::new(id, make()?, false);
        sessions.insert(id.to_string(), Arc::clone(&session));
        Ok(LogWriter { session })
    }

    /// Register a finished session, e.g. one recovered from disk.
    pub(crate) fn insert_closed(&self, id: &str, segment: Box<dyn Segment>) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(id.to_string(), Session::new(id, segment, true));
    }

    fn get(&self, id: &str) -> Result<Arc<Session>, LogError> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| LogError::NotFound(id.to_string()))
    }

    pub(crate) fn write(&self, id: &str, bytes: &[u8]) -> Result<(), LogError> {
        self.get(id)?.append(bytes)
    }

    pub(crate) fn read(&self, id: &str) -> Result<LogReader, LogError> {
        Ok(LogReader::new(self.get(id)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    type Shared = Arc<Mutex<Vec<u8>>>;
    type Hook = Arc<Mutex<Option<LogWriter>>>;

    struct SharedSegment {
        data: Shared,
        hook: Hook,
    }

    impl Segment for SharedSegment {
        fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.data.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        }
        fn len(&self) -> u64 {
            self.data.lock().unwrap().len() as u64
        }
        fn cursor(&self) -> io::Result<Box<dyn Cursor>> {
            Ok(Box::new(WritingCursor {
                data: Arc::clone(&self.data),
                hook: Arc::clone(&self.hook),
                wrote: false,
            }))
        }
    }

    // Appends through the session on its first read.
    struct WritingCursor {
        data: Shared,
        hook: Hook,
        wrote: bool,
    }

    impl Cursor for WritingCursor {
        fn read_at(&mut self, pos: u64, dst: &mut [u8]) -> io::Result<usize> {
            if !self.wrote {
                self.wrote = true;
                if let Some(w) = self.hook.lock().unwrap().as_ref() {
                    w.write(b"second\n").unwrap();
                }
            }
            let data = self.data.lock().unwrap();
            let src = &data[pos as usize..];
            let n = src.len().min(dst.len());
            dst[..n].copy_from_slice(&src[..n]);
            Ok(n)
        }
    }

    #[tokio::test]
    async fn writers_are_not_blocked_by_reads() {
        let data = Shared::default();
        let hook = Hook::default();
        let registry = Registry::default();
        let writer = registry
            .open_with("job", || {
                Ok(Box::new(SharedSegment {
                    data: Arc::clone(&data),
                    hook: Arc::clone(&hook),
                }))
            })
            .unwrap();
        writer.write(b"first\n").unwrap();
        *hook.lock().unwrap() = Some(writer);

        let mut reader = registry.read("job").unwrap();
        let mut buf = [0u8; 64];
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"first\n");

        let writer = hook.lock().unwrap().take().unwrap();
        writer.close().unwrap();
        let mut rest = String::new();
        reader.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "second\n");
    }
}

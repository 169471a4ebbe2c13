//! Splits one raw log stream into named, typed slices.
//!
//! Line grammar:
//! - `[name] payload` is content of slice `name`
//! - `[name|VERB] payload` carries a control verb (`PHASE`, `DONE`, `FAIL`, `RESULT`)
//! - anything else is content of the current phase slice
//!
//! Every `START` is matched by exactly one `DONE`, `FAIL` or `ABANDONED`.

use std::io;

use tern_model::{LogSliceEvent, LogSliceType};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::mpsc,
};
use tracing::trace;

/// Slice that receives unmarked content until a phase is announced.
pub const DEFAULT_SLICE: &str = "default";

const EVENT_BUFFER: usize = 64;

/// Line-by-line slicing state machine for a single stream.
pub trait Cutter: Send {
    fn feed(&mut self, line: &str) -> Vec<LogSliceEvent>;

    /// Events due at end of stream.
    fn finish(&mut self) -> Vec<LogSliceEvent>;
}

/// Every line is content of the default slice.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCutter;

impl Cutter for NoCutter {
    fn feed(&mut self, line: &str) -> Vec<LogSliceEvent> {
        vec![LogSliceEvent::new(
            DEFAULT_SLICE,
            LogSliceType::Content,
            format!("{line}\n"),
        )]
    }

    fn finish(&mut self) -> Vec<LogSliceEvent> {
        Vec::new()
    }
}

/// Slicing by `[name]` / `[name|VERB]` markers.
#[derive(Debug)]
pub struct DefaultCutter {
    // Insertion ordered, so abandoned slices are reported in the order they started.
    active: Vec<String>,
    phase: String,
}

impl Default for DefaultCutter {
    fn default() -> Self {
        Self {
            active: Vec::new(),
            phase: DEFAULT_SLICE.to_string(),
        }
    }
}

impl DefaultCutter {
    pub fn new() -> Self {
        Self::default()
    }

    fn start_if_new(&mut self, name: &str, out: &mut Vec<LogSliceEvent>) {
        if !self.active.iter().any(|n| n == name) {
            self.active.push(name.to_string());
            out.push(LogSliceEvent::new(name, LogSliceType::Start, ""));
        }
    }

    fn content(&mut self, name: &str, payload: &str) -> Vec<LogSliceEvent> {
        let mut out = Vec::with_capacity(2);
        self.start_if_new(name, &mut out);
        out.push(LogSliceEvent::new(name, LogSliceType::Content, payload));
        out
    }

    // Closing a slice that never started starts it first to keep the pairs balanced.
    fn close(&mut self, name: &str, kind: LogSliceType, payload: &str) -> Vec<LogSliceEvent> {
        let mut out = Vec::with_capacity(2);
        self.start_if_new(name, &mut out);
        self.active.retain(|n| n != name);
        out.push(LogSliceEvent::new(name, kind, payload));
        out
    }
}

impl Cutter for DefaultCutter {
    fn feed(&mut self, line: &str) -> Vec<LogSliceEvent> {
        let trimmed = line.trim();
        let marker = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.find(']').map(|end| (&rest[..end], &rest[end + 1..])));

        let Some((header, payload)) = marker else {
            let phase = self.phase.clone();
            return self.content(&phase, line);
        };
        let payload = payload.trim();

        let (name, verb) = match header.split_once('|') {
            Some((name, verb)) => (name, Some(verb)),
            None => (header, None),
        };

        match verb {
            Some("PHASE") => {
                self.phase = name.to_string();
                vec![LogSliceEvent::new(name, LogSliceType::Phase, payload)]
            }
            Some("DONE") => self.close(name, LogSliceType::Done, payload),
            Some("FAIL") => self.close(name, LogSliceType::Fail, payload),
            Some("RESULT") => vec![LogSliceEvent::new(name, LogSliceType::Result, payload)],
            _ => self.content(name, payload),
        }
    }

    fn finish(&mut self) -> Vec<LogSliceEvent> {
        self.active
            .drain(..)
            .map(|name| LogSliceEvent::new(name, LogSliceType::Abandoned, ""))
            .collect()
    }
}

/// Which cutter a reader asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CutterMode {
    #[default]
    Sliced,
    Unsliced,
}

impl CutterMode {
    pub fn cutter(self) -> Box<dyn Cutter> {
        match self {
            CutterMode::Sliced => Box::new(DefaultCutter::new()),
            CutterMode::Unsliced => Box::new(NoCutter),
        }
    }
}

/// Output of [`slice`]. Both channels close together once the input is exhausted or failed.
pub struct Sliced {
    pub events: mpsc::Receiver<LogSliceEvent>,
    pub errors: mpsc::Receiver<io::Error>,
}

/// Run `cutter` over `input` on a background task.
///
/// A read error is reported once on `errors`; slices left open are still
/// closed on `events` afterwards.
/// The task stops early when the events receiver is dropped.
pub fn slice<R>(input: R, mut cutter: Box<dyn Cutter>) -> Sliced
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let (ev_tx, events) = mpsc::channel(EVENT_BUFFER);
    let (err_tx, errors) = mpsc::channel(1);

    tokio::spawn(async move {
        let mut reader = BufReader::new(input);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(strip_eol(&buf));
                    for evt in cutter.feed(&line) {
                        if ev_tx.send(evt).await.is_err() {
                            trace!("slice consumer went away");
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = err_tx.send(e).await;
                    break;
                }
            }
        }

        for evt in cutter.finish() {
            if ev_tx.send(evt).await.is_err() {
                return;
            }
        }
    });

    Sliced { events, errors }
}

fn strip_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashMap,
        pin::Pin,
        task::{Context, Poll},
    };
    use tokio::io::ReadBuf;

    fn cut(input: &str) -> Vec<LogSliceEvent> {
        let mut c = DefaultCutter::new();
        let mut out: Vec<_> = input.lines().flat_map(|l| c.feed(l)).collect();
        out.extend(c.finish());
        out
    }

    fn ev(name: &str, t: LogSliceType, payload: &str) -> LogSliceEvent {
        LogSliceEvent::new(name, t, payload)
    }

    fn assert_balanced(events: &[LogSliceEvent]) {
        let mut open: HashMap<&str, i32> = HashMap::new();
        for e in events {
            let n = open.entry(e.name.as_str()).or_default();
            match e.r#type {
                LogSliceType::Start => {
                    assert_eq!(*n, 0, "{} started twice", e.name);
                    *n += 1;
                }
                t if t.is_closing() => {
                    assert_eq!(*n, 1, "{} closed without start", e.name);
                    *n -= 1;
                }
                _ => {}
            }
        }
        assert!(open.values().all(|n| *n == 0), "unbalanced: {open:?}");
    }

    #[test]
    fn documented_ordering() {
        use LogSliceType::*;
        let got = cut("[a] x\n[b] y\n[a] z\n[a|DONE]\n[b] w\n");
        assert_eq!(
            got,
            vec![
                ev("a", Start, ""),
                ev("a", Content, "x"),
                ev("b", Start, ""),
                ev("b", Content, "y"),
                ev("a", Content, "z"),
                ev("a", Done, ""),
                ev("b", Content, "w"),
                ev("b", Abandoned, ""),
            ]
        );
    }

    #[test]
    fn phases_collect_unmarked_lines() {
        use LogSliceType::*;
        let got = cut("hello\n[build|PHASE] Building\n  compiling  \n[build|DONE]\n");
        assert_eq!(
            got,
            vec![
                ev("default", Start, ""),
                ev("default", Content, "hello"),
                ev("build", Phase, "Building"),
                ev("build", Start, ""),
                ev("build", Content, "  compiling  "),
                ev("build", Done, ""),
                ev("default", Abandoned, ""),
            ]
        );
    }

    #[test]
    fn fail_and_result() {
        use LogSliceType::*;
        let got = cut("[t] one\n[url|RESULT] https://x.y preview\n[t|FAIL] exit 1\n");
        assert_eq!(
            got,
            vec![
                ev("t", Start, ""),
                ev("t", Content, "one"),
                ev("url", Result, "https://x.y preview"),
                ev("t", Fail, "exit 1"),
            ]
        );
    }

    #[test]
    fn closing_unknown_slice_stays_balanced() {
        let got = cut("[ghost|DONE] bye\n[ghost] again\n");
        assert_eq!(got[0], ev("ghost", LogSliceType::Start, ""));
        assert_eq!(got[1], ev("ghost", LogSliceType::Done, "bye"));
        assert_balanced(&got);
    }

    #[test]
    fn balance_holds_for_mixed_streams() {
        let names = ["a", "b", "c", "default"];
        let verbs = ["", "|DONE", "|FAIL", "|RESULT", "|PHASE", "|BOGUS"];
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut rnd = |m: usize| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            (seed % m as u64) as usize
        };

        for _ in 0..50 {
            let mut input = String::new();
            for _ in 0..rnd(40) {
                if rnd(4) == 0 {
                    input.push_str("plain line\n");
                } else {
                    let line = format!("[{}{}] payload\n", names[rnd(names.len())], verbs[rnd(verbs.len())]);
                    input.push_str(&line);
                }
            }
            assert_balanced(&cut(&input));
        }
    }

    #[test]
    fn no_cutter_keeps_lines() {
        let mut c = NoCutter;
        assert_eq!(
            c.feed("[a|DONE] x"),
            vec![ev(DEFAULT_SLICE, LogSliceType::Content, "[a|DONE] x\n")]
        );
        assert!(c.finish().is_empty());
    }

    #[tokio::test]
    async fn slice_stream_closes_both_channels() {
        let input = std::io::Cursor::new(b"[a] x\r\n[a|DONE]\ntail".to_vec());
        let mut s = slice(input, CutterMode::Sliced.cutter());

        let mut got = Vec::new();
        while let Some(e) = s.events.recv().await {
            got.push(e);
        }
        assert!(s.errors.recv().await.is_none());
        assert_eq!(got[1], ev("a", LogSliceType::Content, "x"));
        assert_eq!(got.last(), Some(&ev("default", LogSliceType::Abandoned, "")));
        assert_balanced(&got);
    }

    struct Broken;

    impl AsyncRead for Broken {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::other("boom")))
        }
    }

    #[tokio::test]
    async fn read_error_still_abandons_open_slices() {
        use tokio::io::AsyncReadExt;
        let input = (&b"[build|PHASE] Building\n[build] compiling\n"[..]).chain(Broken);
        let mut s = slice(input, CutterMode::Sliced.cutter());

        let mut got = Vec::new();
        while let Some(e) = s.events.recv().await {
            got.push(e);
        }
        let err = s.errors.recv().await.expect("error expected");
        assert_eq!(err.to_string(), "boom");
        assert!(s.errors.recv().await.is_none());

        assert_eq!(got.last(), Some(&ev("build", LogSliceType::Abandoned, "")));
        assert_balanced(&got);
    }
}

use std::{future, io};

use tern_model::{FilterExpression, FilterOp, FilterTerm, JobStatus, LogSliceEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    cutter::{CutterMode, Sliced, slice},
    error::ServiceError,
    events::Subscription,
};

use super::{JobService, LOG_TARGET};

/// Which log representation a listener receives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogsMode {
    #[default]
    Disabled,
    Sliced,
    Unsliced,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListenOptions {
    pub logs: LogsMode,
    pub updates: bool,
}

impl ListenOptions {
    pub fn with_logs(mut self, logs: LogsMode) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_updates(mut self, updates: bool) -> Self {
        self.updates = updates;
        self
    }
}

/// One item of a listener stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenEvent {
    Slice(LogSliceEvent),
    Update(JobStatus),
}

enum LogItem {
    Event(LogSliceEvent),
    Failed(io::Error),
    End,
}

async fn next_log(logs: &mut Option<Sliced>) -> LogItem {
    let Some(sliced) = logs else {
        return future::pending().await;
    };
    tokio::select! {
        biased;
        Some(err) = sliced.errors.recv() => LogItem::Failed(err),
        evt = sliced.events.recv() => match evt {
            Some(evt) => LogItem::Event(evt),
            None => match sliced.errors.recv().await {
                Some(err) => LogItem::Failed(err),
                None => LogItem::End,
            },
        },
    }
}

async fn next_update(updates: &mut Option<Subscription>) -> Option<JobStatus> {
    match updates {
        Some(sub) => sub.recv().await,
        None => future::pending().await,
    }
}

impl JobService {
    /// Follow one job's logs and/or status updates.
    ///
    /// With logs requested the stream ends when the log session is drained.
    /// With updates only it ends after the terminal status. A job that is
    /// already done yields its final status once, after its logs.
    pub async fn listen(
        &self,
        name: &str,
        opts: ListenOptions,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Result<ListenEvent, ServiceError>>, ServiceError> {
        // Subscribe before reading the job so no transition falls in between.
        let subscription = opts.updates.then(|| {
            self.bus.subscribe(vec![FilterExpression::single(FilterTerm::new(
                "name",
                FilterOp::Equals,
                name,
            ))])
        });
        let job = self.jobs.get(name).await?;

        let mut logs = match opts.logs {
            LogsMode::Disabled => None,
            LogsMode::Sliced => Some(slice(self.logs.read(name)?, CutterMode::Sliced.cutter())),
            LogsMode::Unsliced => Some(slice(self.logs.read(name)?, CutterMode::Unsliced.cutter())),
        };
        let logs_requested = logs.is_some();

        let (mut updates, mut last) = if job.phase.is_terminal() {
            (None, opts.updates.then_some(job))
        } else {
            (subscription, None)
        };

        let (tx, rx) = mpsc::channel(self.cfg.listen_buffer.max(1));
        let shutdown = self.shutdown.clone();
        let name = name.to_string();

        tokio::spawn(async move {
            loop {
                if logs.is_none() {
                    if let Some(status) = last.take()
                        && tx.send(Ok(ListenEvent::Update(status))).await.is_err()
                    {
                        return;
                    }
                    if logs_requested || updates.is_none() {
                        break;
                    }
                }

                tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = tx.send(Err(ServiceError::Aborted("listener cancelled".into()))).await;
                        return;
                    }
                    _ = shutdown.cancelled() => {
                        let _ = tx.send(Err(ServiceError::Aborted("service shutting down".into()))).await;
                        return;
                    }
                    item = next_log(&mut logs) => match item {
                        LogItem::Event(evt) => {
                            if tx.send(Ok(ListenEvent::Slice(evt))).await.is_err() {
                                return;
                            }
                        }
                        LogItem::Failed(e) => {
                            let err = ServiceError::Internal(format!("cannot read logs of {name}: {e}"));
                            let _ = tx.send(Err(err)).await;
                            return;
                        }
                        LogItem::End => {
                            // Statuses published before the log closed still belong to the stream.
                            while let Some(status) = updates.as_mut().and_then(Subscription::try_recv) {
                                if tx.send(Ok(ListenEvent::Update(status))).await.is_err() {
                                    return;
                                }
                            }
                            logs = None;
                        }
                    },
                    status = next_update(&mut updates) => match status {
                        Some(status) => {
                            let terminal = status.phase.is_terminal();
                            if tx.send(Ok(ListenEvent::Update(status))).await.is_err() {
                                return;
                            }
                            if terminal && !logs_requested {
                                break;
                            }
                        }
                        None => updates = None,
                    },
                }
            }
            debug!(target: LOG_TARGET, job = %name, "listener finished");
        });

        Ok(rx)
    }
}

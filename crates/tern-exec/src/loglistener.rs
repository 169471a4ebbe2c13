//! Follows the output of every container of one job.

use std::{collections::HashSet, sync::Arc};

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    cluster::{Cluster, ContainerState, WatchEvent, Workload},
    error::ClusterError,
    labels::LabelSet,
};

const LINE_BUFFER: usize = 256;
const LOG_TARGET: &str = "tern.exec.logs";

/// Lines of `job` in arrival order per container. The channel closes once
/// the workload is gone and every container stream has ended, or when
/// `cancel` fires.
pub(crate) fn listen(
    cluster: Arc<dyn Cluster>,
    labels: LabelSet,
    job: String,
    cancel: CancellationToken,
) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    tokio::spawn(async move {
        let mut ll = LogListener {
            cluster,
            labels,
            tx,
            cancel,
            tailed: HashSet::new(),
            tails: JoinSet::new(),
        };
        ll.run(&job).await;
        debug!(target: LOG_TARGET, job = %job, "log listener stopped");
    });
    rx
}

struct LogListener {
    cluster: Arc<dyn Cluster>,
    labels: LabelSet,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
    tailed: HashSet<String>,
    tails: JoinSet<()>,
}

impl LogListener {
    async fn run(&mut self, job: &str) {
        let mut events = match self.cluster.watch(&self.labels.for_job(job)).await {
            Ok(events) => events,
            Err(e) => {
                warn!(target: LOG_TARGET, job, error = %e, "cannot watch workload");
                return;
            }
        };
        match self.cluster.get(job).await {
            Ok(w) => self.attach(&w),
            Err(ClusterError::NotFound(_)) => return,
            Err(e) => {
                warn!(target: LOG_TARGET, job, error = %e, "cannot get workload");
                return;
            }
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                ev = events.recv() => match ev {
                    Some(WatchEvent::Added(w) | WatchEvent::Modified(w)) => self.attach(&w),
                    Some(WatchEvent::Deleted(_)) => break,
                    None => {
                        debug!(target: LOG_TARGET, job, "workload watch closed");
                        break;
                    }
                },
            }
        }

        let cancel = self.cancel.clone();
        let tails = &mut self.tails;
        tokio::select! {
            _ = cancel.cancelled() => tails.abort_all(),
            _ = async { while tails.join_next().await.is_some() {} } => {}
        }
    }

    // Terminated containers are tailed too: their output stays readable and
    // a short-lived container may finish between two observations.
    fn attach(&mut self, w: &Workload) {
        for cs in w.status.all() {
            if matches!(cs.state, ContainerState::Waiting { .. }) || !self.tailed.insert(cs.name.clone()) {
                continue;
            }
            let prefix = if self.labels.is_sidecar(w, &cs.name) {
                format!("[{}] ", cs.name)
            } else {
                String::new()
            };
            debug!(target: LOG_TARGET, workload = %w.name, container = %cs.name, "tailing container");
            self.tails.spawn(tail(
                Arc::clone(&self.cluster),
                w.name.clone(),
                cs.name.clone(),
                prefix,
                self.tx.clone(),
                self.cancel.clone(),
            ));
        }
    }
}

// Line by line, so output of different containers never interleaves within a line.
async fn tail(
    cluster: Arc<dyn Cluster>,
    workload: String,
    container: String,
    prefix: String,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    let stream = match cluster.logs(&workload, &container).await {
        Ok(stream) => stream,
        Err(e) => {
            debug!(target: LOG_TARGET, %workload, %container, error = %e, "cannot connect to logs");
            return;
        }
    };

    let mut lines = BufReader::new(stream).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => return,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                if tx.send(format!("{prefix}{line}")).await.is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                debug!(target: LOG_TARGET, %workload, %container, error = %e, "log stream failed");
                return;
            }
        }
    }
}

use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use taskvisor::Subscribe;
use tern_api::{
    HttpApi, ServiceAdapter, TernApiServer, TernApiService, tonic::transport::Server,
};
use tern_core::{
    FileLogStore, JobService, LogStore, MemoryJobStore, MemoryLogStore, MemoryNumberGroup,
    OnTransition, ReportedError,
};
use tern_exec::{Cluster, Executor, MemoryCluster, ProcessCluster, TaskSupervisor, WatchMonitor};
use tern_model::JobStatus;
use tern_notify::WebhookNotifier;
use tern_observe::{Journal, TaskJournal};
use tern_prometheus::PrometheusMetrics;
use tokio::{net::TcpListener, sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{ClusterKind, LogStoreConfig, ServerConfig};

const LOG_TARGET: &str = "tern.server";

/// Fully wired daemon, not yet running.
pub struct App {
    cfg: ServerConfig,
    service: Arc<JobService>,
    executor: Arc<Executor>,
    supervisor: Arc<TaskSupervisor>,
    metrics: PrometheusMetrics,
    updates: mpsc::UnboundedReceiver<JobStatus>,
    cancel: CancellationToken,
}

/// Handle of a started [`App`].
pub struct Running {
    http: Option<SocketAddr>,
    service: Arc<JobService>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl App {
    pub async fn build(cfg: ServerConfig) -> anyhow::Result<Self> {
        cfg.executor.validate().context("cannot create executor")?;
        let metrics = PrometheusMetrics::new().context("cannot create metrics registry")?;
        let logs: Arc<dyn LogStore> = match &cfg.log_store {
            LogStoreConfig::Memory => Arc::new(MemoryLogStore::new()),
            LogStoreConfig::File { dir } => Arc::new(
                FileLogStore::new(dir.clone())
                    .with_context(|| format!("cannot open log store {}", dir.display()))?,
            ),
        };

        let monitor = Arc::new(
            WatchMonitor::new(&cfg.executor)
                .with_error_handler(reporter(metrics.clone(), "executor error")),
        );
        let subscribers = vec![
            monitor.clone() as Arc<dyn Subscribe>,
            Arc::new(TaskJournal::new()),
        ];
        let supervisor = TaskSupervisor::start(subscribers).await;

        let cluster: Arc<dyn Cluster> = match cfg.cluster {
            ClusterKind::Memory => Arc::new(MemoryCluster::new()),
            ClusterKind::Process => Arc::new(ProcessCluster::new(supervisor.clone())),
        };

        let (tx, updates) = mpsc::unbounded_channel();
        let sink: Arc<dyn OnTransition> = Arc::new(tx);
        let executor = Executor::new(cluster, cfg.executor.clone(), sink)
            .context("cannot create executor")?
            .with_monitor(monitor);
        let executor = Arc::new(executor);

        let mut service = JobService::new(
            executor.clone(),
            logs,
            Arc::new(MemoryJobStore::new()),
            Arc::new(MemoryNumberGroup::new()),
        )
        .with_config(cfg.service.clone())
        .with_error_handler(reporter(metrics.clone(), "job service error"));

        if let Some(hook) = cfg.webhook.clone() {
            let endpoint = hook.endpoint.clone();
            let notifier = WebhookNotifier::new(hook).context("cannot create webhook notifier")?;
            service = service.with_notifier(Arc::new(notifier));
            info!(target: LOG_TARGET, %endpoint, "webhook notifications enabled");
        }

        Ok(Self {
            cfg,
            service: Arc::new(service),
            executor,
            supervisor,
            metrics,
            updates,
            cancel: CancellationToken::new(),
        })
    }

    /// Job API plus `/metrics`.
    pub fn router(&self) -> Router {
        let api = HttpApi::new(Arc::new(ServiceAdapter::new(self.service.clone()))).router();
        let metrics = Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(self.metrics.clone());
        api.merge(metrics)
    }

    /// Start every background task and listener.
    pub async fn start(self) -> anyhow::Result<Running> {
        let router = self.router();
        let App {
            cfg,
            service,
            executor,
            supervisor,
            metrics,
            updates,
            cancel,
        } = self;

        executor
            .run(&supervisor, cancel.clone())
            .await
            .context("cannot start executor")?;
        let mut tasks = vec![
            service.clone().run(updates),
            tokio::spawn(Journal::new(service.subscribe(Vec::new())).run(cancel.clone())),
            spawn_metrics(&service, metrics, cancel.clone()),
        ];

        let mut http = None;
        if let Some(addr) = cfg.http {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("cannot bind http on {addr}"))?;
            let local = listener.local_addr()?;
            info!(target: LOG_TARGET, addr = %local, "http api listening");
            http = Some(local);

            let stop = cancel.clone();
            tasks.push(tokio::spawn(async move {
                let res = axum::serve(listener, router)
                    .with_graceful_shutdown(stop.cancelled_owned())
                    .await;
                if let Err(e) = res {
                    error!(target: LOG_TARGET, error = %e, "http server failed");
                }
            }));
        }

        if let Some(addr) = cfg.grpc {
            let grpc = TernApiService::new(Arc::new(ServiceAdapter::new(service.clone())));
            info!(target: LOG_TARGET, %addr, "grpc api listening");

            let stop = cancel.clone();
            tasks.push(tokio::spawn(async move {
                let res = Server::builder()
                    .add_service(TernApiServer::new(grpc))
                    .serve_with_shutdown(addr, stop.cancelled_owned())
                    .await;
                if let Err(e) = res {
                    error!(target: LOG_TARGET, error = %e, "grpc server failed");
                }
            }));
        }

        Ok(Running {
            http,
            service,
            cancel,
            tasks,
        })
    }

    /// Run until `shutdown` resolves, then stop gracefully.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        let running = self.start().await?;
        shutdown.await;
        info!(target: LOG_TARGET, "shutting down");
        running.stop().await;
        Ok(())
    }
}

impl Running {
    /// Bound HTTP address, if the API is enabled.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http
    }

    pub async fn stop(self) {
        self.service.shutdown();
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(target: LOG_TARGET, error = %e, "background task failed");
            }
        }
        info!(target: LOG_TARGET, "server stopped");
    }
}

fn reporter(
    metrics: PrometheusMetrics,
    msg: &'static str,
) -> impl Fn(ReportedError) + Send + Sync + 'static {
    move |e| {
        metrics.record_error(&e);
        error!(target: LOG_TARGET, error = %e, "{msg}");
    }
}

fn spawn_metrics(
    service: &JobService,
    metrics: PrometheusMetrics,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut sub = service.subscribe(Vec::new());
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                status = sub.recv() => match status {
                    Some(status) => metrics.observe(&status),
                    None => break,
                },
            }
        }
    })
}

async fn metrics_handler(State(metrics): State<PrometheusMetrics>) -> Response {
    match metrics.encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

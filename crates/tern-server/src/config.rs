use std::{
    fs,
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
};

use anyhow::{Context, bail};
use serde::Deserialize;
use tern_core::ServiceConfig;
use tern_exec::ExecutorConfig;
use tern_notify::WebhookConfig;
use tern_observe::LoggerConfig;

/// Where workloads run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClusterKind {
    /// In-process cluster that never runs anything; for demos and tests.
    Memory,
    /// Containers run as host processes.
    #[default]
    Process,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LogStoreConfig {
    #[default]
    Memory,
    File {
        dir: PathBuf,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub logger: LoggerConfig,
    pub executor: ExecutorConfig,
    pub service: ServiceConfig,
    pub cluster: ClusterKind,
    pub log_store: LogStoreConfig,
    /// HTTP API and `/metrics`; disabled when `null`.
    pub http: Option<SocketAddr>,
    /// gRPC API; disabled when `null`.
    pub grpc: Option<SocketAddr>,
    pub webhook: Option<WebhookConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            logger: LoggerConfig::default(),
            executor: ExecutorConfig::default(),
            service: ServiceConfig::default(),
            cluster: ClusterKind::default(),
            log_store: LogStoreConfig::default(),
            http: Some(SocketAddr::from((Ipv4Addr::LOCALHOST, 8080))),
            grpc: None,
            webhook: None,
        }
    }
}

impl ServerConfig {
    /// Read a JSON config file, or the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let cfg = match path {
            None => Self::default(),
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("cannot read config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.executor.validate().context("invalid executor config")?;
        if let (Some(http), Some(grpc)) = (self.http, self.grpc)
            && http == grpc
        {
            bail!("http and grpc cannot share address {http}");
        }
        if let Some(hook) = &self.webhook
            && hook.endpoint.trim().is_empty()
        {
            bail!("webhook endpoint cannot be empty");
        }
        Ok(())
    }
}

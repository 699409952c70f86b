//! Daemon orchestration -- startup ordering, fact logging and graceful shutdown.
//!
//! # Startup Order
//!
//! 1. Validate configuration
//! 2. Install the metrics recorder (when enabled)
//! 3. Load and compile the rule knowledge base (fatal on error)
//! 4. Build the ingest server
//! 5. Bind the webhook listener
//!
//! # Shutdown Order
//!
//! 1. Stop the listener (drains in-flight requests)
//! 2. Stop the fact logger task

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use ironhook_core::config::IronhookConfig;
use ironhook_core::metrics as m;
use ironhook_core::pipeline::{HealthStatus, Pipeline};
use ironhook_ingest::{EvaluatedFact, IngestConfig, IngestServer, IngestServerBuilder, KnowledgeBase};

use crate::metrics_server;

/// The main daemon orchestrator.
///
/// Owns the webhook listener and the task that consumes evaluated facts.
pub struct Orchestrator {
    config: IronhookConfig,
    server: IngestServer,
    fact_rx: Option<mpsc::Receiver<EvaluatedFact>>,
    fact_logger: Option<JoinHandle<()>>,
    shutdown_tx: broadcast::Sender<()>,
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration from disk and build the orchestrator.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = IronhookConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// The knowledge base is compiled here, so an invalid rule file fails
    /// before any socket is bound.
    pub async fn build_from_config(config: IronhookConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let kb = Arc::new(load_knowledge_base(&config.rules.path).await?);
        metrics::gauge!(m::INGEST_KNOWLEDGE_BASE_RULES).set(kb.rule_count() as f64);

        let mut builder = IngestServerBuilder::new()
            .config(IngestConfig::from_core(&config))
            .knowledge_base(kb);
        let fact_rx = builder.fact_channel();
        let server = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build ingest server: {}", e))?;

        let (shutdown_tx, _) = broadcast::channel(4);

        tracing::info!(
            bind = %config.listener.socket_addr(),
            path = %config.listener.path,
            max_cycle = config.rules.max_cycle,
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            server,
            fact_rx: Some(fact_rx),
            fact_logger: None,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Start the fact logger and bind the webhook listener.
    ///
    /// Returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if let Some(fact_rx) = self.fact_rx.take() {
            let shutdown_rx = self.shutdown_tx.subscribe();
            self.fact_logger = Some(spawn_fact_logger(fact_rx, shutdown_rx));
        }

        self.server
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start webhook listener: {}", e))?;

        self.server
            .local_addr()
            .ok_or_else(|| anyhow::anyhow!("webhook listener has no bound address"))
    }

    /// Start everything and block until a shutdown signal arrives.
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM`
    /// - `SIGINT` (Ctrl+C)
    /// - `SIGHUP`
    pub async fn run(&mut self) -> Result<()> {
        let addr = self.start().await?;
        tracing::info!(addr = %addr, "ironhook-daemon running");

        let signal = wait_for_shutdown_signal().await?;
        tracing::info!(signal = signal, "shutdown signal received");

        self.shutdown().await
    }

    /// Stop the listener first, then the fact logger.
    pub async fn shutdown(&mut self) -> Result<()> {
        let stop_result = self.server.stop().await;

        let _ = self.shutdown_tx.send(());
        if let Some(task) = self.fact_logger.take() {
            let _ = task.await;
        }

        tracing::info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            "ironhook-daemon shut down"
        );
        stop_result.map_err(|e| anyhow::anyhow!("failed to stop webhook listener: {}", e))
    }

    /// Current listener health.
    pub async fn health(&self) -> HealthStatus {
        self.server.health_check().await
    }

    /// Bound listener address while serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }

    pub fn config(&self) -> &IronhookConfig {
        &self.config
    }

    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        self.server.knowledge_base()
    }
}

/// Load and compile the rule file, logging what was loaded.
pub async fn load_knowledge_base(path: &str) -> Result<KnowledgeBase> {
    let kb = KnowledgeBase::load(path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load knowledge base: {}", e))?;

    if kb.enabled_rule_count() == 0 {
        tracing::warn!(
            path = path,
            knowledge_base = kb.name(),
            "knowledge base has no enabled rules; facts will pass through unannotated"
        );
    }

    Ok(kb)
}

/// Wait for a shutdown signal (SIGTERM, SIGINT or SIGHUP).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;
    let mut sighup = signal(SignalKind::hangup())
        .map_err(|e| anyhow::anyhow!("failed to install SIGHUP handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
        _ = sighup.recv() => "SIGHUP",
    })
}

/// Spawn a background task that logs every evaluated fact.
///
/// There is no playbook runner behind the daemon, so the logger is the
/// downstream consumer and keeps the fact channel from filling up.
fn spawn_fact_logger(
    mut fact_rx: mpsc::Receiver<EvaluatedFact>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                received = fact_rx.recv() => {
                    match received {
                        Some(evaluated) => {
                            let outputs = evaluated.fact.outputs();
                            tracing::debug!(
                                alertname = evaluated.fact.alert_name(),
                                fingerprint = %evaluated.fact.fingerprint,
                                playbook = %outputs.playbook,
                                inventory_file = %outputs.inventory_file,
                                limit_host = %outputs.limit_host,
                                fired_rules = ?evaluated.fired_rules,
                                error = ?evaluated.error,
                                "fact ready for dispatch"
                            );
                        }
                        None => {
                            tracing::debug!("fact channel closed, exiting fact logger");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("fact logger shutting down");
                    break;
                }
            }
        }
    })
}

//! Server bootstrap: wire components, serve the selected transports.

use std::sync::Arc;

use superego_advisor::{
    AdvisorClient, ClaudeAdvisor, ClaudeAdvisorConfig, MockAdvisor, ResilienceConfig,
    ResilientAdvisor,
};
use superego_audit::{AuditSink, NdjsonAuditSink, TracingAuditSink};
use superego_policy::{PolicyEngine, ReloadWatcher, RuleStore, WatcherConfig, load_rules_file};
use superego_primitives::{Result, SuperegoError};
use tracing::info;

use crate::config::{AdvisorProvider, ServerConfig, TransportKind};
use crate::health::HealthMonitor;
use crate::http::{AppState, router};
use crate::service::{EvaluationService, ServerInfo};
use crate::stdio::run_stdio;

/// A fully wired server ready to serve its transports.
pub struct ServerContext {
    service: Arc<EvaluationService>,
    health: Arc<HealthMonitor>,
    watcher: Option<ReloadWatcher>,
    config: ServerConfig,
    transport: TransportKind,
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl ServerContext {
    /// Builds the component graph for `config`, selecting the advisor from
    /// the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SuperegoError::Config`] when the rule file fails its
    /// initial load or the advisor is misconfigured.
    pub async fn build(config: ServerConfig, transport: TransportKind) -> Result<Self> {
        let advisor: Arc<dyn AdvisorClient> = match config.advisor_provider() {
            AdvisorProvider::Mock => Arc::new(MockAdvisor::denying(
                "mock advisor: manual review required",
            )),
            AdvisorProvider::Claude => Arc::new(
                ClaudeAdvisor::new(ClaudeAdvisorConfig::from_env(config.advisor_model()))
                    .map_err(|err| SuperegoError::config(err.to_string()))?,
            ),
        };
        Self::build_with_advisor(config, transport, advisor).await
    }

    /// Builds the component graph with an explicit advisor implementation.
    ///
    /// # Errors
    ///
    /// Returns [`SuperegoError::Config`] when the rule file fails its
    /// initial load, or [`SuperegoError::Internal`] when the audit log
    /// cannot be opened.
    pub async fn build_with_advisor(
        config: ServerConfig,
        transport: TransportKind,
        advisor: Arc<dyn AdvisorClient>,
    ) -> Result<Self> {
        let rules = load_rules_file(config.rules_file()).await?;
        info!(
            rules = rules.len(),
            path = %config.rules_file().display(),
            "initial rule load complete"
        );
        let store = Arc::new(RuleStore::new(rules));

        let resilient = Arc::new(ResilientAdvisor::new(
            advisor,
            ResilienceConfig::default().with_timeout(config.advisor_timeout()),
        ));

        let audit: Arc<dyn AuditSink> = match config.audit_log() {
            Some(path) => Arc::new(
                NdjsonAuditSink::open(path)
                    .await
                    .map_err(|err| SuperegoError::internal(err.to_string()))?,
            ),
            None => Arc::new(TracingAuditSink),
        };

        let engine = PolicyEngine::new(
            Arc::clone(&store),
            Arc::clone(&resilient) as _,
            audit,
            config.sample_failure_mode(),
        );

        let transports = transport.enabled_transports();
        let service = Arc::new(EvaluationService::new(
            engine,
            ServerInfo::new(
                transports.clone(),
                config.rules_file().display().to_string(),
                config.hot_reload(),
            ),
        ));
        let health = Arc::new(HealthMonitor::new(
            Arc::clone(&store),
            Arc::clone(&resilient),
            transports,
        ));

        let watcher = config.hot_reload().then(|| {
            ReloadWatcher::spawn(
                Arc::clone(&store),
                config.rules_file().clone(),
                WatcherConfig::default(),
            )
        });

        Ok(Self {
            service,
            health,
            watcher,
            config,
            transport,
        })
    }

    /// Returns the shared evaluation service.
    #[must_use]
    pub fn service(&self) -> &Arc<EvaluationService> {
        &self.service
    }

    /// Returns the health monitor.
    #[must_use]
    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// Serves the configured transports until EOF (stdio) or SIGINT.
    ///
    /// Returns `true` when the server stopped due to SIGINT.
    ///
    /// # Errors
    ///
    /// Returns [`SuperegoError::Internal`] when a listener cannot bind or
    /// a transport fails irrecoverably.
    pub async fn serve(self) -> Result<bool> {
        let state = AppState {
            service: Arc::clone(&self.service),
            health: Arc::clone(&self.health),
        };

        let interrupted = match self.transport {
            TransportKind::Stdio => {
                tokio::select! {
                    result = run_stdio(Arc::clone(&self.service), Arc::clone(&self.health)) => {
                        result.map_err(|err| SuperegoError::internal(err.to_string()))?;
                        false
                    }
                    _ = tokio::signal::ctrl_c() => true,
                }
            }
            TransportKind::Http | TransportKind::Websocket => {
                let app = router(
                    state,
                    self.transport == TransportKind::Http,
                    self.transport == TransportKind::Websocket,
                );
                self.serve_http(app).await?
            }
            TransportKind::Unified => {
                let app = router(state, true, true);
                let stdio = tokio::spawn(run_stdio(
                    Arc::clone(&self.service),
                    Arc::clone(&self.health),
                ));
                let interrupted = self.serve_http(app).await?;
                stdio.abort();
                interrupted
            }
        };

        if let Some(watcher) = self.watcher {
            watcher.shutdown().await;
        }
        Ok(interrupted)
    }

    async fn serve_http(&self, app: axum::Router) -> Result<bool> {
        let addr = format!("{}:{}", self.config.host(), self.config.port());
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|err| SuperegoError::internal(format!("failed to bind {addr}: {err}")))?;
        info!(addr = %addr, transport = ?self.transport, "listening");

        let (interrupt_tx, interrupt_rx) = tokio::sync::oneshot::channel::<()>();
        let interrupt_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&interrupt_flag);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                let _ = interrupt_tx.send(());
            }
        });

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = interrupt_rx.await;
            })
            .await
            .map_err(|err| SuperegoError::internal(format!("server error: {err}")))?;

        Ok(interrupt_flag.load(std::sync::atomic::Ordering::SeqCst))
    }
}

/// Convenience entry point used by the binary.
///
/// Returns `true` when shutdown was signal-initiated (exit code 130).
///
/// # Errors
///
/// Propagates configuration and startup failures from
/// [`ServerContext::build`] and [`ServerContext::serve`].
pub async fn run(config: ServerConfig, transport: TransportKind) -> Result<bool> {
    let context = ServerContext::build(config, transport).await?;
    context.serve().await
}

//! molt-daemon: the Daily Molt service.
//!
//! Single OS process running a Tokio async runtime. Agents talk to it via
//! line-delimited JSON-RPC over TCP.

mod commands;
mod config;
mod providers;
mod rate_limit;
mod reconcile_loop;
mod rpc;

use std::sync::Arc;

use molt_crypto::session::SessionKeys;
use molt_crypto::{api_key, CryptoError};
use molt_pipeline::{Orchestrator, PipelineConfig, Reconciler};
use molt_types::{Clock, SystemClock};
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::config::{secret_from_env, DaemonConfig};
use crate::rate_limit::RateLimiter;
use crate::rpc::RpcServer;

/// Workspace crates whose events honour `advanced.log_level`.
const LOG_TARGETS: [&str; 7] = [
    "molt_daemon",
    "molt_pipeline",
    "molt_chain",
    "molt_imagegen",
    "molt_storage",
    "molt_db",
    "molt_crypto",
];

/// Daemon-wide shared state.
pub struct DaemonState {
    /// Database connection.
    pub db: Arc<tokio::sync::Mutex<rusqlite::Connection>>,
    /// Configuration.
    pub config: DaemonConfig,
    /// Session token signing keys.
    pub sessions: SessionKeys,
    pub orchestrator: Orchestrator,
    pub reconciler: Reconciler,
    pub clock: Arc<dyn Clock>,
    pub rate_limiter: RateLimiter,
    /// Argon2 hash of the operator token; operator methods are off when `None`.
    pub operator_key_hash: Option<String>,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
}

impl DaemonState {
    /// Wire the pipeline around an open database.
    pub fn new(
        config: DaemonConfig,
        conn: rusqlite::Connection,
        sessions: SessionKeys,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let db = Arc::new(tokio::sync::Mutex::new(conn));
        let relayers = providers::build_relayers(&config.chain);
        let orchestrator = Orchestrator::new(
            db.clone(),
            providers::build_generator(&config.generation),
            providers::build_store(&config.content),
            relayers.clone(),
            clock.clone(),
            PipelineConfig {
                confirmation_timeout: config.pipeline.confirmation_timeout(),
                external_url_base: config.pipeline.external_url_base.clone(),
            },
        );
        let reconciler = Reconciler::new(db.clone(), relayers, config.pipeline.claim_ttl());
        let rate_limiter = RateLimiter::from_config(&config.server, clock.clone());
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
        Self {
            db,
            config,
            sessions,
            orchestrator,
            reconciler,
            clock,
            rate_limiter,
            operator_key_hash: None,
            shutdown_tx,
        }
    }

    /// Enable operator methods for holders of `token`.
    pub fn with_operator_token(mut self, token: &str) -> Result<Self, CryptoError> {
        self.operator_key_hash = Some(api_key::hash(token)?);
        Ok(self)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    // 1. Load config
    let config = DaemonConfig::load()?;

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for target in LOG_TARGETS {
        filter = filter.add_directive(format!("{target}={}", config.advanced.log_level).parse()?);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Molt daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 2. Open database
    let db_path = data_dir.join("molt.db");
    let conn = molt_db::open(&db_path)?;
    info!("Database open at {:?}", db_path);

    // 3. Session keys
    let secret = secret_from_env(&config.auth.jwt_secret_env).ok_or_else(|| {
        anyhow::anyhow!("{} must be set to a secret of at least 32 characters", config.auth.jwt_secret_env)
    })?;
    let sessions = SessionKeys::new(&secret, config.auth.token_ttl_secs)?;

    // 4. Build daemon state
    let listen_addr = config.server.listen_addr.clone();
    let operator_token = secret_from_env(&config.auth.operator_token_env);
    let operator_env = config.auth.operator_token_env.clone();
    let mut state = DaemonState::new(config, conn, sessions, Arc::new(SystemClock));
    match operator_token {
        Some(token) => state = state.with_operator_token(&token)?,
        None => info!("{} not set, operator methods disabled", operator_env),
    }
    let state = Arc::new(state);

    // 5. Background reconciliation
    let reconcile_task = reconcile_loop::spawn(state.clone());

    // 6. Run the RPC server until shutdown
    let rpc_server = RpcServer::new(state.clone(), listen_addr);
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    info!("Daemon shutting down gracefully");
    let _ = state.shutdown_tx.send(());
    if let Some(task) = reconcile_task {
        let _ = task.await;
    }

    info!("Daemon stopped");
    Ok(())
}

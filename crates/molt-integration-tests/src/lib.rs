//! Integration tests for the Molt pipeline.
//!
//! The library part only holds fixtures: an in-memory ledger wired to the
//! mock generator, store and chain, with a manual clock. The scenarios live
//! under `tests/`.
//!
//! ```sh
//! cargo test -p molt-integration-tests
//! ```

use std::sync::Arc;
use std::time::Duration;

use molt_chain::{AgentWallet, MockRelayer, RelayerSet};
use molt_crypto::{api_key, CryptoError};
use molt_db::queries::agents::{self, NewAgent};
use molt_db::DbError;
use molt_imagegen::{ImageGenerator, MockGenerator};
use molt_pipeline::reconcile::DEFAULT_CLAIM_TTL;
use molt_pipeline::{Orchestrator, PipelineConfig, Reconciler};
use molt_storage::{ContentStore, MemoryStore};
use molt_types::{Agent, Clock, ManualClock, Network};
use tokio::sync::Mutex;

/// Start of every scenario: 2023-11-14T22:13:20Z.
pub const T0: u64 = 1_700_000_000;

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// One daemon's worth of pipeline, minus the RPC layer.
pub struct Harness {
    pub db: Arc<Mutex<rusqlite::Connection>>,
    pub generator: Arc<MockGenerator>,
    pub store: Arc<MemoryStore>,
    pub relayer: Arc<MockRelayer>,
    pub clock: Arc<ManualClock>,
    pub orchestrator: Arc<Orchestrator>,
    pub reconciler: Reconciler,
}

impl Harness {
    /// Testnet harness with a chain that confirms immediately.
    pub fn new() -> Result<Self, FixtureError> {
        Self::with_relayer(MockRelayer::new(Network::Testnet))
    }

    pub fn with_relayer(relayer: MockRelayer) -> Result<Self, FixtureError> {
        let db = Arc::new(Mutex::new(molt_db::open_memory()?));
        let generator = Arc::new(MockGenerator::new());
        let store = Arc::new(MemoryStore::new());
        let relayer = Arc::new(relayer);
        let clock = Arc::new(ManualClock::new(T0));
        let relayers = RelayerSet::new(Network::Testnet).with(relayer.clone());

        let orchestrator = Orchestrator::new(
            db.clone(),
            Some(generator.clone() as Arc<dyn ImageGenerator>),
            Some(store.clone() as Arc<dyn ContentStore>),
            relayers.clone(),
            clock.clone(),
            PipelineConfig {
                confirmation_timeout: Duration::from_secs(30),
                ..PipelineConfig::default()
            },
        );
        let reconciler = Reconciler::new(db.clone(), relayers, DEFAULT_CLAIM_TTL);

        Ok(Self {
            db,
            generator,
            store,
            relayer,
            clock,
            orchestrator: Arc::new(orchestrator),
            reconciler,
        })
    }

    /// Register an agent the way the daemon does: fresh wallet, hashed key.
    pub async fn register(&self, handle: &str) -> Result<Agent, FixtureError> {
        let wallet = AgentWallet::generate();
        let key = api_key::generate();
        let new_agent = NewAgent {
            id: uuid::Uuid::new_v4().to_string(),
            handle: handle.to_string(),
            display_name: handle.to_string(),
            bio: None,
            wallet_address: wallet.address.clone(),
            api_key_hash: api_key::hash(&key)?,
            created_at: self.clock.now(),
        };
        let conn = self.db.lock().await;
        Ok(agents::insert(&conn, &new_agent)?)
    }

    /// Current ledger view of an agent.
    pub async fn agent(&self, agent_id: &str) -> Result<Agent, FixtureError> {
        let conn = self.db.lock().await;
        agents::get(&conn, agent_id)?
            .ok_or_else(|| FixtureError::Db(DbError::NotFound(format!("agent {agent_id}"))))
    }
}

//! Configuration file management.
//!
//! `$MOLT_DATA_DIR/config.toml`, every section optional. Secrets are never
//! stored here: each section names the environment variable to read.

use std::path::PathBuf;
use std::time::Duration;

use molt_chain::NetworkProfile;
use molt_types::Network;
use serde::{Deserialize, Serialize};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// JSON-RPC listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Fixed rate limit window. 0 disables rate limiting.
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window_secs: u64,
    /// Requests allowed per agent (or login handle) per window.
    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: u32,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// Agent credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Environment variable holding the session signing secret.
    #[serde(default = "default_jwt_secret_env")]
    pub jwt_secret_env: String,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
    /// Environment variable holding the operator token. Operator methods
    /// are disabled while it is unset.
    #[serde(default = "default_operator_token_env")]
    pub operator_token_env: String,
}

/// Image generation provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// "openai" | "replicate" | "mock".
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_openai_key_env")]
    pub openai_key_env: String,
    #[serde(default = "default_replicate_token_env")]
    pub replicate_token_env: String,
    /// OpenAI model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Replicate model version. Empty = SDXL default.
    #[serde(default)]
    pub replicate_version: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_generation_max_wait")]
    pub max_wait_secs: u64,
    /// Style sentence used when the agent gives none. Empty = built-in.
    #[serde(default)]
    pub default_style: String,
}

/// Content-addressed store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// "pinata" | "memory".
    #[serde(default = "default_content_provider")]
    pub provider: String,
    #[serde(default = "default_pinata_key_env")]
    pub pinata_key_env: String,
    #[serde(default = "default_pinata_secret_env")]
    pub pinata_secret_env: String,
    /// Gateway prefix used only when rendering links.
    #[serde(default = "default_gateway")]
    pub gateway: String,
}

/// Chain access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Environment variable holding the relayer private key.
    #[serde(default = "default_relayer_key_env")]
    pub relayer_key_env: String,
    #[serde(default)]
    pub default_network: Network,
    /// Mint against an in-memory chain (dry runs).
    #[serde(default)]
    pub mock: bool,
    #[serde(default = "default_testnet")]
    pub testnet: ChainNetworkConfig,
    #[serde(default = "default_mainnet")]
    pub mainnet: ChainNetworkConfig,
}

/// One network's endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainNetworkConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Empty = not deployed.
    #[serde(default)]
    pub contract_address: String,
    pub explorer_base: String,
    pub marketplace_base: String,
}

/// Pipeline timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
    /// Age after which a claim without tx hash is reconciled.
    #[serde(default = "default_claim_ttl")]
    pub claim_ttl_secs: u64,
    /// 0 disables the background pass.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
    #[serde(default = "default_external_url_base")]
    pub external_url_base: String,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions

fn default_listen_addr() -> String {
    "127.0.0.1:7733".to_string()
}

fn default_jwt_secret_env() -> String {
    "MOLT_JWT_SECRET".to_string()
}

fn default_token_ttl() -> u64 {
    molt_crypto::session::DEFAULT_TTL_SECS
}

fn default_operator_token_env() -> String {
    "MOLT_OPERATOR_TOKEN".to_string()
}

fn default_rate_limit_window() -> u64 {
    15 * 60
}

fn default_rate_limit_max_requests() -> u32 {
    100
}

fn default_generation_provider() -> String {
    "openai".to_string()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_replicate_token_env() -> String {
    "REPLICATE_API_TOKEN".to_string()
}

fn default_model() -> String {
    molt_imagegen::openai::DEFAULT_MODEL.to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_generation_max_wait() -> u64 {
    120
}

fn default_content_provider() -> String {
    "pinata".to_string()
}

fn default_pinata_key_env() -> String {
    "PINATA_API_KEY".to_string()
}

fn default_pinata_secret_env() -> String {
    "PINATA_SECRET_KEY".to_string()
}

fn default_gateway() -> String {
    "https://gateway.pinata.cloud/ipfs/".to_string()
}

fn default_relayer_key_env() -> String {
    "RELAYER_PRIVATE_KEY".to_string()
}

fn default_testnet() -> ChainNetworkConfig {
    ChainNetworkConfig::from(NetworkProfile::defaults(Network::Testnet))
}

fn default_mainnet() -> ChainNetworkConfig {
    ChainNetworkConfig::from(NetworkProfile::defaults(Network::Mainnet))
}

fn default_confirmation_timeout() -> u64 {
    120
}

fn default_claim_ttl() -> u64 {
    15 * 60
}

fn default_reconcile_interval() -> u64 {
    60
}

fn default_external_url_base() -> String {
    molt_pipeline::orchestrator::DEFAULT_EXTERNAL_URL_BASE.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            rate_limit_window_secs: default_rate_limit_window(),
            rate_limit_max_requests: default_rate_limit_max_requests(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret_env: default_jwt_secret_env(),
            token_ttl_secs: default_token_ttl(),
            operator_token_env: default_operator_token_env(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            openai_key_env: default_openai_key_env(),
            replicate_token_env: default_replicate_token_env(),
            model: default_model(),
            replicate_version: String::new(),
            poll_interval_secs: default_poll_interval(),
            max_wait_secs: default_generation_max_wait(),
            default_style: String::new(),
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            provider: default_content_provider(),
            pinata_key_env: default_pinata_key_env(),
            pinata_secret_env: default_pinata_secret_env(),
            gateway: default_gateway(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            relayer_key_env: default_relayer_key_env(),
            default_network: Network::default(),
            mock: false,
            testnet: default_testnet(),
            mainnet: default_mainnet(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: default_confirmation_timeout(),
            claim_ttl_secs: default_claim_ttl(),
            reconcile_interval_secs: default_reconcile_interval(),
            external_url_base: default_external_url_base(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl From<NetworkProfile> for ChainNetworkConfig {
    fn from(profile: NetworkProfile) -> Self {
        Self {
            rpc_url: profile.rpc_url,
            chain_id: profile.chain_id,
            contract_address: profile.contract_address.unwrap_or_default(),
            explorer_base: profile.explorer_base,
            marketplace_base: profile.marketplace_base,
        }
    }
}

impl ChainNetworkConfig {
    pub fn profile(&self, network: Network) -> NetworkProfile {
        let contract = self.contract_address.trim();
        NetworkProfile {
            network,
            rpc_url: self.rpc_url.clone(),
            chain_id: self.chain_id,
            contract_address: (!contract.is_empty()).then(|| contract.to_string()),
            explorer_base: self.explorer_base.clone(),
            marketplace_base: self.marketplace_base.clone(),
        }
    }
}

impl ChainConfig {
    pub fn network(&self, network: Network) -> &ChainNetworkConfig {
        match network {
            Network::Testnet => &self.testnet,
            Network::Mainnet => &self.mainnet,
        }
    }
}

impl ServerConfig {
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

impl PipelineSettings {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn claim_ttl(&self) -> Duration {
        Duration::from_secs(self.claim_ttl_secs)
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: DaemonConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// `$MOLT_DATA_DIR`, else `~/.molt`.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("MOLT_DATA_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".molt"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/molt"))
    }
}

/// Read a secret from the named environment variable. Blank counts as unset.
pub fn secret_from_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

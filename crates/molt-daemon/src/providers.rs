//! Builds generation, storage and chain backends from configuration.
//!
//! A backend that cannot be built is logged and left out; requests that
//! need it then fail with a configuration error instead of the daemon
//! refusing to start.

use std::sync::Arc;
use std::time::Duration;

use molt_chain::{AlloyRelayer, MockRelayer, Relayer, RelayerSet};
use molt_imagegen::{
    GenerationError, ImageGenerator, MockGenerator, OpenAiImages, PollPolicy, ReplicateProvider,
};
use molt_storage::{ContentStore, MemoryStore, PinataConfig, PinataStore, StoreError};
use molt_types::Network;
use tracing::{info, warn};

use crate::config::{secret_from_env, ChainConfig, ContentConfig, GenerationConfig};

pub fn build_generator(config: &GenerationConfig) -> Option<Arc<dyn ImageGenerator>> {
    match try_build_generator(config) {
        Ok(generator) => {
            info!(provider = generator.id(), "image generator ready");
            Some(generator)
        }
        Err(e) => {
            warn!(provider = %config.provider, error = %e, "image generation disabled");
            None
        }
    }
}

fn try_build_generator(
    config: &GenerationConfig,
) -> Result<Arc<dyn ImageGenerator>, GenerationError> {
    let style = config.default_style.trim();
    match config.provider.as_str() {
        "openai" => {
            let key = secret_from_env(&config.openai_key_env).unwrap_or_default();
            let mut provider = OpenAiImages::new(
                molt_imagegen::openai::OPENAI_BASE_URL,
                config.model.as_str(),
                key,
                Duration::from_secs(config.max_wait_secs.max(1)),
            )?;
            if !style.is_empty() {
                provider = provider.with_default_style(style);
            }
            Ok(Arc::new(provider))
        }
        "replicate" => {
            let token = secret_from_env(&config.replicate_token_env).unwrap_or_default();
            let policy = PollPolicy::new(
                Duration::from_secs(config.poll_interval_secs),
                Duration::from_secs(config.max_wait_secs),
            );
            let version = match config.replicate_version.trim() {
                "" => molt_imagegen::replicate::DEFAULT_SDXL_VERSION,
                v => v,
            };
            let mut provider = ReplicateProvider::new(
                molt_imagegen::replicate::REPLICATE_BASE_URL,
                version,
                token,
                policy,
            )?;
            if !style.is_empty() {
                provider = provider.with_default_style(style);
            }
            Ok(Arc::new(provider))
        }
        "mock" => Ok(Arc::new(MockGenerator::new())),
        other => Err(GenerationError::NotConfigured(format!(
            "unknown provider '{other}'"
        ))),
    }
}

pub fn build_store(config: &ContentConfig) -> Option<Arc<dyn ContentStore>> {
    let built: Result<Arc<dyn ContentStore>, StoreError> = match config.provider.as_str() {
        "pinata" => {
            let key = secret_from_env(&config.pinata_key_env).unwrap_or_default();
            let secret = secret_from_env(&config.pinata_secret_env).unwrap_or_default();
            PinataStore::new(PinataConfig::new(key, secret))
                .map(|store| Arc::new(store) as Arc<dyn ContentStore>)
        }
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => Err(StoreError::NotConfigured(format!(
            "unknown provider '{other}'"
        ))),
    };
    match built {
        Ok(store) => {
            info!(store = store.id(), "content store ready");
            Some(store)
        }
        Err(e) => {
            warn!(provider = %config.provider, error = %e, "content publishing disabled");
            None
        }
    }
}

/// One relayer per network that has a contract address and a relayer key.
pub fn build_relayers(config: &ChainConfig) -> RelayerSet {
    let mut relayers = RelayerSet::new(config.default_network);
    let relayer_key = secret_from_env(&config.relayer_key_env).unwrap_or_default();

    for network in [Network::Testnet, Network::Mainnet] {
        if config.mock {
            warn!(%network, "using in-memory chain");
            relayers.insert(Arc::new(MockRelayer::new(network)));
            continue;
        }
        let profile = config.network(network).profile(network);
        match AlloyRelayer::new(profile, &relayer_key) {
            Ok(relayer) => relayers.insert(Arc::new(relayer) as Arc<dyn Relayer>),
            Err(e) => warn!(%network, error = %e, "minting disabled on network"),
        }
    }
    relayers
}

//! Daily molt orchestration.
//!
//! One attempt moves through
//! `Idle -> Checked -> Generated -> Published -> Minted -> Recorded -> Announced`.
//! Anything that fails before `Minted` comes back as an [`AttemptFailure`].
//! Once the chain confirmed the mint, failures surface as
//! [`Outcome::PartialSuccess`] naming the lagging write.
//!
//! The database mutex is only held for single ledger calls, never across
//! generation, publishing or confirmation waits.

use std::sync::Arc;
use std::time::Duration;

use molt_chain::{ChainError, MintConfirmation, Relayer, RelayerSet};
use molt_db::ledger::{mint, social};
use molt_db::queries::agents;
use molt_imagegen::{GeneratedImage, ImageGenerator, ImagePrompt};
use molt_storage::metadata::image_file_name;
use molt_storage::{ContentStore, MetadataDocument};
use molt_types::{Agent, Clock, ContentId, Network, NftRecord, Post, Submint, MAX_MOOD_LEN};
use rusqlite::Connection;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::eligibility::check_eligibility;
use crate::{ErrorKind, PipelineError, Result};

/// Default wait for a mint receipt.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Default base for the metadata `external_url`.
pub const DEFAULT_EXTERNAL_URL_BASE: &str = "https://moodmint.xyz";

/// Pipeline stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Idle,
    Checked,
    Generated,
    Published,
    Minted,
    Recorded,
    Announced,
}

/// Which write fell behind a confirmed mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lagging {
    Ledger,
    Announcement,
}

/// Share the mint to the feed once recorded.
#[derive(Debug, Clone, Default)]
pub struct Announcement {
    pub submint: Submint,
    pub title: Option<String>,
}

/// Input for a full run.
#[derive(Debug, Clone)]
pub struct MoltRequest {
    pub mood: String,
    pub context: Option<String>,
    pub style: Option<String>,
    pub network: Option<Network>,
    pub announce: Option<Announcement>,
}

impl MoltRequest {
    pub fn new(mood: impl Into<String>) -> Self {
        Self {
            mood: mood.into(),
            context: None,
            style: None,
            network: None,
            announce: None,
        }
    }

    pub fn announced(mut self, announcement: Announcement) -> Self {
        self.announce = Some(announcement);
        self
    }
}

/// Artifacts generated and pinned by the caller.
#[derive(Debug, Clone)]
pub struct PreparedMint {
    pub metadata_uri: String,
    pub image_uri: Option<String>,
    pub mood: Option<String>,
    pub network: Option<Network>,
}

/// Content ids of a pinned image and its metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedArtifacts {
    pub image_cid: ContentId,
    pub metadata_cid: ContentId,
}

/// What the attempt achieved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoltReport {
    /// Last stage reached.
    pub stage: Stage,
    pub attempt_id: String,
    pub network: Network,
    pub metadata_uri: String,
    pub image_uri: Option<String>,
    pub confirmation: MintConfirmation,
    /// `None` while the ledger lags.
    pub nft: Option<NftRecord>,
    pub post: Option<Post>,
    pub explorer_url: String,
    pub marketplace_url: Option<String>,
}

/// Result of an attempt that reached the chain.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum Outcome {
    Success(MoltReport),
    PartialSuccess {
        lagging: Lagging,
        report: MoltReport,
        error: String,
    },
}

impl Outcome {
    pub fn report(&self) -> &MoltReport {
        match self {
            Outcome::Success(report) | Outcome::PartialSuccess { report, .. } => report,
        }
    }

    /// The write that fell behind, if any.
    pub fn lagging(&self) -> Option<Lagging> {
        match self {
            Outcome::Success(_) => None,
            Outcome::PartialSuccess { lagging, .. } => Some(*lagging),
        }
    }
}

/// An attempt that stopped before the mint was confirmed.
#[derive(Debug, thiserror::Error)]
#[error("attempt failed after {stage:?}: {error}")]
pub struct AttemptFailure {
    /// Last stage completed.
    pub stage: Stage,
    pub error: PipelineError,
}

impl AttemptFailure {
    fn at(stage: Stage, error: impl Into<PipelineError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// Tunables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub confirmation_timeout: Duration,
    pub external_url_base: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            external_url_base: DEFAULT_EXTERNAL_URL_BASE.to_string(),
        }
    }
}

/// Sequences generation, publishing, minting and recording.
pub struct Orchestrator {
    db: Arc<Mutex<Connection>>,
    generator: Option<Arc<dyn ImageGenerator>>,
    store: Option<Arc<dyn ContentStore>>,
    relayers: RelayerSet,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        generator: Option<Arc<dyn ImageGenerator>>,
        store: Option<Arc<dyn ContentStore>>,
        relayers: RelayerSet,
        clock: Arc<dyn Clock>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            db,
            generator,
            store,
            relayers,
            clock,
            config,
        }
    }

    pub fn relayers(&self) -> &RelayerSet {
        &self.relayers
    }

    /// Full pipeline, from mood to record.
    pub async fn run(
        &self,
        agent_id: &str,
        request: MoltRequest,
    ) -> std::result::Result<Outcome, AttemptFailure> {
        let mood = validate_mood(&request.mood).map_err(|e| AttemptFailure::at(Stage::Idle, e))?;
        let generator = self.generator.clone().ok_or_else(|| {
            AttemptFailure::at(
                Stage::Idle,
                PipelineError::NotConfigured("no image generator configured".into()),
            )
        })?;
        let store = self.store.clone().ok_or_else(|| {
            AttemptFailure::at(
                Stage::Idle,
                PipelineError::NotConfigured("no content store configured".into()),
            )
        })?;
        let relayer = self
            .relayers
            .get(request.network)
            .map_err(|e| AttemptFailure::at(Stage::Idle, e))?;

        let agent = self
            .preflight(agent_id)
            .await
            .map_err(|e| AttemptFailure::at(Stage::Idle, e))?;
        debug!(agent = %agent.handle, "molt checked");

        let prompt = prompt_for(&mood, request.context.as_deref(), request.style.as_deref());
        let image = generator
            .generate(&prompt)
            .await
            .map_err(|e| AttemptFailure::at(Stage::Checked, e))?;
        debug!(agent = %agent.handle, provider = %image.provider, bytes = image.bytes.len(), "molt generated");

        let PublishedArtifacts {
            image_cid,
            metadata_cid,
        } = self
            .pin(
                store.as_ref(),
                &agent,
                &image.bytes,
                Some(mood.as_str()),
                Some(image.prompt.as_str()),
            )
            .await
            .map_err(|e| AttemptFailure::at(Stage::Generated, e))?;

        let prepared = PreparedMint {
            metadata_uri: metadata_cid.uri(),
            image_uri: Some(image_cid.uri()),
            mood: Some(mood),
            network: request.network,
        };
        self.mint_published(&agent, relayer.as_ref(), prepared, request.announce)
            .await
    }

    /// Mint artifacts that were generated and pinned elsewhere.
    pub async fn submit_prepared(
        &self,
        agent_id: &str,
        prepared: PreparedMint,
    ) -> std::result::Result<Outcome, AttemptFailure> {
        ContentId::from_uri(&prepared.metadata_uri)
            .map_err(|e| AttemptFailure::at(Stage::Idle, PipelineError::InvalidInput(e.to_string())))?;
        if let Some(image_uri) = prepared.image_uri.as_deref().filter(|u| !u.is_empty()) {
            ContentId::from_uri(image_uri).map_err(|e| {
                AttemptFailure::at(Stage::Idle, PipelineError::InvalidInput(e.to_string()))
            })?;
        }
        if let Some(mood) = prepared.mood.as_deref() {
            if mood.chars().count() > MAX_MOOD_LEN {
                return Err(AttemptFailure::at(
                    Stage::Idle,
                    PipelineError::InvalidInput(format!("mood exceeds {MAX_MOOD_LEN} characters")),
                ));
            }
        }
        let relayer = self
            .relayers
            .get(prepared.network)
            .map_err(|e| AttemptFailure::at(Stage::Idle, e))?;
        let agent = self
            .preflight(agent_id)
            .await
            .map_err(|e| AttemptFailure::at(Stage::Idle, e))?;
        self.mint_published(&agent, relayer.as_ref(), prepared, None)
            .await
    }

    /// Generate an image without publishing or minting it.
    ///
    /// Runs the same advisory cooldown check as a full molt.
    pub async fn generate_image(
        &self,
        agent_id: &str,
        mood: &str,
        context: Option<&str>,
        style: Option<&str>,
    ) -> Result<GeneratedImage> {
        let mood = validate_mood(mood)?;
        let generator = self
            .generator
            .clone()
            .ok_or_else(|| PipelineError::NotConfigured("no image generator configured".into()))?;
        let agent = self.preflight(agent_id).await?;

        let image = generator.generate(&prompt_for(&mood, context, style)).await?;
        info!(agent = %agent.handle, provider = %image.provider, bytes = image.bytes.len(), "image generated");
        Ok(image)
    }

    /// Pin caller-supplied image bytes and a metadata document for them.
    pub async fn publish_artifacts(
        &self,
        agent_id: &str,
        image: &[u8],
        mood: Option<&str>,
        prompt: Option<&str>,
    ) -> Result<PublishedArtifacts> {
        if image.is_empty() {
            return Err(PipelineError::InvalidInput("image is empty".into()));
        }
        let mood = non_blank(mood).map(validate_mood).transpose()?;
        let store = self
            .store
            .clone()
            .ok_or_else(|| PipelineError::NotConfigured("no content store configured".into()))?;
        let agent = {
            let conn = self.db.lock().await;
            agents::get(&conn, agent_id)?
                .ok_or_else(|| PipelineError::NotFound(format!("agent {agent_id}")))?
        };
        self.pin(store.as_ref(), &agent, image, mood.as_deref(), non_blank(prompt))
            .await
    }

    async fn pin(
        &self,
        store: &dyn ContentStore,
        agent: &Agent,
        image: &[u8],
        mood: Option<&str>,
        prompt: Option<&str>,
    ) -> Result<PublishedArtifacts> {
        let now = self.clock.now();
        let image_cid = store
            .publish_image(image, &image_file_name(&agent.handle, now))
            .await?;
        let document = MetadataDocument::for_mint(
            agent,
            mood,
            &image_cid,
            prompt,
            &self.config.external_url_base,
            now,
        );
        let metadata_cid = store.publish_metadata(&document).await?;
        info!(
            agent = %agent.handle,
            store = store.id(),
            image = %image_cid,
            metadata = %metadata_cid,
            "molt published"
        );
        Ok(PublishedArtifacts {
            image_cid,
            metadata_cid,
        })
    }

    /// Load the agent and apply the advisory gate checks.
    async fn preflight(&self, agent_id: &str) -> Result<Agent> {
        let conn = self.db.lock().await;
        let agent = agents::get(&conn, agent_id)?
            .ok_or_else(|| PipelineError::NotFound(format!("agent {agent_id}")))?;
        let anchor = mint::cooldown_anchor(&conn, agent_id)?;
        let eligibility = check_eligibility(anchor, self.clock.now());
        if !eligibility.can_mint {
            return Err(PipelineError::Cooldown {
                remaining_secs: eligibility.cooldown_remaining,
                next_eligible_at: eligibility.next_eligible_at.unwrap_or_default(),
            });
        }
        if let Some(open) = mint::open_attempt_for(&conn, agent_id)? {
            return Err(PipelineError::AttemptInProgress(open.attempt_id));
        }
        Ok(agent)
    }

    /// Shared path from `Published` onwards.
    async fn mint_published(
        &self,
        agent: &Agent,
        relayer: &dyn Relayer,
        prepared: PreparedMint,
        announce: Option<Announcement>,
    ) -> std::result::Result<Outcome, AttemptFailure> {
        let network = relayer.profile().network;

        // Second gate check right before the claim.
        self.preflight(&agent.id)
            .await
            .map_err(|e| AttemptFailure::at(Stage::Published, e))?;

        let claim = mint::MintClaim {
            agent_id: agent.id.clone(),
            network,
            recipient: agent.wallet_address.clone(),
            metadata_uri: prepared.metadata_uri.clone(),
            image_uri: prepared.image_uri.clone(),
            mood: prepared.mood.clone(),
        };
        let pending = {
            let mut conn = self.db.lock().await;
            mint::claim(&mut conn, &claim, self.clock.now())
        }
        .map_err(|e| AttemptFailure::at(Stage::Published, e))?;
        let attempt_id = pending.attempt_id.clone();

        // Sign first and journal the hash, so a broadcast whose response is
        // lost can still be found by the reconciler.
        let signed = match relayer.sign(&agent.wallet_address, &prepared.metadata_uri).await {
            Ok(signed) => signed,
            Err(e) => {
                self.release(&attempt_id, &e.to_string()).await;
                return Err(AttemptFailure::at(Stage::Published, e));
            }
        };
        let tx_hash = signed.tx_hash.clone();
        let journaled = {
            let conn = self.db.lock().await;
            mint::mark_submitted(&conn, &attempt_id, &tx_hash, self.clock.now())
        };
        if let Err(e) = journaled {
            self.release(&attempt_id, &format!("could not journal tx hash: {e}")).await;
            return Err(AttemptFailure::at(Stage::Published, e));
        }

        if let Err(e) = relayer.broadcast(&signed).await {
            if e.is_definite_rejection() {
                self.release(&attempt_id, &e.to_string()).await;
                return Err(AttemptFailure::at(Stage::Published, e));
            }
            return Err(self.in_doubt(attempt_id, tx_hash, e).await);
        }
        info!(agent = %agent.handle, attempt = %attempt_id, %tx_hash, %network, "mint submitted");

        let confirmation = match relayer
            .await_confirmation(&tx_hash, self.config.confirmation_timeout)
            .await
        {
            Ok(confirmation) => confirmation,
            Err(ChainError::TransactionReverted(detail)) => {
                self.release(&attempt_id, &format!("reverted: {detail}")).await;
                return Err(AttemptFailure::at(
                    Stage::Published,
                    ChainError::TransactionReverted(detail),
                ));
            }
            Err(e) => return Err(self.in_doubt(attempt_id, tx_hash, e).await),
        };

        let profile = relayer.profile();
        let mut report = MoltReport {
            stage: Stage::Minted,
            attempt_id: attempt_id.clone(),
            network,
            metadata_uri: prepared.metadata_uri.clone(),
            image_uri: prepared.image_uri.clone(),
            explorer_url: profile.explorer_tx_url(&confirmation.tx_hash),
            marketplace_url: profile.marketplace_url(confirmation.token_id),
            confirmation,
            nft: None,
            post: None,
        };
        info!(
            agent = %agent.handle,
            tx_hash = %report.confirmation.tx_hash,
            token_id = ?report.confirmation.token_id,
            "mint confirmed"
        );

        let recorded = {
            let mut conn = self.db.lock().await;
            let now = self.clock.now();
            let confirmation = &report.confirmation;
            let minted_at = confirmation.minted_at.unwrap_or(now);
            if let Err(e) = mint::mark_confirmed(
                &conn,
                &attempt_id,
                &confirmation.tx_hash,
                confirmation.token_id,
                Some(minted_at),
                now,
            ) {
                debug!(attempt = %attempt_id, error = %e, "journal not advanced to confirmed");
            }
            mint::MintCommit::from_pending(&pending, &confirmation.tx_hash, confirmation.token_id, minted_at)
                .and_then(|commit| mint::commit(&mut conn, &commit, now))
        };
        let nft = match recorded {
            Ok(nft) => nft,
            Err(e) => {
                warn!(attempt = %attempt_id, error = %e, "ledger lagging behind confirmed mint");
                return Ok(Outcome::PartialSuccess {
                    lagging: Lagging::Ledger,
                    report,
                    error: e.to_string(),
                });
            }
        };
        report.stage = Stage::Recorded;
        report.nft = Some(nft.clone());

        let Some(announcement) = announce else {
            return Ok(Outcome::Success(report));
        };
        let new_post = social::NewPost {
            agent_id: agent.id.clone(),
            nft_id: Some(nft.id.clone()),
            submint: Some(announcement.submint.as_str().to_string()),
            title: announcement.title,
            content: prepared.mood,
        };
        let posted = {
            let conn = self.db.lock().await;
            social::create_post(&conn, &new_post, self.clock.now())
        };
        match posted {
            Ok(post) => {
                report.stage = Stage::Announced;
                report.post = Some(post);
                Ok(Outcome::Success(report))
            }
            Err(e) => {
                warn!(nft = %nft.id, error = %e, "announcement failed");
                Ok(Outcome::PartialSuccess {
                    lagging: Lagging::Announcement,
                    report,
                    error: e.to_string(),
                })
            }
        }
    }

    /// Keep the claim and note why the outcome is unknown.
    async fn in_doubt(&self, attempt_id: String, tx_hash: String, error: ChainError) -> AttemptFailure {
        let reason = error.to_string();
        warn!(attempt = %attempt_id, %tx_hash, error = %reason, "mint in doubt, claim kept");
        {
            let conn = self.db.lock().await;
            if let Err(e) = mint::note_error(&conn, &attempt_id, &reason, self.clock.now()) {
                warn!(attempt = %attempt_id, error = %e, "could not note error");
            }
        }
        AttemptFailure::at(
            Stage::Published,
            PipelineError::InDoubt {
                attempt_id,
                tx_hash,
                reason,
            },
        )
    }

    async fn release(&self, attempt_id: &str, reason: &str) {
        let conn = self.db.lock().await;
        if let Err(e) = mint::release(&conn, attempt_id, reason, self.clock.now()) {
            warn!(attempt = %attempt_id, error = %e, "could not release claim");
        }
    }
}

fn validate_mood(mood: &str) -> Result<String> {
    let mood = mood.trim();
    if mood.is_empty() {
        return Err(PipelineError::InvalidInput("mood is required".into()));
    }
    if mood.chars().count() > MAX_MOOD_LEN {
        return Err(PipelineError::InvalidInput(format!(
            "mood exceeds {MAX_MOOD_LEN} characters"
        )));
    }
    Ok(mood.to_string())
}

fn prompt_for(mood: &str, context: Option<&str>, style: Option<&str>) -> ImagePrompt {
    let mut prompt = ImagePrompt::new(mood.to_string());
    if let Some(context) = non_blank(context) {
        prompt = prompt.with_context(context);
    }
    if let Some(style) = non_blank(style) {
        prompt = prompt.with_style(style);
    }
    prompt
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

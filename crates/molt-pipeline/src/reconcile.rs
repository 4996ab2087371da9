//! Reconciliation of journaled mint attempts against chain data.
//!
//! Open journal rows are resolved as follows:
//! - `confirmed`: committed from the journaled data
//! - `submitted`: receipt lookup; confirmed rows are committed, reverted
//!   rows released, pending rows left alone. A hash the node has never
//!   seen is treated like a stale claim once the claim TTL has passed.
//! - `claimed` past the claim TTL: orphaned for manual review when the
//!   chain holds an unrecorded token with the attempt's metadata URI,
//!   otherwise released
//!
//! Records still missing a token id are then backfilled. Tokens are matched
//! to records by their `tokenURI`, never by position, so mints made outside
//! the ledger cannot shift the mapping.

use std::sync::Arc;
use std::time::Duration;

use molt_chain::{ReceiptStatus, Relayer, RelayerSet};
use molt_db::ledger::mint::{self, MintCommit, PendingMint, PendingStatus};
use molt_db::queries::{agents, nfts};
use molt_types::{ContentId, Network};
use rusqlite::Connection;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::Result;

/// Default age after which a claim without a known transaction is examined.
pub const DEFAULT_CLAIM_TTL: Duration = Duration::from_secs(15 * 60);

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub recorded: u32,
    pub released: u32,
    pub orphaned: u32,
    pub still_pending: u32,
    pub backfilled: u32,
    /// Per-row failures; the pass carries on past them.
    pub errors: Vec<String>,
}

/// A token on chain that no ledger record claims yet.
#[derive(Debug, Clone)]
struct UnrecordedToken {
    token_id: u64,
    metadata_uri: String,
}

/// Resolves open attempts. Runs on an interval in the daemon.
pub struct Reconciler {
    db: Arc<Mutex<Connection>>,
    relayers: RelayerSet,
    claim_ttl: Duration,
}

impl Reconciler {
    pub fn new(db: Arc<Mutex<Connection>>, relayers: RelayerSet, claim_ttl: Duration) -> Self {
        Self {
            db,
            relayers,
            claim_ttl,
        }
    }

    /// One pass over open attempts, then the token id backfill.
    pub async fn run_once(&self, now: u64) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let open = {
            let conn = self.db.lock().await;
            mint::open_attempts(&conn)?
        };
        for pending in open {
            if let Err(e) = self.resolve(&pending, now, &mut report).await {
                warn!(attempt = %pending.attempt_id, error = %e, "reconcile failed for attempt");
                report.errors.push(format!("{}: {e}", pending.attempt_id));
            }
        }

        self.backfill(&mut report).await;

        if report != ReconcileReport::default() {
            info!(
                recorded = report.recorded,
                released = report.released,
                orphaned = report.orphaned,
                pending = report.still_pending,
                backfilled = report.backfilled,
                errors = report.errors.len(),
                "reconcile pass finished"
            );
        }
        Ok(report)
    }

    async fn resolve(&self, pending: &PendingMint, now: u64, report: &mut ReconcileReport) -> Result<()> {
        let relayer = self.relayers.get(Some(pending.network))?;
        match (pending.status, pending.tx_hash.as_deref()) {
            (PendingStatus::Confirmed, Some(tx_hash)) => {
                let minted_at = pending.minted_at.unwrap_or(pending.updated_at);
                self.record(pending, tx_hash, pending.token_id, minted_at, now)
                    .await?;
                report.recorded += 1;
            }
            (PendingStatus::Submitted, Some(tx_hash)) => match relayer.receipt(tx_hash).await? {
                ReceiptStatus::Confirmed(confirmation) => {
                    let token_id = match confirmation.token_id {
                        Some(id) => Some(id),
                        None => self.token_for_attempt(relayer.as_ref(), pending).await?,
                    };
                    let minted_at = confirmation.minted_at.unwrap_or(now);
                    self.record(pending, tx_hash, token_id, minted_at, now).await?;
                    report.recorded += 1;
                }
                ReceiptStatus::Reverted => {
                    let conn = self.db.lock().await;
                    mint::release(&conn, &pending.attempt_id, "transaction reverted", now)?;
                    report.released += 1;
                }
                ReceiptStatus::Pending => {
                    debug!(attempt = %pending.attempt_id, %tx_hash, "receipt still pending");
                    report.still_pending += 1;
                }
                ReceiptStatus::Unknown => {
                    debug!(attempt = %pending.attempt_id, %tx_hash, "transaction unknown to the node");
                    self.settle_stale(relayer.as_ref(), pending, now, report).await?;
                }
            },
            _ => self.settle_stale(relayer.as_ref(), pending, now, report).await?,
        }
        Ok(())
    }

    /// Release or orphan an attempt with no observable transaction, once it
    /// is older than the claim TTL.
    async fn settle_stale(
        &self,
        relayer: &dyn Relayer,
        pending: &PendingMint,
        now: u64,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let age = now.saturating_sub(pending.claimed_at);
        if age < self.claim_ttl.as_secs() {
            report.still_pending += 1;
            return Ok(());
        }

        let matching = self.token_for_attempt(relayer, pending).await?;
        let conn = self.db.lock().await;
        match matching {
            Some(token_id) => {
                mint::mark_orphaned(
                    &conn,
                    &pending.attempt_id,
                    &format!("token {token_id} carries this attempt's metadata but no journaled tx"),
                    now,
                )?;
                warn!(
                    attempt = %pending.attempt_id,
                    agent = %pending.agent_id,
                    token_id,
                    "unjournaled mint on chain, attempt orphaned for review"
                );
                report.orphaned += 1;
            }
            None => {
                mint::release(&conn, &pending.attempt_id, "no transaction reached the chain", now)?;
                report.released += 1;
            }
        }
        Ok(())
    }

    async fn record(
        &self,
        pending: &PendingMint,
        tx_hash: &str,
        token_id: Option<u64>,
        minted_at: u64,
        now: u64,
    ) -> Result<()> {
        let commit = MintCommit::from_pending(pending, tx_hash, token_id, minted_at)?;
        let mut conn = self.db.lock().await;
        let nft = mint::commit(&mut conn, &commit, now)?;
        info!(attempt = %pending.attempt_id, nft = %nft.id, token_id = ?nft.token_id, "attempt reconciled");
        Ok(())
    }

    /// The unrecorded token minted with this attempt's metadata, if any.
    async fn token_for_attempt(&self, relayer: &dyn Relayer, pending: &PendingMint) -> Result<Option<u64>> {
        let target = ContentId::from_uri(&pending.metadata_uri).ok();
        let unrecorded = self
            .unrecorded_tokens(relayer, &pending.agent_id, &pending.recipient, pending.network)
            .await?;
        Ok(unrecorded
            .into_iter()
            .find(|token| match &target {
                Some(cid) => ContentId::from_uri(&token.metadata_uri).ok().as_ref() == Some(cid),
                None => token.metadata_uri == pending.metadata_uri,
            })
            .map(|token| token.token_id))
    }

    /// Tokens in the recipient's timeline that no record holds, with their URIs.
    async fn unrecorded_tokens(
        &self,
        relayer: &dyn Relayer,
        agent_id: &str,
        recipient: &str,
        network: Network,
    ) -> Result<Vec<UnrecordedToken>> {
        let timeline = relayer.timeline(recipient).await?;
        let recorded: Vec<u64> = {
            let conn = self.db.lock().await;
            nfts::list_by_agent_network(&conn, agent_id, network)?
                .into_iter()
                .filter_map(|nft| nft.token_id)
                .collect()
        };

        let mut unrecorded = Vec::new();
        for token_id in timeline.into_iter().filter(|id| !recorded.contains(id)) {
            let metadata_uri = relayer.token_uri(token_id).await?;
            unrecorded.push(UnrecordedToken {
                token_id,
                metadata_uri,
            });
        }
        Ok(unrecorded)
    }

    async fn backfill(&self, report: &mut ReconcileReport) {
        let missing = {
            let conn = self.db.lock().await;
            nfts::agents_missing_token_ids(&conn)
        };
        let missing = match missing {
            Ok(missing) => missing,
            Err(e) => {
                report.errors.push(format!("backfill: {e}"));
                return;
            }
        };
        for (agent_id, network) in missing {
            match self.backfill_agent(&agent_id, network).await {
                Ok(count) => report.backfilled += count,
                Err(e) => {
                    warn!(agent = %agent_id, %network, error = %e, "token id backfill failed");
                    report.errors.push(format!("backfill {agent_id}: {e}"));
                }
            }
        }
    }

    /// Give each record without a token id the unrecorded token whose
    /// metadata URI names the record's metadata.
    async fn backfill_agent(&self, agent_id: &str, network: Network) -> Result<u32> {
        let relayer = self.relayers.get(Some(network))?;
        let agent = {
            let conn = self.db.lock().await;
            agents::resolve(&conn, agent_id)?
        };
        let mut unrecorded = self
            .unrecorded_tokens(relayer.as_ref(), agent_id, &agent.wallet_address, network)
            .await?;

        let conn = self.db.lock().await;
        let records = nfts::list_by_agent_network(&conn, agent_id, network)?;
        let mut filled = 0;
        for record in records.iter().filter(|r| r.token_id.is_none()) {
            let Some(index) = unrecorded.iter().position(|token| {
                ContentId::from_uri(&token.metadata_uri).ok().as_ref() == Some(&record.metadata_cid)
            }) else {
                debug!(nft = %record.id, "no unrecorded token matches this record yet");
                continue;
            };
            let token = unrecorded.remove(index);
            if mint::backfill_token_id(&conn, &record.id, token.token_id)? {
                debug!(nft = %record.id, token_id = token.token_id, "token id backfilled");
                filled += 1;
            }
        }
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use molt_chain::{MockMode, MockRelayer};
    use molt_db::queries::agents::NewAgent;

    const T0: u64 = 1_700_000_000;
    const WALLET: &str = "0x00000000000000000000000000000000000a11ce";
    const TTL: Duration = Duration::from_secs(600);

    fn setup() -> (Arc<Mutex<Connection>>, Arc<MockRelayer>, Reconciler) {
        let conn = molt_db::open_memory().expect("open db");
        agents::insert(
            &conn,
            &NewAgent {
                id: "agent-1".into(),
                handle: "molty".into(),
                display_name: "Molty".into(),
                bio: None,
                wallet_address: WALLET.into(),
                api_key_hash: "hash".into(),
                created_at: T0,
            },
        )
        .expect("insert agent");
        let db = Arc::new(Mutex::new(conn));
        let relayer = Arc::new(MockRelayer::new(Network::Testnet));
        let reconciler = Reconciler::new(
            db.clone(),
            RelayerSet::new(Network::Testnet).with(relayer.clone()),
            TTL,
        );
        (db, relayer, reconciler)
    }

    async fn take_claim(db: &Arc<Mutex<Connection>>, now: u64) -> PendingMint {
        let mut conn = db.lock().await;
        mint::claim(
            &mut conn,
            &mint::MintClaim {
                agent_id: "agent-1".into(),
                network: Network::Testnet,
                recipient: WALLET.into(),
                metadata_uri: "ipfs://QmMeta".into(),
                image_uri: Some("ipfs://QmImage".into()),
                mood: Some("calm".into()),
            },
            now,
        )
        .expect("claim")
    }

    async fn status(db: &Arc<Mutex<Connection>>, attempt_id: &str) -> PendingStatus {
        let conn = db.lock().await;
        mint::get_attempt(&conn, attempt_id)
            .expect("query")
            .expect("attempt")
            .status
    }

    #[tokio::test]
    async fn test_confirmed_row_is_committed() {
        let (db, _relayer, reconciler) = setup();
        let pending = take_claim(&db, T0).await;
        {
            let conn = db.lock().await;
            mint::mark_submitted(&conn, &pending.attempt_id, "0xabc", T0).expect("submitted");
            mint::mark_confirmed(&conn, &pending.attempt_id, "0xabc", Some(7), Some(T0 + 5), T0 + 10)
                .expect("confirmed");
        }

        let report = reconciler.run_once(T0 + 60).await.expect("reconcile");
        assert_eq!(report.recorded, 1);
        assert_eq!(status(&db, &pending.attempt_id).await, PendingStatus::Recorded);

        let conn = db.lock().await;
        let nft = nfts::get_by_tx_hash(&conn, "0xabc").expect("q").expect("nft");
        assert_eq!(nft.token_id, Some(7));
        assert_eq!(nft.minted_at, T0 + 5);
        assert_eq!(nft.mood.as_deref(), Some("calm"));
    }

    #[tokio::test]
    async fn test_submitted_row_follows_receipt() {
        let (db, relayer, reconciler) = setup();
        relayer.set_mode(MockMode::Stall);
        let pending = take_claim(&db, T0).await;
        let tx_hash = relayer.submit(WALLET, "ipfs://QmMeta").await.expect("submit");
        {
            let conn = db.lock().await;
            mint::mark_submitted(&conn, &pending.attempt_id, &tx_hash, T0).expect("submitted");
        }

        let report = reconciler.run_once(T0 + 60).await.expect("first pass");
        assert_eq!(report.still_pending, 1);
        assert_eq!(status(&db, &pending.attempt_id).await, PendingStatus::Submitted);

        relayer.mine(&tx_hash);
        let report = reconciler.run_once(T0 + 120).await.expect("second pass");
        assert_eq!(report.recorded, 1);
        let conn = db.lock().await;
        let agent = agents::get(&conn, "agent-1").expect("q").expect("agent");
        assert_eq!(agent.total_mints, 1);
        assert_eq!(agent.last_mint_at, Some(T0 + 120));
    }

    #[tokio::test]
    async fn test_reverted_row_is_released() {
        let (db, relayer, reconciler) = setup();
        relayer.set_mode(MockMode::Revert);
        let pending = take_claim(&db, T0).await;
        let tx_hash = relayer.submit(WALLET, "ipfs://QmMeta").await.expect("submit");
        {
            let conn = db.lock().await;
            mint::mark_submitted(&conn, &pending.attempt_id, &tx_hash, T0).expect("submitted");
        }
        let report = reconciler.run_once(T0 + 60).await.expect("reconcile");
        assert_eq!(report.released, 1);
        assert_eq!(status(&db, &pending.attempt_id).await, PendingStatus::Released);
    }

    #[tokio::test]
    async fn test_stale_claim_without_chain_mint_is_released() {
        let (db, _relayer, reconciler) = setup();
        let pending = take_claim(&db, T0).await;

        let report = reconciler.run_once(T0 + 60).await.expect("young claim");
        assert_eq!(report.still_pending, 1);

        let report = reconciler.run_once(T0 + TTL.as_secs()).await.expect("stale claim");
        assert_eq!(report.released, 1);
        assert_eq!(status(&db, &pending.attempt_id).await, PendingStatus::Released);
    }

    #[tokio::test]
    async fn test_stale_claim_with_unjournaled_mint_is_orphaned() {
        let (db, relayer, reconciler) = setup();
        let pending = take_claim(&db, T0).await;
        relayer.submit(WALLET, "ipfs://QmMeta").await.expect("submit");

        let report = reconciler.run_once(T0 + TTL.as_secs()).await.expect("reconcile");
        assert_eq!(report.orphaned, 1);
        assert_eq!(status(&db, &pending.attempt_id).await, PendingStatus::Orphaned);
    }

    #[tokio::test]
    async fn test_stale_claim_ignores_unrelated_mint() {
        let (db, relayer, reconciler) = setup();
        let pending = take_claim(&db, T0).await;
        relayer.submit(WALLET, "ipfs://QmStray").await.expect("stray mint");

        let report = reconciler.run_once(T0 + TTL.as_secs()).await.expect("reconcile");
        assert_eq!(report.orphaned, 0);
        assert_eq!(report.released, 1);
        assert_eq!(status(&db, &pending.attempt_id).await, PendingStatus::Released);
    }

    #[tokio::test]
    async fn test_unknown_hash_released_after_ttl() {
        let (db, relayer, reconciler) = setup();
        let pending = take_claim(&db, T0).await;
        let signed = relayer.sign(WALLET, "ipfs://QmMeta").await.expect("sign");
        {
            let conn = db.lock().await;
            mint::mark_submitted(&conn, &pending.attempt_id, &signed.tx_hash, T0).expect("submitted");
        }

        let report = reconciler.run_once(T0 + 60).await.expect("young");
        assert_eq!(report.still_pending, 1);

        let report = reconciler.run_once(T0 + TTL.as_secs()).await.expect("stale");
        assert_eq!(report.released, 1);
        assert_eq!(status(&db, &pending.attempt_id).await, PendingStatus::Released);
        assert_eq!(relayer.mined_count(), 0);
    }

    #[tokio::test]
    async fn test_backfill_from_timeline() {
        let (db, relayer, reconciler) = setup();
        relayer.set_emit_event(false);
        let tx_hash = relayer.submit(WALLET, "ipfs://QmMeta").await.expect("submit");
        {
            let mut conn = db.lock().await;
            mint::commit(
                &mut conn,
                &MintCommit {
                    attempt_id: None,
                    agent_id: "agent-1".into(),
                    network: Network::Testnet,
                    token_id: None,
                    image_cid: None,
                    metadata_cid: ContentId::new("QmMeta"),
                    tx_hash,
                    mood: None,
                    minted_at: T0,
                },
                T0,
            )
            .expect("commit");
        }

        let report = reconciler.run_once(T0 + 60).await.expect("reconcile");
        assert_eq!(report.backfilled, 1);
        let conn = db.lock().await;
        let records = nfts::list_by_agent(&conn, "agent-1").expect("list");
        assert_eq!(records[0].token_id, Some(1));
    }

    #[tokio::test]
    async fn test_backfill_skips_unjournaled_mints() {
        let (db, relayer, reconciler) = setup();
        relayer.submit(WALLET, "ipfs://QmStray").await.expect("stray mint");
        relayer.set_emit_event(false);
        let tx_hash = relayer.submit(WALLET, "ipfs://QmMeta").await.expect("submit");
        {
            let mut conn = db.lock().await;
            mint::commit(
                &mut conn,
                &MintCommit {
                    attempt_id: None,
                    agent_id: "agent-1".into(),
                    network: Network::Testnet,
                    token_id: None,
                    image_cid: None,
                    metadata_cid: ContentId::new("QmMeta"),
                    tx_hash,
                    mood: None,
                    minted_at: T0,
                },
                T0,
            )
            .expect("commit");
        }

        let report = reconciler.run_once(T0 + 60).await.expect("reconcile");
        assert_eq!(report.backfilled, 1);
        let conn = db.lock().await;
        let records = nfts::list_by_agent(&conn, "agent-1").expect("list");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].token_id, Some(2));
    }

    #[tokio::test]
    async fn test_missing_event_resolved_by_token_uri() {
        let (db, relayer, reconciler) = setup();
        relayer.submit(WALLET, "ipfs://QmStray").await.expect("stray mint");
        relayer.set_emit_event(false);
        let pending = take_claim(&db, T0).await;
        let tx_hash = relayer.submit(WALLET, "ipfs://QmMeta").await.expect("submit");
        {
            let conn = db.lock().await;
            mint::mark_submitted(&conn, &pending.attempt_id, &tx_hash, T0).expect("submitted");
        }

        let report = reconciler.run_once(T0 + 60).await.expect("reconcile");
        assert_eq!(report.recorded, 1);
        let conn = db.lock().await;
        let nft = nfts::get_by_tx_hash(&conn, &tx_hash).expect("q").expect("nft");
        assert_eq!(nft.token_id, Some(2));
    }

    #[tokio::test]
    async fn test_missing_relayer_is_reported_not_fatal() {
        let (db, _relayer, _) = setup();
        let reconciler = Reconciler::new(db.clone(), RelayerSet::new(Network::Mainnet), TTL);
        take_claim(&db, T0).await;
        let report = reconciler.run_once(T0 + TTL.as_secs()).await.expect("reconcile");
        assert_eq!(report.errors.len(), 1);
    }
}

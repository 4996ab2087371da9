//! Mint ledger: the per-agent claim journal and committed NFT records.
//!
//! An attempt moves through `claimed -> submitted -> confirmed -> recorded`,
//! or ends as `released` (nothing happened on chain) or `orphaned` (chain
//! state disagrees with the journal and needs a human). Only one row per
//! agent may be open at a time; the unique partial index enforces it.

use std::fmt;

use molt_types::{ContentId, Network, NftRecord, COOLDOWN_SECS};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};
use serde::Serialize;

use crate::queries::nfts;
use crate::{is_constraint, new_id, parse_column, DbError, Result};

/// Journal status of a mint attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingStatus {
    Claimed,
    Submitted,
    Confirmed,
    Recorded,
    Released,
    Orphaned,
}

impl PendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingStatus::Claimed => "claimed",
            PendingStatus::Submitted => "submitted",
            PendingStatus::Confirmed => "confirmed",
            PendingStatus::Recorded => "recorded",
            PendingStatus::Released => "released",
            PendingStatus::Orphaned => "orphaned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "claimed" => Some(PendingStatus::Claimed),
            "submitted" => Some(PendingStatus::Submitted),
            "confirmed" => Some(PendingStatus::Confirmed),
            "recorded" => Some(PendingStatus::Recorded),
            "released" => Some(PendingStatus::Released),
            "orphaned" => Some(PendingStatus::Orphaned),
            _ => None,
        }
    }

    /// Open rows block further claims for the same agent.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            PendingStatus::Claimed | PendingStatus::Submitted | PendingStatus::Confirmed
        )
    }
}

impl fmt::Display for PendingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A journal row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMint {
    pub attempt_id: String,
    pub agent_id: String,
    pub network: Network,
    pub recipient: String,
    pub metadata_uri: String,
    pub image_uri: Option<String>,
    pub mood: Option<String>,
    pub status: PendingStatus,
    pub tx_hash: Option<String>,
    pub token_id: Option<u64>,
    /// Chain time of the mint, once confirmed.
    pub minted_at: Option<u64>,
    pub claimed_at: u64,
    pub updated_at: u64,
    pub last_error: Option<String>,
}

/// What a caller wants to mint.
#[derive(Clone, Debug)]
pub struct MintClaim {
    pub agent_id: String,
    pub network: Network,
    /// Wallet that receives the token.
    pub recipient: String,
    pub metadata_uri: String,
    pub image_uri: Option<String>,
    pub mood: Option<String>,
}

/// Data needed to record a confirmed mint.
#[derive(Clone, Debug)]
pub struct MintCommit {
    /// Journal row to close, if the mint went through the journal.
    pub attempt_id: Option<String>,
    pub agent_id: String,
    pub network: Network,
    pub token_id: Option<u64>,
    pub image_cid: Option<ContentId>,
    pub metadata_cid: ContentId,
    pub tx_hash: String,
    pub mood: Option<String>,
    /// When the token was minted; also advances the agent's cooldown.
    pub minted_at: u64,
}

impl MintCommit {
    /// Build a commit from a journal row once its tx hash is known.
    pub fn from_pending(
        pending: &PendingMint,
        tx_hash: &str,
        token_id: Option<u64>,
        minted_at: u64,
    ) -> Result<Self> {
        let metadata_cid = ContentId::from_uri(&pending.metadata_uri)
            .map_err(|e| DbError::Invalid(e.to_string()))?;
        let image_cid = pending
            .image_uri
            .as_deref()
            .filter(|uri| !uri.is_empty())
            .map(ContentId::from_uri)
            .transpose()
            .map_err(|e| DbError::Invalid(e.to_string()))?;
        Ok(Self {
            attempt_id: Some(pending.attempt_id.clone()),
            agent_id: pending.agent_id.clone(),
            network: pending.network,
            token_id: token_id.or(pending.token_id),
            image_cid,
            metadata_cid,
            tx_hash: tx_hash.to_string(),
            mood: pending.mood.clone(),
            minted_at,
        })
    }
}

const PENDING_COLUMNS: &str = "attempt_id, agent_id, network, recipient, metadata_uri, image_uri, mood, \
     status, tx_hash, token_id, minted_at, claimed_at, updated_at, last_error";

/// Start of the agent's current cooldown: the later of its last recorded
/// mint and any orphaned claim, which may have minted on chain.
pub fn cooldown_anchor(conn: &Connection, agent_id: &str) -> Result<Option<u64>> {
    let last_mint_at: Option<i64> = conn
        .query_row(
            "SELECT last_mint_at FROM agents WHERE id = ?1",
            [agent_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("agent {agent_id}")))?;

    let last_orphan: Option<i64> = conn.query_row(
        "SELECT MAX(claimed_at) FROM pending_mints WHERE agent_id = ?1 AND status = 'orphaned'",
        [agent_id],
        |row| row.get(0),
    )?;

    Ok(last_mint_at.max(last_orphan).map(|t| t as u64))
}

/// Take the per-agent mint claim.
///
/// Re-reads the agent inside an `IMMEDIATE` transaction and re-applies the
/// 24 hour rule, so two racing callers cannot both pass.
pub fn claim(conn: &mut Connection, claim: &MintClaim, now: u64) -> Result<PendingMint> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if let Some(last) = cooldown_anchor(&tx, &claim.agent_id)? {
        let next_eligible_at = last + COOLDOWN_SECS;
        if now < next_eligible_at {
            return Err(DbError::Cooldown {
                remaining_secs: next_eligible_at - now,
                next_eligible_at,
            });
        }
    }

    if let Some(open) = open_attempt_for(&tx, &claim.agent_id)? {
        return Err(DbError::AttemptInProgress(open.attempt_id));
    }

    let attempt_id = new_id();
    tx.execute(
        "INSERT INTO pending_mints
            (attempt_id, agent_id, network, recipient, metadata_uri, image_uri, mood,
             status, claimed_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'claimed', ?8, ?8)",
        rusqlite::params![
            attempt_id,
            claim.agent_id,
            claim.network.as_str(),
            claim.recipient,
            claim.metadata_uri,
            claim.image_uri,
            claim.mood,
            now as i64,
        ],
    )
    .map_err(|e| {
        if is_constraint(&e) {
            DbError::AttemptInProgress(claim.agent_id.clone())
        } else {
            DbError::Sqlite(e)
        }
    })?;

    let pending = get_attempt(&tx, &attempt_id)?
        .ok_or_else(|| DbError::NotFound(format!("attempt {attempt_id}")))?;
    tx.commit()?;

    tracing::debug!(agent = %claim.agent_id, attempt = %attempt_id, "mint claim taken");
    Ok(pending)
}

/// Record the broadcast transaction hash.
pub fn mark_submitted(conn: &Connection, attempt_id: &str, tx_hash: &str, now: u64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE pending_mints SET status = 'submitted', tx_hash = ?2, updated_at = ?3
         WHERE attempt_id = ?1 AND status = 'claimed'",
        rusqlite::params![attempt_id, tx_hash, now as i64],
    )?;
    expect_transition(changed, attempt_id, "submitted")
}

/// Record that the transaction was confirmed on chain.
pub fn mark_confirmed(
    conn: &Connection,
    attempt_id: &str,
    tx_hash: &str,
    token_id: Option<u64>,
    minted_at: Option<u64>,
    now: u64,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE pending_mints
         SET status = 'confirmed', tx_hash = ?2, token_id = ?3,
             minted_at = COALESCE(?4, minted_at), updated_at = ?5
         WHERE attempt_id = ?1 AND status IN ('claimed', 'submitted')",
        rusqlite::params![
            attempt_id,
            tx_hash,
            token_id.map(|t| t as i64),
            minted_at.map(|t| t as i64),
            now as i64
        ],
    )?;
    expect_transition(changed, attempt_id, "confirmed")
}

/// Give the claim back. Only valid while nothing reached the chain.
pub fn release(conn: &Connection, attempt_id: &str, reason: &str, now: u64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE pending_mints SET status = 'released', last_error = ?2, updated_at = ?3
         WHERE attempt_id = ?1 AND status IN ('claimed', 'submitted')",
        rusqlite::params![attempt_id, reason, now as i64],
    )?;
    expect_transition(changed, attempt_id, "released")
}

/// Park an attempt whose chain state cannot be matched to the journal.
pub fn mark_orphaned(conn: &Connection, attempt_id: &str, reason: &str, now: u64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE pending_mints SET status = 'orphaned', last_error = ?2, updated_at = ?3
         WHERE attempt_id = ?1 AND status IN ('claimed', 'submitted', 'confirmed')",
        rusqlite::params![attempt_id, reason, now as i64],
    )?;
    expect_transition(changed, attempt_id, "orphaned")
}

/// Note an error against an open attempt without changing its status.
pub fn note_error(conn: &Connection, attempt_id: &str, reason: &str, now: u64) -> Result<()> {
    conn.execute(
        "UPDATE pending_mints SET last_error = ?2, updated_at = ?3 WHERE attempt_id = ?1",
        rusqlite::params![attempt_id, reason, now as i64],
    )?;
    Ok(())
}

/// Record a confirmed mint and advance the agent's cooldown to its
/// `minted_at`.
///
/// Idempotent by transaction hash: committing the same hash again returns
/// the existing record and leaves the agent untouched. `now` only stamps
/// the journal row.
pub fn commit(conn: &mut Connection, commit: &MintCommit, now: u64) -> Result<NftRecord> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if let Some(existing) = nfts::get_by_tx_hash(&tx, &commit.tx_hash)? {
        if let Some(attempt_id) = &commit.attempt_id {
            close_recorded(&tx, attempt_id, existing.token_id, now)?;
        }
        tx.commit()?;
        tracing::debug!(tx_hash = %commit.tx_hash, "mint already recorded");
        return Ok(existing);
    }

    let pending = match &commit.attempt_id {
        Some(attempt_id) => get_attempt(&tx, attempt_id)?,
        None => None,
    };
    let mood = commit
        .mood
        .clone()
        .or_else(|| pending.as_ref().and_then(|p| p.mood.clone()));

    let nft = NftRecord {
        id: new_id(),
        agent_id: commit.agent_id.clone(),
        network: commit.network,
        token_id: commit.token_id,
        image_cid: commit.image_cid.clone(),
        metadata_cid: commit.metadata_cid.clone(),
        tx_hash: commit.tx_hash.clone(),
        mood,
        minted_at: commit.minted_at,
    };

    tx.execute(
        "INSERT INTO nfts (id, agent_id, network, token_id, image_cid, metadata_cid, tx_hash, mood, minted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            nft.id,
            nft.agent_id,
            nft.network.as_str(),
            nft.token_id.map(|t| t as i64),
            nft.image_cid.as_ref().map(ContentId::as_str),
            nft.metadata_cid.as_str(),
            nft.tx_hash,
            nft.mood,
            nft.minted_at as i64,
        ],
    )?;

    let changed = tx.execute(
        "UPDATE agents
         SET last_mint_at = MAX(COALESCE(last_mint_at, 0), ?2),
             total_mints = total_mints + 1
         WHERE id = ?1",
        rusqlite::params![commit.agent_id, commit.minted_at as i64],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("agent {}", commit.agent_id)));
    }

    if let Some(attempt_id) = &commit.attempt_id {
        close_recorded(&tx, attempt_id, commit.token_id, now)?;
    }

    tx.commit()?;
    tracing::info!(
        agent = %nft.agent_id,
        nft = %nft.id,
        tx_hash = %nft.tx_hash,
        token_id = ?nft.token_id,
        "mint recorded"
    );
    Ok(nft)
}

/// Fill in a token id that was unknown at commit time.
pub fn backfill_token_id(conn: &Connection, nft_id: &str, token_id: u64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE nfts SET token_id = ?2 WHERE id = ?1 AND token_id IS NULL",
        rusqlite::params![nft_id, token_id as i64],
    )?;
    Ok(changed == 1)
}

/// Look up a journal row.
pub fn get_attempt(conn: &Connection, attempt_id: &str) -> Result<Option<PendingMint>> {
    let pending = conn
        .query_row(
            &format!("SELECT {PENDING_COLUMNS} FROM pending_mints WHERE attempt_id = ?1"),
            [attempt_id],
            pending_from_row,
        )
        .optional()?;
    Ok(pending)
}

/// The open attempt of an agent, if any.
pub fn open_attempt_for(conn: &Connection, agent_id: &str) -> Result<Option<PendingMint>> {
    let pending = conn
        .query_row(
            &format!(
                "SELECT {PENDING_COLUMNS} FROM pending_mints
                 WHERE agent_id = ?1 AND status IN ('claimed', 'submitted', 'confirmed')"
            ),
            [agent_id],
            pending_from_row,
        )
        .optional()?;
    Ok(pending)
}

/// All open attempts, oldest first.
pub fn open_attempts(conn: &Connection) -> Result<Vec<PendingMint>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PENDING_COLUMNS} FROM pending_mints
         WHERE status IN ('claimed', 'submitted', 'confirmed')
         ORDER BY claimed_at ASC"
    ))?;
    let rows = stmt
        .query_map([], pending_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Open and orphaned attempts of one agent, newest first.
pub fn attempts_for_agent(conn: &Connection, agent_id: &str) -> Result<Vec<PendingMint>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PENDING_COLUMNS} FROM pending_mints
         WHERE agent_id = ?1 AND status IN ('claimed', 'submitted', 'confirmed', 'orphaned')
         ORDER BY claimed_at DESC"
    ))?;
    let rows = stmt
        .query_map([agent_id], pending_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Attempts that need a human, newest first.
pub fn orphaned_attempts(conn: &Connection) -> Result<Vec<PendingMint>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PENDING_COLUMNS} FROM pending_mints WHERE status = 'orphaned'
         ORDER BY updated_at DESC"
    ))?;
    let rows = stmt
        .query_map([], pending_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn close_recorded(conn: &Connection, attempt_id: &str, token_id: Option<u64>, now: u64) -> Result<()> {
    conn.execute(
        "UPDATE pending_mints
         SET status = 'recorded', token_id = COALESCE(?2, token_id), updated_at = ?3
         WHERE attempt_id = ?1 AND status IN ('claimed', 'submitted', 'confirmed')",
        rusqlite::params![attempt_id, token_id.map(|t| t as i64), now as i64],
    )?;
    Ok(())
}

fn expect_transition(changed: usize, attempt_id: &str, to: &str) -> Result<()> {
    if changed == 0 {
        return Err(DbError::Constraint(format!(
            "attempt {attempt_id} cannot move to {to}"
        )));
    }
    Ok(())
}

fn pending_from_row(row: &Row<'_>) -> rusqlite::Result<PendingMint> {
    let status: String = row.get(7)?;
    Ok(PendingMint {
        attempt_id: row.get(0)?,
        agent_id: row.get(1)?,
        network: parse_column(2, row.get(2)?)?,
        recipient: row.get(3)?,
        metadata_uri: row.get(4)?,
        image_uri: row.get(5)?,
        mood: row.get(6)?,
        status: PendingStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(7, "status".into(), rusqlite::types::Type::Text)
        })?,
        tx_hash: row.get(8)?,
        token_id: row.get::<_, Option<i64>>(9)?.map(|t| t as u64),
        minted_at: row.get::<_, Option<i64>>(10)?.map(|t| t as u64),
        claimed_at: row.get::<_, i64>(11)? as u64,
        updated_at: row.get::<_, i64>(12)? as u64,
        last_error: row.get(13)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::agents::{self, tests::new_agent};

    const T0: u64 = 1_700_000_000;

    fn setup() -> Connection {
        let conn = crate::open_memory().expect("open");
        agents::insert(&conn, &new_agent("a1", "molty")).expect("insert agent");
        conn
    }

    fn mint_claim() -> MintClaim {
        MintClaim {
            agent_id: "a1".into(),
            network: Network::Testnet,
            recipient: "0x0000000000000000000000000000000000006131".into(),
            metadata_uri: "ipfs://QmMeta".into(),
            image_uri: Some("ipfs://QmImage".into()),
            mood: Some("calm".into()),
        }
    }

    fn full_mint(conn: &mut Connection, tx_hash: &str, token_id: Option<u64>, now: u64) -> NftRecord {
        let pending = claim(conn, &mint_claim(), now).expect("claim");
        mark_submitted(conn, &pending.attempt_id, tx_hash, now).expect("submitted");
        mark_confirmed(conn, &pending.attempt_id, tx_hash, token_id, Some(now), now).expect("confirmed");
        let data = MintCommit::from_pending(&pending, tx_hash, token_id, now).expect("commit data");
        commit(conn, &data, now).expect("commit")
    }

    #[test]
    fn test_full_lifecycle() {
        let mut conn = setup();
        let nft = full_mint(&mut conn, "0xabc", Some(7), T0);

        assert_eq!(nft.token_id, Some(7));
        assert_eq!(nft.metadata_cid.as_str(), "QmMeta");
        assert_eq!(nft.image_cid.as_ref().map(ContentId::as_str), Some("QmImage"));
        assert_eq!(nft.mood.as_deref(), Some("calm"));

        let agent = agents::get(&conn, "a1").expect("get").expect("agent");
        assert_eq!(agent.total_mints, 1);
        assert_eq!(agent.last_mint_at, Some(T0));
        assert!(open_attempt_for(&conn, "a1").expect("open").is_none());
    }

    #[test]
    fn test_claim_rejected_during_cooldown() {
        let mut conn = setup();
        full_mint(&mut conn, "0xabc", Some(1), T0);

        let err = claim(&mut conn, &mint_claim(), T0 + 3_600).expect_err("cooldown");
        assert!(
            matches!(
                err,
                DbError::Cooldown {
                    remaining_secs,
                    next_eligible_at,
                } if remaining_secs == COOLDOWN_SECS - 3_600 && next_eligible_at == T0 + COOLDOWN_SECS
            ),
            "unexpected error: {err}"
        );

        claim(&mut conn, &mint_claim(), T0 + COOLDOWN_SECS).expect("eligible after 24h");
    }

    #[test]
    fn test_second_claim_while_open() {
        let mut conn = setup();
        let first = claim(&mut conn, &mint_claim(), T0).expect("claim");
        let err = claim(&mut conn, &mint_claim(), T0).expect_err("in progress");
        assert!(matches!(err, DbError::AttemptInProgress(id) if id == first.attempt_id));
    }

    #[test]
    fn test_release_frees_claim() {
        let mut conn = setup();
        let first = claim(&mut conn, &mint_claim(), T0).expect("claim");
        release(&conn, &first.attempt_id, "generation failed", T0).expect("release");

        let released = get_attempt(&conn, &first.attempt_id).expect("get").expect("row");
        assert_eq!(released.status, PendingStatus::Released);
        assert_eq!(released.last_error.as_deref(), Some("generation failed"));

        claim(&mut conn, &mint_claim(), T0 + 1).expect("claim again");
    }

    #[test]
    fn test_confirmed_cannot_be_released() {
        let mut conn = setup();
        let pending = claim(&mut conn, &mint_claim(), T0).expect("claim");
        mark_confirmed(&conn, &pending.attempt_id, "0xabc", None, None, T0).expect("confirm");
        assert!(matches!(
            release(&conn, &pending.attempt_id, "nope", T0),
            Err(DbError::Constraint(_))
        ));
    }

    #[test]
    fn test_commit_idempotent_by_tx_hash() {
        let mut conn = setup();
        let nft = full_mint(&mut conn, "0xabc", Some(3), T0);

        let again = MintCommit {
            attempt_id: None,
            agent_id: "a1".into(),
            network: Network::Testnet,
            token_id: Some(3),
            image_cid: None,
            metadata_cid: ContentId::new("QmMeta"),
            tx_hash: "0xabc".into(),
            mood: None,
            minted_at: T0 + 10,
        };
        let second = commit(&mut conn, &again, T0 + 10).expect("second commit");
        assert_eq!(second.id, nft.id);

        let agent = agents::get(&conn, "a1").expect("get").expect("agent");
        assert_eq!(agent.total_mints, 1);
        assert_eq!(agent.last_mint_at, Some(T0));
    }

    #[test]
    fn test_last_mint_at_never_decreases() {
        let mut conn = setup();
        full_mint(&mut conn, "0x01", None, T0 + 100);

        let late = MintCommit {
            attempt_id: None,
            agent_id: "a1".into(),
            network: Network::Testnet,
            token_id: None,
            image_cid: None,
            metadata_cid: ContentId::new("QmOld"),
            tx_hash: "0x02".into(),
            mood: None,
            minted_at: T0,
        };
        commit(&mut conn, &late, T0 + 500).expect("commit");

        let agent = agents::get(&conn, "a1").expect("get").expect("agent");
        assert_eq!(agent.last_mint_at, Some(T0 + 100));
        assert_eq!(agent.total_mints, 2);
    }

    #[test]
    fn test_orphan_blocks_cooldown() {
        let mut conn = setup();
        let pending = claim(&mut conn, &mint_claim(), T0).expect("claim");
        mark_orphaned(&conn, &pending.attempt_id, "chain ahead", T0 + 60).expect("orphan");

        assert!(matches!(
            claim(&mut conn, &mint_claim(), T0 + 120),
            Err(DbError::Cooldown { .. })
        ));
        assert_eq!(orphaned_attempts(&conn).expect("orphans").len(), 1);
    }

    #[test]
    fn test_backfill_token_id() {
        let mut conn = setup();
        let nft = full_mint(&mut conn, "0xabc", None, T0);
        assert!(backfill_token_id(&conn, &nft.id, 42).expect("backfill"));
        assert!(!backfill_token_id(&conn, &nft.id, 43).expect("second backfill is a no-op"));

        let stored = nfts::get(&conn, &nft.id).expect("get").expect("nft");
        assert_eq!(stored.token_id, Some(42));
    }

    #[test]
    fn test_commit_uses_chain_time_and_mood() {
        let mut conn = setup();
        let pending = claim(&mut conn, &mint_claim(), T0).expect("claim");
        mark_submitted(&conn, &pending.attempt_id, "0xabc", T0).expect("submitted");
        mark_confirmed(&conn, &pending.attempt_id, "0xabc", Some(5), Some(T0 + 30), T0 + 900)
            .expect("confirmed");

        let confirmed = get_attempt(&conn, &pending.attempt_id).expect("get").expect("row");
        assert_eq!(confirmed.minted_at, Some(T0 + 30));

        let mut data = MintCommit::from_pending(&confirmed, "0xabc", Some(5), T0 + 30).expect("data");
        assert_eq!(data.mood.as_deref(), Some("calm"));
        data.mood = Some("electric".into());
        let nft = commit(&mut conn, &data, T0 + 3_600).expect("commit");

        assert_eq!(nft.minted_at, T0 + 30);
        assert_eq!(nft.mood.as_deref(), Some("electric"));
        let agent = agents::get(&conn, "a1").expect("get").expect("agent");
        assert_eq!(agent.last_mint_at, Some(T0 + 30));
    }

    #[test]
    fn test_cooldown_anchor() {
        let mut conn = setup();
        assert_eq!(cooldown_anchor(&conn, "a1").expect("anchor"), None);

        full_mint(&mut conn, "0x01", Some(1), T0);
        assert_eq!(cooldown_anchor(&conn, "a1").expect("anchor"), Some(T0));

        let later = claim(&mut conn, &mint_claim(), T0 + COOLDOWN_SECS).expect("claim");
        mark_orphaned(&conn, &later.attempt_id, "chain ahead", T0 + COOLDOWN_SECS + 60).expect("orphan");
        assert_eq!(cooldown_anchor(&conn, "a1").expect("anchor"), Some(T0 + COOLDOWN_SECS));
        assert!(matches!(cooldown_anchor(&conn, "ghost"), Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_attempts_for_agent() {
        let mut conn = setup();
        agents::insert(&conn, &new_agent("a2", "other")).expect("insert agent");
        let first = claim(&mut conn, &mint_claim(), T0).expect("claim");
        mark_orphaned(&conn, &first.attempt_id, "chain ahead", T0).expect("orphan");

        let mut other = mint_claim();
        other.agent_id = "a2".into();
        other.recipient = "0x0000000000000000000000000000000000006132".into();
        claim(&mut conn, &other, T0).expect("other claim");

        let rows = attempts_for_agent(&conn, "a1").expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, PendingStatus::Orphaned);
    }

    #[test]
    fn test_unknown_agent() {
        let mut conn = setup();
        let mut ghost = mint_claim();
        ghost.agent_id = "ghost".into();
        assert!(matches!(claim(&mut conn, &ghost, T0), Err(DbError::NotFound(_))));
    }
}

//! Minting command handlers: eligibility, the daily molt, external
//! submissions and reconciliation.

use std::str::FromStr;
use std::sync::Arc;

use molt_db::ledger::mint as journal;
use molt_db::queries::{agents, nfts};
use molt_pipeline::{
    check_eligibility, Announcement, MoltRequest, Outcome, PreparedMint,
};
use molt_types::time::iso_datetime;
use molt_types::{Network, NftRecord, Submint};
use serde_json::Value;
use tracing::{info, warn};

use super::agents::Caller;
use super::social::post_json;
use super::{attempt_failure, db_error, optional_str, required_str};
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

fn network_param(params: &Value) -> std::result::Result<Option<Network>, RpcError> {
    optional_str(params, "network")
        .map(|n| Network::from_str(n).map_err(|e| RpcError::invalid_params(&e.to_string())))
        .transpose()
}

pub(crate) fn nft_json(nft: &NftRecord, gateway: &str) -> Value {
    serde_json::json!({
        "id": nft.id,
        "agentId": nft.agent_id,
        "network": nft.network,
        "tokenId": nft.token_id,
        "metadataUri": nft.metadata_uri(),
        "imageUri": nft.image_uri(),
        "imageUrl": nft.image_cid.as_ref().map(|cid| cid.gateway_url(gateway)),
        "txHash": nft.tx_hash,
        "mood": nft.mood,
        "mintedAt": iso_datetime(nft.minted_at),
    })
}

fn outcome_json(outcome: &Outcome, gateway: &str) -> Value {
    let report = outcome.report();
    let nft = match &report.nft {
        Some(nft) => nft_json(nft, gateway),
        // Minted but not yet recorded.
        None => serde_json::json!({
            "id": null,
            "network": report.network,
            "tokenId": report.confirmation.token_id,
            "metadataUri": report.metadata_uri,
            "imageUri": report.image_uri,
            "txHash": report.confirmation.tx_hash,
            "mintedAt": null,
        }),
    };
    let mut body = serde_json::json!({
        "outcome": "success",
        "stage": report.stage,
        "attemptId": report.attempt_id,
        "network": report.network,
        "nft": nft,
        "post": report.post.as_ref().map(post_json),
        "explorerUrl": report.explorer_url,
        "marketplaceUrl": report.marketplace_url,
    });
    if let Outcome::PartialSuccess { lagging, error, .. } = outcome {
        body["outcome"] = Value::from("partial_success");
        body["lagging"] = serde_json::json!(lagging);
        body["error"] = Value::from(error.as_str());
    }
    body
}

/// Cooldown state of an agent, addressed by id or handle.
pub async fn mint_status(state: &Arc<DaemonState>, params: &Value) -> Result {
    let reference = required_str(params, "agent")?;
    let (agent, anchor, open) = {
        let db = state.db.lock().await;
        let agent = agents::resolve(&db, reference).map_err(db_error)?;
        let anchor = journal::cooldown_anchor(&db, &agent.id).map_err(db_error)?;
        let open = journal::open_attempt_for(&db, &agent.id).map_err(db_error)?;
        (agent, anchor, open)
    };
    let eligibility = check_eligibility(anchor, state.clock.now());

    Ok(serde_json::json!({
        "agent": agent.handle,
        "canMint": eligibility.can_mint && open.is_none(),
        "attemptInProgress": open.map(|attempt| attempt.attempt_id),
        "hoursRemaining": eligibility.hours_remaining(),
        "nextMintAt": eligibility.next_eligible_at.map(iso_datetime),
        "totalMints": agent.total_mints,
        "lastMintAt": agent.last_mint_at.map(iso_datetime),
    }))
}

/// Mint metadata the caller already generated and pinned.
pub async fn submit_mint(state: &Arc<DaemonState>, caller: &Caller, params: &Value) -> Result {
    let prepared = PreparedMint {
        metadata_uri: required_str(params, "metadataUri")?.to_string(),
        image_uri: optional_str(params, "imageUri").map(str::to_string),
        mood: optional_str(params, "mood").map(str::to_string),
        network: network_param(params)?,
    };

    info!(agent = %caller.handle, uri = %prepared.metadata_uri, "mint submitted");
    let outcome = state
        .orchestrator
        .submit_prepared(&caller.agent_id, prepared)
        .await
        .map_err(|failure| {
            warn!(agent = %caller.handle, stage = ?failure.stage, error = %failure.error, "mint failed");
            attempt_failure(&failure)
        })?;
    Ok(outcome_json(&outcome, &state.config.content.gateway))
}

/// Run the whole pipeline for the caller: generate, pin, mint, record and
/// optionally announce.
pub async fn daily_molt(state: &Arc<DaemonState>, caller: &Caller, params: &Value) -> Result {
    let mood = required_str(params, "mood")?;
    let submint = optional_str(params, "submint")
        .map(|s| Submint::from_str(s).map_err(|e| RpcError::invalid_params(&e.to_string())))
        .transpose()?;
    let announce = params
        .get("announce")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    let mut request = MoltRequest::new(mood);
    request.context = optional_str(params, "context").map(str::to_string);
    request.style = optional_str(params, "style").map(str::to_string);
    request.network = network_param(params)?;
    if announce {
        request = request.announced(Announcement {
            submint: submint.unwrap_or_default(),
            title: optional_str(params, "title").map(str::to_string),
        });
    }

    info!(agent = %caller.handle, "daily molt started");
    let outcome = state
        .orchestrator
        .run(&caller.agent_id, request)
        .await
        .map_err(|failure| {
            warn!(agent = %caller.handle, stage = ?failure.stage, error = %failure.error, "daily molt failed");
            attempt_failure(&failure)
        })?;
    Ok(outcome_json(&outcome, &state.config.content.gateway))
}

/// Recorded mints of an agent, oldest first.
pub async fn list_agent_nfts(state: &Arc<DaemonState>, params: &Value) -> Result {
    let reference = required_str(params, "agent")?;
    let network = network_param(params)?;
    let db = state.db.lock().await;
    let agent = agents::resolve(&db, reference).map_err(db_error)?;
    let records = match network {
        Some(network) => nfts::list_by_agent_network(&db, &agent.id, network),
        None => nfts::list_by_agent(&db, &agent.id),
    }
    .map_err(db_error)?;

    let gateway = &state.config.content.gateway;
    let items: Vec<Value> = records.iter().map(|nft| nft_json(nft, gateway)).collect();
    Ok(serde_json::json!({
        "agent": agent.handle,
        "count": items.len(),
        "nfts": items,
    }))
}

/// The caller's open and orphaned journal rows, newest first.
pub async fn list_pending_mints(state: &Arc<DaemonState>, caller: &Caller) -> Result {
    let db = state.db.lock().await;
    let attempts = journal::attempts_for_agent(&db, &caller.agent_id).map_err(db_error)?;
    Ok(serde_json::json!({
        "agent": caller.handle,
        "attempts": attempts,
    }))
}

/// Open and orphaned journal rows of every agent.
pub async fn list_all_pending_mints(state: &Arc<DaemonState>) -> Result {
    let db = state.db.lock().await;
    let open = journal::open_attempts(&db).map_err(db_error)?;
    let orphaned = journal::orphaned_attempts(&db).map_err(db_error)?;
    Ok(serde_json::json!({
        "open": open,
        "orphaned": orphaned,
    }))
}

/// Run one reconciliation pass now.
pub async fn reconcile_now(state: &Arc<DaemonState>) -> Result {
    let report = state
        .reconciler
        .run_once(state.clock.now())
        .await
        .map_err(|e| RpcError::internal_error(&format!("reconciliation failed: {e}")))?;
    serde_json::to_value(report).map_err(|e| RpcError::internal_error(&e.to_string()))
}

//! Agent registration, login and session command handlers.

use std::sync::Arc;

use molt_chain::AgentWallet;
use molt_crypto::{api_key, session};
use molt_db::queries::agents::{self, NewAgent};
use molt_types::Agent;
use serde_json::Value;
use tracing::{info, warn};

use super::{db_error, optional_str, required_str};
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

const MAX_HANDLE_LEN: usize = 64;

/// The agent a session token belongs to.
#[derive(Debug, Clone)]
pub struct Caller {
    pub agent_id: String,
    pub handle: String,
}

/// Resolve the `auth` field of a request into a caller.
pub fn authenticate(
    state: &DaemonState,
    auth: Option<&str>,
) -> std::result::Result<Caller, RpcError> {
    let token = auth
        .map(session::strip_bearer)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RpcError::unauthorized("no token provided"))?;
    let claims = state
        .sessions
        .verify(token)
        .map_err(|e| RpcError::unauthorized(&e.to_string()))?;
    Ok(Caller {
        agent_id: claims.sub,
        handle: claims.handle,
    })
}

/// Check an operator token against the configured hash.
pub fn authenticate_operator(
    state: &DaemonState,
    auth: Option<&str>,
) -> std::result::Result<(), RpcError> {
    let Some(stored_hash) = state.operator_key_hash.as_deref() else {
        return Err(RpcError::not_configured("operator token"));
    };
    let token = auth
        .map(session::strip_bearer)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RpcError::unauthorized("no token provided"))?;
    match api_key::verify(token, stored_hash) {
        Ok(true) => Ok(()),
        Ok(false) => Err(RpcError::unauthorized("invalid operator token")),
        Err(e) => {
            warn!(error = %e, "operator token check failed");
            Err(RpcError::unauthorized("invalid operator token"))
        }
    }
}

fn validate_handle(handle: &str) -> std::result::Result<(), RpcError> {
    if handle.chars().count() > MAX_HANDLE_LEN {
        return Err(RpcError::invalid_params(&format!(
            "handle exceeds {MAX_HANDLE_LEN} characters"
        )));
    }
    if !handle
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(RpcError::invalid_params(
            "handle may contain only letters, digits, '_' and '-'",
        ));
    }
    Ok(())
}

fn agent_profile(agent: &Agent) -> Value {
    serde_json::json!({
        "id": agent.id,
        "handle": agent.handle,
        "displayName": agent.display_name,
        "bio": agent.bio,
        "walletAddress": agent.wallet_address,
        "createdAt": agent.created_at,
        "lastMintAt": agent.last_mint_at,
        "totalMints": agent.total_mints,
    })
}

/// Register an agent with a fresh custodial wallet and API key.
///
/// The wallet private key and API key appear in this response only.
pub async fn register_agent(state: &Arc<DaemonState>, params: &Value) -> Result {
    let handle = required_str(params, "handle")?;
    validate_handle(handle)?;
    let display_name = optional_str(params, "displayName").unwrap_or(handle);
    let bio = optional_str(params, "bio").map(str::to_string);

    let wallet = AgentWallet::generate();
    let key = api_key::generate();
    let api_key_hash = api_key::hash(&key)
        .map_err(|e| RpcError::internal_error(&format!("key hashing failed: {e}")))?;
    let now = state.clock.now();

    let new_agent = NewAgent {
        id: uuid::Uuid::new_v4().to_string(),
        handle: handle.to_string(),
        display_name: display_name.to_string(),
        bio,
        wallet_address: wallet.address.clone(),
        api_key_hash,
        created_at: now,
    };
    let agent = {
        let db = state.db.lock().await;
        agents::insert(&db, &new_agent).map_err(db_error)?
    };
    let token = state
        .sessions
        .issue(&agent.id, &agent.handle, now)
        .map_err(|e| RpcError::internal_error(&format!("token issue failed: {e}")))?;

    info!(handle = %agent.handle, wallet = %agent.wallet_address, "agent registered");

    Ok(serde_json::json!({
        "agent": agent_profile(&agent),
        "credentials": {
            "apiKey": key.as_str(),
            "walletPrivateKey": wallet.private_key.as_str(),
            "token": token,
        },
        "warning": "Store the API key and wallet private key now. They cannot be retrieved again.",
    }))
}

/// Exchange handle and API key for a session token.
pub async fn login(state: &Arc<DaemonState>, params: &Value) -> Result {
    let handle = required_str(params, "handle")?;
    let key = required_str(params, "apiKey")?;

    let found = {
        let db = state.db.lock().await;
        agents::credentials_by_handle(&db, handle).map_err(db_error)?
    };
    let Some((agent, stored_hash)) = found else {
        return Err(RpcError::unauthorized("invalid credentials"));
    };
    let valid = api_key::verify(key, &stored_hash)
        .map_err(|e| RpcError::internal_error(&format!("key check failed: {e}")))?;
    if !valid {
        warn!(handle = %agent.handle, "login rejected");
        return Err(RpcError::unauthorized("invalid credentials"));
    }

    let token = state
        .sessions
        .issue(&agent.id, &agent.handle, state.clock.now())
        .map_err(|e| RpcError::internal_error(&format!("token issue failed: {e}")))?;
    Ok(serde_json::json!({
        "agent": agent_profile(&agent),
        "token": token,
    }))
}

/// Profile of the authenticated agent.
pub async fn verify_session(state: &Arc<DaemonState>, caller: &Caller) -> Result {
    let db = state.db.lock().await;
    let agent = agents::get(&db, &caller.agent_id)
        .map_err(db_error)?
        .ok_or_else(|| RpcError::not_found("agent not found"))?;
    Ok(serde_json::json!({ "agent": agent_profile(&agent) }))
}

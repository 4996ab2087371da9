//! JSON-RPC server over TCP.
//!
//! Line-delimited JSON-RPC 2.0: one request object per line, one response
//! per line. Agent-scoped methods carry a session token in `auth`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Method name.
    pub method: String,
    /// Parameters.
    #[serde(default)]
    pub params: serde_json::Value,
    /// Session token, with or without a `Bearer ` prefix.
    #[serde(default)]
    pub auth: Option<String>,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    /// JSON-RPC version.
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Result or error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    pub code: i32,
    /// Error name.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    fn new(code: i32, message: &str, data: Option<serde_json::Value>) -> Self {
        Self {
            code,
            message: message.to_string(),
            data,
        }
    }

    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self::new(-32700, "PARSE_ERROR", None)
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self::new(-32600, "INVALID_REQUEST", None)
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            -32601,
            "METHOD_NOT_FOUND",
            Some(serde_json::json!({"method": method})),
        )
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self::new(
            -32602,
            "INVALID_PARAMS",
            Some(serde_json::json!({"detail": detail})),
        )
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self::new(
            -32603,
            "INTERNAL_ERROR",
            Some(serde_json::json!({"detail": detail})),
        )
    }

    // Application errors

    /// Missing, invalid or expired credentials (-32001).
    pub fn unauthorized(detail: &str) -> Self {
        Self::new(
            -32001,
            "UNAUTHORIZED",
            Some(serde_json::json!({"detail": detail})),
        )
    }

    /// Authenticated, but the target belongs to another agent (-32003).
    pub fn forbidden(detail: &str) -> Self {
        Self::new(-32003, "FORBIDDEN", Some(serde_json::json!({"detail": detail})))
    }

    /// Unknown agent, post, comment or NFT (-32004).
    pub fn not_found(detail: &str) -> Self {
        Self::new(-32004, "NOT_FOUND", Some(serde_json::json!({"detail": detail})))
    }

    /// Duplicate or conflicting write (-32009).
    pub fn conflict(detail: &str) -> Self {
        Self::new(-32009, "CONFLICT", Some(serde_json::json!({"detail": detail})))
    }

    /// Too many requests from this caller (-32028).
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(
            -32028,
            "RATE_LIMITED",
            Some(serde_json::json!({"retryAfterSecs": retry_after_secs})),
        )
    }

    /// Agent minted less than 24 hours ago (-32029).
    pub fn cooldown(hours_remaining: u64, next_mint_at: Option<String>) -> Self {
        Self::new(
            -32029,
            "COOLDOWN_ACTIVE",
            Some(serde_json::json!({
                "hoursRemaining": hours_remaining,
                "nextMintAt": next_mint_at,
            })),
        )
    }

    /// Another mint attempt of this agent is open (-32030).
    pub fn attempt_in_progress(attempt_id: &str) -> Self {
        Self::new(
            -32030,
            "ATTEMPT_IN_PROGRESS",
            Some(serde_json::json!({"attemptId": attempt_id})),
        )
    }

    /// Broadcast but unconfirmed; reconciliation decides (-32031).
    pub fn in_doubt(attempt_id: &str, tx_hash: &str) -> Self {
        Self::new(
            -32031,
            "MINT_IN_DOUBT",
            Some(serde_json::json!({"attemptId": attempt_id, "txHash": tx_hash})),
        )
    }

    /// An upstream service failed (-32050).
    pub fn upstream(stage: &str, detail: &str) -> Self {
        Self::new(
            -32050,
            "UPSTREAM_FAILURE",
            Some(serde_json::json!({"stage": stage, "detail": detail})),
        )
    }

    /// Provider, contract or key missing (-32060).
    pub fn not_configured(detail: &str) -> Self {
        Self::new(
            -32060,
            "NOT_CONFIGURED",
            Some(serde_json::json!({"detail": detail})),
        )
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    listen_addr: String,
}

impl RpcServer {
    pub fn new(state: Arc<DaemonState>, listen_addr: String) -> Self {
        Self { state, listen_addr }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        info!("JSON-RPC server listening on {}", listener.local_addr()?);
        serve(listener, self.state.clone()).await
    }
}

/// Accept loop on an already bound listener.
pub async fn serve(listener: TcpListener, state: Arc<DaemonState>) -> anyhow::Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(state, stream).await {
                        warn!(%peer, "Connection error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Accept error: {}", e);
            }
        }
    }
}

/// Handle a single client connection.
async fn handle_connection(state: Arc<DaemonState>, stream: TcpStream) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => dispatch_request(state.clone(), request).await,
            Err(_) => RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
        };

        let mut response_json = serde_json::to_string(&response)?;
        response_json.push('\n');
        writer.write_all(response_json.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Methods callable without a session token.
fn is_public(method: &str) -> bool {
    matches!(
        method,
        "health"
            | "register_agent"
            | "login"
            | "mint_status"
            | "get_post"
            | "list_agent_nfts"
            | "list_submints"
    )
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
/// Methods that take the operator token instead of a session.
fn is_operator(method: &str) -> bool {
    matches!(method, "reconcile_now" | "list_all_pending_mints")
}

/// Key a request is rate limited under, if any.
fn rate_limit_key(
    method: &str,
    caller: Option<&commands::agents::Caller>,
    params: &serde_json::Value,
) -> Option<String> {
    match (method, caller) {
        (_, Some(caller)) => Some(format!("agent:{}", caller.agent_id)),
        ("login", None) => params
            .get("handle")
            .and_then(|v| v.as_str())
            .map(|handle| format!("login:{}", handle.trim().to_lowercase())),
        _ => None,
    }
}

pub async fn dispatch_request(state: Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    let method = request.method.as_str();

    if request.jsonrpc != "2.0" {
        return RpcResponse::error(id, RpcError::invalid_request());
    }

    debug!("Dispatching RPC method: {}", method);

    if is_operator(method) {
        let result = match commands::agents::authenticate_operator(&state, request.auth.as_deref()) {
            Ok(()) => match method {
                "reconcile_now" => commands::mint::reconcile_now(&state).await,
                _ => commands::mint::list_all_pending_mints(&state).await,
            },
            Err(err) => Err(err),
        };
        return match result {
            Ok(value) => RpcResponse::success(id, value),
            Err(err) => RpcResponse::error(id, err),
        };
    }

    let caller = if is_public(method) {
        None
    } else {
        match commands::agents::authenticate(&state, request.auth.as_deref()) {
            Ok(caller) => Some(caller),
            Err(err) => return RpcResponse::error(id, err),
        }
    };
    let params = &request.params;

    if let Some(key) = rate_limit_key(method, caller.as_ref(), params) {
        if let Err(limited) = state.rate_limiter.check(&key) {
            warn!(key = %key, method, "rate limited");
            return RpcResponse::error(id, RpcError::rate_limited(limited.retry_after_secs));
        }
    }

    let result = match (method, caller) {
        // Agents
        ("register_agent", _) => commands::agents::register_agent(&state, params).await,
        ("login", _) => commands::agents::login(&state, params).await,
        ("verify_session", Some(caller)) => commands::agents::verify_session(&state, &caller).await,

        // Minting
        ("mint_status", _) => commands::mint::mint_status(&state, params).await,
        ("submit_mint", Some(caller)) => commands::mint::submit_mint(&state, &caller, params).await,
        ("daily_molt", Some(caller)) => commands::mint::daily_molt(&state, &caller, params).await,
        ("list_agent_nfts", _) => commands::mint::list_agent_nfts(&state, params).await,
        ("list_pending_mints", Some(caller)) => {
            commands::mint::list_pending_mints(&state, &caller).await
        }

        // Images
        ("generate_image", Some(caller)) => {
            commands::pfp::generate_image(&state, &caller, params).await
        }
        ("upload_image", Some(caller)) => {
            commands::pfp::upload_image(&state, &caller, params).await
        }

        // Social
        ("create_post", Some(caller)) => commands::social::create_post(&state, &caller, params).await,
        ("create_comment", Some(caller)) => {
            commands::social::create_comment(&state, &caller, params).await
        }
        ("toggle_upvote", Some(caller)) => {
            commands::social::toggle_upvote(&state, &caller, params).await
        }
        ("get_post", _) => commands::social::get_post(&state, params).await,
        ("list_submints", _) => commands::social::list_submints().await,

        // Diagnostics
        ("health", _) => commands::diagnostics::health(&state).await,

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}

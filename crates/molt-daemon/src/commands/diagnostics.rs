//! Diagnostics command handlers.

use std::sync::Arc;

use molt_types::time::iso_datetime;
use serde_json::Value;

use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Liveness plus the networks minting is enabled on.
pub async fn health(state: &Arc<DaemonState>) -> Result {
    let database = {
        let db = state.db.lock().await;
        db.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok()
    };
    let networks: Vec<&str> = state
        .orchestrator
        .relayers()
        .networks()
        .into_iter()
        .map(|n| n.as_str())
        .collect();

    Ok(serde_json::json!({
        "status": if database { "ok" } else { "degraded" },
        "service": "molt-daemon",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": iso_datetime(state.clock.now()),
        "networks": networks,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support;

    #[tokio::test]
    async fn test_health() {
        let (state, _clock) = test_support::state();
        let result = health(&state).await.expect("health");
        assert_eq!(result["status"], "ok");
        assert_eq!(result["service"], "molt-daemon");
        assert_eq!(result["timestamp"], "2023-11-14T22:13:20Z");
        assert_eq!(result["networks"].as_array().map(Vec::len), Some(2));
    }
}

//! RPC command handlers.
//!
//! Each submodule implements the commands for one RPC category.

pub mod agents;
pub mod diagnostics;
pub mod mint;
pub mod pfp;
pub mod social;

use molt_db::DbError;
use molt_pipeline::{AttemptFailure, PipelineError, Stage};
use molt_types::time::iso_datetime;
use serde_json::Value;

use crate::rpc::RpcError;

/// Required string parameter.
pub(crate) fn required_str<'a>(params: &'a Value, key: &str) -> std::result::Result<&'a str, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))
}

/// Optional string parameter; blank counts as absent.
pub(crate) fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub(crate) fn db_error(err: DbError) -> RpcError {
    match err {
        DbError::NotFound(what) => RpcError::not_found(&what),
        DbError::Constraint(detail) => RpcError::conflict(&detail),
        DbError::Invalid(detail) => RpcError::invalid_params(&detail),
        DbError::Forbidden(detail) => RpcError::forbidden(&detail),
        DbError::Cooldown {
            remaining_secs,
            next_eligible_at,
        } => RpcError::cooldown(
            remaining_secs.div_ceil(molt_types::SECS_PER_HOUR),
            Some(iso_datetime(next_eligible_at)),
        ),
        DbError::AttemptInProgress(id) => RpcError::attempt_in_progress(&id),
        other => RpcError::internal_error(&format!("db error: {other}")),
    }
}

pub(crate) fn pipeline_error(err: &PipelineError, stage: Stage) -> RpcError {
    let stage_name = serde_json::to_value(stage)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    match err {
        PipelineError::Cooldown {
            next_eligible_at, ..
        } => RpcError::cooldown(
            err.hours_remaining().unwrap_or_default(),
            Some(iso_datetime(*next_eligible_at)),
        ),
        PipelineError::AttemptInProgress(id) => RpcError::attempt_in_progress(id),
        PipelineError::InvalidInput(detail) => RpcError::invalid_params(detail),
        PipelineError::NotFound(what) => RpcError::not_found(what),
        PipelineError::InDoubt {
            attempt_id,
            tx_hash,
            ..
        } => RpcError::in_doubt(attempt_id, tx_hash),
        PipelineError::Ledger(e) => RpcError::internal_error(&format!("db error: {e}")),
        other => match other.kind() {
            molt_pipeline::ErrorKind::FatalConfiguration => RpcError::not_configured(&other.to_string()),
            _ => RpcError::upstream(&stage_name, &other.to_string()),
        },
    }
}

pub(crate) fn attempt_failure(failure: &AttemptFailure) -> RpcError {
    pipeline_error(&failure.error, failure.stage)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_mapping() {
        let err = db_error(DbError::Cooldown {
            remaining_secs: 23 * 3_600 + 1,
            next_eligible_at: 1_700_086_400,
        });
        assert_eq!(err.code, -32029);
        assert_eq!(err.data.expect("data")["hoursRemaining"], 24);
    }

    #[test]
    fn test_pipeline_mapping() {
        let err = pipeline_error(
            &PipelineError::NotConfigured("no generator".into()),
            Stage::Idle,
        );
        assert_eq!(err.code, -32060);

        let err = pipeline_error(
            &PipelineError::Storage(molt_storage::StoreError::Unavailable("503".into())),
            Stage::Generated,
        );
        assert_eq!(err.code, -32050);
        assert_eq!(err.data.expect("data")["stage"], "generated");
    }

    #[test]
    fn test_params() {
        let params = serde_json::json!({"mood": "  calm ", "blank": " "});
        assert_eq!(required_str(&params, "mood").expect("mood"), "calm");
        assert!(required_str(&params, "blank").is_err());
        assert_eq!(optional_str(&params, "missing"), None);
    }
}

//! # molt-pipeline
//!
//! The Daily Molt pipeline: eligibility, generation, publishing, the
//! relayed mint, the ledger commit and the optional announcement.
//!
//! ## Modules
//!
//! - [`eligibility`]: the 24 hour cooldown gate
//! - [`orchestrator`]: sequences one attempt and defines its failure contract
//! - [`reconcile`]: resolves journaled attempts against chain data

pub mod eligibility;
pub mod orchestrator;
pub mod reconcile;

use molt_chain::ChainError;
use molt_db::DbError;
use molt_imagegen::GenerationError;
use molt_storage::StoreError;
use molt_types::SECS_PER_HOUR;
use serde::Serialize;

pub use eligibility::{check_eligibility, Eligibility};
pub use orchestrator::{
    Announcement, AttemptFailure, Lagging, MoltReport, MoltRequest, Orchestrator, Outcome,
    PipelineConfig, PreparedMint, PublishedArtifacts, Stage,
};
pub use reconcile::{ReconcileReport, Reconciler};

/// How a caller should treat a pipeline error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Nothing happened; fix the input or wait.
    RejectedBeforeEffect,
    /// An upstream failed before anything reached the chain. Retry the attempt.
    Transient,
    /// Broadcast but unconfirmed. The claim stays open until reconciled.
    InDoubt,
    /// Minted on chain; a later write is lagging.
    PostCommit,
    /// Missing provider, contract address or relayer key.
    FatalConfiguration,
}

/// Pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("cooldown active for another {remaining_secs}s")]
    Cooldown {
        remaining_secs: u64,
        next_eligible_at: u64,
    },

    #[error("mint attempt {0} already in progress")]
    AttemptInProgress(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("publishing failed: {0}")]
    Storage(#[from] StoreError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// Broadcast, but confirmation could not be observed.
    #[error("transaction {tx_hash} in doubt: {reason}")]
    InDoubt {
        attempt_id: String,
        tx_hash: String,
        reason: String,
    },

    #[error("ledger error: {0}")]
    Ledger(DbError),

    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl From<DbError> for PipelineError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Cooldown {
                remaining_secs,
                next_eligible_at,
            } => PipelineError::Cooldown {
                remaining_secs,
                next_eligible_at,
            },
            DbError::AttemptInProgress(id) => PipelineError::AttemptInProgress(id),
            DbError::NotFound(what) => PipelineError::NotFound(what),
            DbError::Invalid(detail) | DbError::Forbidden(detail) => {
                PipelineError::InvalidInput(detail)
            }
            other => PipelineError::Ledger(other),
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Cooldown { .. }
            | PipelineError::AttemptInProgress(_)
            | PipelineError::InvalidInput(_)
            | PipelineError::NotFound(_) => ErrorKind::RejectedBeforeEffect,
            PipelineError::Generation(GenerationError::NotConfigured(_))
            | PipelineError::Storage(StoreError::NotConfigured(_))
            | PipelineError::Chain(ChainError::NotConfigured(_))
            | PipelineError::Chain(ChainError::Configuration(_))
            | PipelineError::NotConfigured(_) => ErrorKind::FatalConfiguration,
            PipelineError::Chain(ChainError::ConfirmationTimeout { .. })
            | PipelineError::InDoubt { .. } => ErrorKind::InDoubt,
            PipelineError::Generation(_)
            | PipelineError::Storage(_)
            | PipelineError::Chain(_)
            | PipelineError::Ledger(_) => ErrorKind::Transient,
        }
    }

    /// Whole hours until the cooldown ends, rounded up.
    pub fn hours_remaining(&self) -> Option<u64> {
        match self {
            PipelineError::Cooldown { remaining_secs, .. } => {
                Some(remaining_secs.div_ceil(SECS_PER_HOUR))
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_ledger_errors_map_to_rejections() {
        let err = PipelineError::from(DbError::Cooldown {
            remaining_secs: 3_601,
            next_eligible_at: 10,
        });
        assert_eq!(err.kind(), ErrorKind::RejectedBeforeEffect);
        assert_eq!(err.hours_remaining(), Some(2));

        let err = PipelineError::from(DbError::Forbidden("not yours".into()));
        assert!(matches!(err, PipelineError::InvalidInput(_)));

        let err = PipelineError::from(DbError::Migration("boom".into()));
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn test_configuration_errors_are_fatal() {
        let err = PipelineError::from(GenerationError::NotConfigured("no key".into()));
        assert_eq!(err.kind(), ErrorKind::FatalConfiguration);
        let err = PipelineError::from(ChainError::NotConfigured("mainnet".into()));
        assert_eq!(err.kind(), ErrorKind::FatalConfiguration);
    }

    #[test]
    fn test_upstream_failures() {
        let err = PipelineError::from(StoreError::Unavailable("503".into()));
        assert_eq!(err.kind(), ErrorKind::Transient);
        let err = PipelineError::from(ChainError::TransactionReverted("0x1".into()));
        assert_eq!(err.kind(), ErrorKind::Transient);
        let err = PipelineError::from(ChainError::ConfirmationTimeout {
            tx_hash: "0x1".into(),
            waited: Duration::from_secs(60),
        });
        assert_eq!(err.kind(), ErrorKind::InDoubt);
    }
}

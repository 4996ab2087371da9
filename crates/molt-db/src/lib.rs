//! # molt-db
//!
//! Database access layer for the Molt daemon.
//! Manages the single SQLite database at `$MOLT_DATA_DIR/molt.db`.
//!
//! ## Schema
//!
//! - WAL mode mandatory
//! - Foreign keys enforced
//! - All timestamps are Unix epoch seconds (u64)
//! - Schema version stored in `PRAGMA user_version`
//!
//! Plain reads live in [`queries`]. Anything that must change several rows
//! together (mint commits, counters) lives in [`ledger`] and runs inside a
//! single transaction.

pub mod ledger;
pub mod migrations;
pub mod queries;
pub mod schema;

use std::path::Path;
use std::str::FromStr;

use rusqlite::Connection;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The agent minted less than 24 hours ago.
    #[error("cooldown active for another {remaining_secs}s")]
    Cooldown {
        remaining_secs: u64,
        next_eligible_at: u64,
    },

    /// The agent already holds an open mint claim.
    #[error("mint attempt {0} already in progress")]
    AttemptInProgress(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the Molt database at the given path.
///
/// Configures WAL mode, foreign keys, and runs any pending migrations.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing).
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Configure SQLite pragmas.
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -8000;",
    )?;
    Ok(())
}

/// Fresh UUID v4 for a new row.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// True when SQLite rejected a write on a UNIQUE/CHECK/FK constraint.
pub(crate) fn is_constraint(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Parse a TEXT column into a domain enum inside a row mapper.
pub(crate) fn parse_column<T>(idx: usize, value: String) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

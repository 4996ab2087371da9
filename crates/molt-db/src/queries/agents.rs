//! Agent query functions.

use molt_types::Agent;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::{is_constraint, DbError, Result};

const AGENT_COLUMNS: &str =
    "id, handle, display_name, bio, wallet_address, created_at, last_mint_at, total_mints";

/// Fields supplied at registration.
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub id: String,
    pub handle: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub wallet_address: String,
    pub api_key_hash: String,
    pub created_at: u64,
}

/// Insert a new agent. Duplicate handles or wallets are a constraint error.
pub fn insert(conn: &Connection, agent: &NewAgent) -> Result<Agent> {
    conn.execute(
        "INSERT INTO agents (id, handle, display_name, bio, wallet_address, api_key_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            agent.id,
            agent.handle,
            agent.display_name,
            agent.bio,
            agent.wallet_address,
            agent.api_key_hash,
            agent.created_at as i64,
        ],
    )
    .map_err(|e| {
        if is_constraint(&e) {
            DbError::Constraint(format!("handle '{}' is already registered", agent.handle))
        } else {
            DbError::Sqlite(e)
        }
    })?;

    Ok(Agent {
        id: agent.id.clone(),
        handle: agent.handle.clone(),
        display_name: agent.display_name.clone(),
        bio: agent.bio.clone(),
        wallet_address: agent.wallet_address.clone(),
        created_at: agent.created_at,
        last_mint_at: None,
        total_mints: 0,
    })
}

/// Look up an agent by id.
pub fn get(conn: &Connection, id: &str) -> Result<Option<Agent>> {
    let agent = conn
        .query_row(
            &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
            [id],
            agent_from_row,
        )
        .optional()?;
    Ok(agent)
}

/// Look up an agent by handle.
pub fn get_by_handle(conn: &Connection, handle: &str) -> Result<Option<Agent>> {
    let agent = conn
        .query_row(
            &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE handle = ?1"),
            [handle],
            agent_from_row,
        )
        .optional()?;
    Ok(agent)
}

/// Resolve an agent reference that may be either an id or a handle.
pub fn resolve(conn: &Connection, reference: &str) -> Result<Agent> {
    if let Some(agent) = get(conn, reference)? {
        return Ok(agent);
    }
    get_by_handle(conn, reference)?
        .ok_or_else(|| DbError::NotFound(format!("agent {reference}")))
}

/// Agent plus its stored API key hash, for login.
pub fn credentials_by_handle(conn: &Connection, handle: &str) -> Result<Option<(Agent, String)>> {
    let row = conn
        .query_row(
            &format!("SELECT {AGENT_COLUMNS}, api_key_hash FROM agents WHERE handle = ?1"),
            [handle],
            |row| Ok((agent_from_row(row)?, row.get::<_, String>(8)?)),
        )
        .optional()?;
    Ok(row)
}

pub(crate) fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get(0)?,
        handle: row.get(1)?,
        display_name: row.get(2)?,
        bio: row.get(3)?,
        wallet_address: row.get(4)?,
        created_at: row.get::<_, i64>(5)? as u64,
        last_mint_at: row.get::<_, Option<i64>>(6)?.map(|t| t as u64),
        total_mints: row.get::<_, i64>(7)? as u64,
    })
}

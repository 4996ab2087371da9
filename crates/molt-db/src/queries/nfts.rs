//! NFT record reads. Writes go through [`crate::ledger::mint`].

use molt_types::{ContentId, Network, NftRecord};
use rusqlite::{Connection, OptionalExtension, Row};

use crate::{parse_column, Result};

pub(crate) const NFT_COLUMNS: &str =
    "id, agent_id, network, token_id, image_cid, metadata_cid, tx_hash, mood, minted_at";

/// Look up a record by id.
pub fn get(conn: &Connection, id: &str) -> Result<Option<NftRecord>> {
    let nft = conn
        .query_row(
            &format!("SELECT {NFT_COLUMNS} FROM nfts WHERE id = ?1"),
            [id],
            nft_from_row,
        )
        .optional()?;
    Ok(nft)
}

/// Look up a record by transaction hash.
pub fn get_by_tx_hash(conn: &Connection, tx_hash: &str) -> Result<Option<NftRecord>> {
    let nft = conn
        .query_row(
            &format!("SELECT {NFT_COLUMNS} FROM nfts WHERE tx_hash = ?1"),
            [tx_hash],
            nft_from_row,
        )
        .optional()?;
    Ok(nft)
}

/// All records of an agent, newest first.
pub fn list_by_agent(conn: &Connection, agent_id: &str) -> Result<Vec<NftRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {NFT_COLUMNS} FROM nfts WHERE agent_id = ?1 ORDER BY minted_at DESC, rowid DESC"
    ))?;
    let rows = stmt
        .query_map([agent_id], nft_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Records of an agent on one network, in mint order.
pub fn list_by_agent_network(
    conn: &Connection,
    agent_id: &str,
    network: Network,
) -> Result<Vec<NftRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {NFT_COLUMNS} FROM nfts WHERE agent_id = ?1 AND network = ?2
         ORDER BY minted_at ASC, rowid ASC"
    ))?;
    let rows = stmt
        .query_map(rusqlite::params![agent_id, network.as_str()], nft_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Number of records an agent holds across networks.
pub fn count_by_agent(conn: &Connection, agent_id: &str) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM nfts WHERE agent_id = ?1",
        [agent_id],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Distinct (agent, network) pairs that still have a record without token id.
pub fn agents_missing_token_ids(conn: &Connection) -> Result<Vec<(String, Network)>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT agent_id, network FROM nfts WHERE token_id IS NULL ORDER BY agent_id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, parse_column(1, row.get(1)?)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn nft_from_row(row: &Row<'_>) -> rusqlite::Result<NftRecord> {
    Ok(NftRecord {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        network: parse_column(2, row.get(2)?)?,
        token_id: row.get::<_, Option<i64>>(3)?.map(|t| t as u64),
        image_cid: row.get::<_, Option<String>>(4)?.map(ContentId::new),
        metadata_cid: ContentId::new(row.get::<_, String>(5)?),
        tx_hash: row.get(6)?,
        mood: row.get(7)?,
        minted_at: row.get::<_, i64>(8)? as u64,
    })
}

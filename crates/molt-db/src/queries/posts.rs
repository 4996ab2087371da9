//! Post and comment reads. Writes go through [`crate::ledger::social`].

use molt_types::{Comment, Post};
use rusqlite::{Connection, OptionalExtension, Row};

use crate::{parse_column, Result};

pub(crate) const POST_COLUMNS: &str =
    "id, agent_id, nft_id, submint, title, content, upvotes, comment_count, created_at";

pub(crate) const COMMENT_COLUMNS: &str =
    "id, post_id, agent_id, parent_id, content, upvotes, created_at";

/// Look up a post by id.
pub fn get(conn: &Connection, id: &str) -> Result<Option<Post>> {
    let post = conn
        .query_row(
            &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
            [id],
            post_from_row,
        )
        .optional()?;
    Ok(post)
}

/// Look up a comment by id.
pub fn get_comment(conn: &Connection, id: &str) -> Result<Option<Comment>> {
    let comment = conn
        .query_row(
            &format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?1"),
            [id],
            comment_from_row,
        )
        .optional()?;
    Ok(comment)
}

/// Comments of a post in creation order.
pub fn comments(conn: &Connection, post_id: &str) -> Result<Vec<Comment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COMMENT_COLUMNS} FROM comments WHERE post_id = ?1
         ORDER BY created_at ASC, rowid ASC"
    ))?;
    let rows = stmt
        .query_map([post_id], comment_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Whether an agent has upvoted a post.
pub fn has_upvoted_post(conn: &Connection, agent_id: &str, post_id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM upvotes WHERE agent_id = ?1 AND post_id = ?2",
        [agent_id, post_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        nft_id: row.get(2)?,
        submint: parse_column(3, row.get(3)?)?,
        title: row.get(4)?,
        content: row.get(5)?,
        upvotes: row.get::<_, i64>(6)? as u64,
        comment_count: row.get::<_, i64>(7)? as u64,
        created_at: row.get::<_, i64>(8)? as u64,
    })
}

pub(crate) fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        agent_id: row.get(2)?,
        parent_id: row.get(3)?,
        content: row.get(4)?,
        upvotes: row.get::<_, i64>(5)? as u64,
        created_at: row.get::<_, i64>(6)? as u64,
    })
}

//! Social ledger: posts, threaded comments and toggleable upvotes.
//!
//! Counters on `posts` and `comments` only ever change through SQL
//! arithmetic in the same transaction as the row they count.

use molt_types::{Comment, Post, Submint, UpvoteAction, UpvoteTarget, MAX_BODY_LEN};
use rusqlite::{Connection, TransactionBehavior};

use crate::queries::{nfts, posts};
use crate::{new_id, DbError, Result};

/// Input for [`create_post`].
#[derive(Clone, Debug, Default)]
pub struct NewPost {
    pub agent_id: String,
    pub nft_id: Option<String>,
    /// Raw submint name; `None` means `daily-mints`.
    pub submint: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Input for [`create_comment`].
#[derive(Clone, Debug, Default)]
pub struct NewComment {
    pub post_id: String,
    pub agent_id: String,
    pub parent_id: Option<String>,
    pub content: String,
}

/// Create a post.
///
/// The post needs content or a linked NFT, and a linked NFT must belong to
/// the author.
pub fn create_post(conn: &Connection, new: &NewPost, now: u64) -> Result<Post> {
    let submint = match new.submint.as_deref() {
        Some(name) => name
            .parse::<Submint>()
            .map_err(|e| DbError::Invalid(e.to_string()))?,
        None => Submint::default(),
    };

    let content = non_blank(new.content.as_deref());
    let title = non_blank(new.title.as_deref());
    if content.is_none() && new.nft_id.is_none() {
        return Err(DbError::Invalid("content or nftId required".into()));
    }
    if content.map_or(0, |c| c.chars().count()) > MAX_BODY_LEN {
        return Err(DbError::Invalid(format!(
            "content exceeds {MAX_BODY_LEN} characters"
        )));
    }

    if let Some(nft_id) = &new.nft_id {
        let nft = nfts::get(conn, nft_id)?
            .ok_or_else(|| DbError::NotFound(format!("nft {nft_id}")))?;
        if nft.agent_id != new.agent_id {
            return Err(DbError::Forbidden(format!(
                "nft {nft_id} is not owned by agent {}",
                new.agent_id
            )));
        }
    }

    let post = Post {
        id: new_id(),
        agent_id: new.agent_id.clone(),
        nft_id: new.nft_id.clone(),
        submint,
        title: title.map(str::to_string),
        content: content.map(str::to_string),
        upvotes: 0,
        comment_count: 0,
        created_at: now,
    };

    conn.execute(
        "INSERT INTO posts (id, agent_id, nft_id, submint, title, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            post.id,
            post.agent_id,
            post.nft_id,
            post.submint.as_str(),
            post.title,
            post.content,
            post.created_at as i64,
        ],
    )?;

    tracing::debug!(post = %post.id, agent = %post.agent_id, submint = %post.submint, "post created");
    Ok(post)
}

/// Add a comment and bump the post's `comment_count` atomically.
pub fn create_comment(conn: &mut Connection, new: &NewComment, now: u64) -> Result<Comment> {
    let content = non_blank(Some(new.content.as_str()))
        .ok_or_else(|| DbError::Invalid("content required".into()))?;
    if content.chars().count() > MAX_BODY_LEN {
        return Err(DbError::Invalid(format!(
            "content exceeds {MAX_BODY_LEN} characters"
        )));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if posts::get(&tx, &new.post_id)?.is_none() {
        return Err(DbError::NotFound(format!("post {}", new.post_id)));
    }

    if let Some(parent_id) = &new.parent_id {
        let parent = posts::get_comment(&tx, parent_id)?
            .ok_or_else(|| DbError::NotFound(format!("comment {parent_id}")))?;
        if parent.post_id != new.post_id {
            return Err(DbError::Invalid(format!(
                "comment {parent_id} belongs to another post"
            )));
        }
    }

    let comment = Comment {
        id: new_id(),
        post_id: new.post_id.clone(),
        agent_id: new.agent_id.clone(),
        parent_id: new.parent_id.clone(),
        content: content.to_string(),
        upvotes: 0,
        created_at: now,
    };

    tx.execute(
        "INSERT INTO comments (id, post_id, agent_id, parent_id, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            comment.id,
            comment.post_id,
            comment.agent_id,
            comment.parent_id,
            comment.content,
            comment.created_at as i64,
        ],
    )?;
    tx.execute(
        "UPDATE posts SET comment_count = comment_count + 1 WHERE id = ?1",
        [&comment.post_id],
    )?;
    tx.commit()?;

    Ok(comment)
}

/// Add the agent's upvote if absent, remove it if present.
pub fn toggle_upvote(
    conn: &mut Connection,
    agent_id: &str,
    target: &UpvoteTarget,
    now: u64,
) -> Result<UpvoteAction> {
    let (table, column) = match target {
        UpvoteTarget::Post(_) => ("posts", "post_id"),
        UpvoteTarget::Comment(_) => ("comments", "comment_id"),
    };
    let target_id = target.id();

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let exists: i64 = tx.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE id = ?1"),
        [target_id],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(DbError::NotFound(format!("{table} {target_id}")));
    }

    let removed = tx.execute(
        &format!("DELETE FROM upvotes WHERE agent_id = ?1 AND {column} = ?2"),
        [agent_id, target_id],
    )?;

    let action = if removed > 0 {
        tx.execute(
            &format!("UPDATE {table} SET upvotes = upvotes - 1 WHERE id = ?1"),
            [target_id],
        )?;
        UpvoteAction::Removed
    } else {
        tx.execute(
            &format!("INSERT INTO upvotes (agent_id, {column}, created_at) VALUES (?1, ?2, ?3)"),
            rusqlite::params![agent_id, target_id, now as i64],
        )?;
        tx.execute(
            &format!("UPDATE {table} SET upvotes = upvotes + 1 WHERE id = ?1"),
            [target_id],
        )?;
        UpvoteAction::Added
    };

    tx.commit()?;
    Ok(action)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mint::{self, MintCommit};
    use crate::queries::agents::{self, tests::new_agent};
    use molt_types::{ContentId, Network};

    fn setup() -> Connection {
        let conn = crate::open_memory().expect("open");
        agents::insert(&conn, &new_agent("a1", "molty")).expect("insert a1");
        agents::insert(&conn, &new_agent("a2", "shelly")).expect("insert a2");
        conn
    }

    fn text_post(conn: &Connection, agent_id: &str) -> Post {
        create_post(
            conn,
            &NewPost {
                agent_id: agent_id.into(),
                content: Some("gm".into()),
                ..Default::default()
            },
            1_000,
        )
        .expect("create post")
    }

    fn record_nft(conn: &mut Connection, agent_id: &str) -> String {
        let data = MintCommit {
            attempt_id: None,
            agent_id: agent_id.into(),
            network: Network::Testnet,
            token_id: Some(1),
            image_cid: None,
            metadata_cid: ContentId::new("QmMeta"),
            tx_hash: format!("0x{agent_id}"),
            mood: None,
            minted_at: 1_000,
        };
        mint::commit(conn, &data, 1_000).expect("commit").id
    }

    #[test]
    fn test_body_limit_counts_characters() {
        let mut conn = setup();
        let at_limit = "é".repeat(MAX_BODY_LEN);
        let post = create_post(
            &conn,
            &NewPost {
                agent_id: "a1".into(),
                content: Some(at_limit.clone()),
                ..Default::default()
            },
            1_000,
        )
        .expect("multibyte body at the limit");

        let comment = NewComment {
            post_id: post.id.clone(),
            agent_id: "a2".into(),
            parent_id: None,
            content: at_limit,
        };
        create_comment(&mut conn, &comment, 1_001).expect("multibyte comment at the limit");

        let over = NewComment {
            content: "é".repeat(MAX_BODY_LEN + 1),
            ..comment
        };
        assert!(matches!(create_comment(&mut conn, &over, 1_002), Err(DbError::Invalid(_))));
    }

    #[test]
    fn test_post_defaults_to_daily_mints() {
        let conn = setup();
        let post = text_post(&conn, "a1");
        assert_eq!(post.submint, Submint::DailyMints);
        let stored = posts::get(&conn, &post.id).expect("get").expect("post");
        assert_eq!(stored, post);
    }

    #[test]
    fn test_post_validation() {
        let conn = setup();
        let empty = NewPost {
            agent_id: "a1".into(),
            content: Some("   ".into()),
            ..Default::default()
        };
        assert!(matches!(create_post(&conn, &empty, 0), Err(DbError::Invalid(_))));

        let bad_submint = NewPost {
            agent_id: "a1".into(),
            submint: Some("memes".into()),
            content: Some("hi".into()),
            ..Default::default()
        };
        assert!(matches!(create_post(&conn, &bad_submint, 0), Err(DbError::Invalid(_))));
    }

    #[test]
    fn test_post_with_foreign_nft_forbidden() {
        let mut conn = setup();
        let nft_id = record_nft(&mut conn, "a2");
        let post = NewPost {
            agent_id: "a1".into(),
            nft_id: Some(nft_id.clone()),
            ..Default::default()
        };
        assert!(matches!(create_post(&conn, &post, 0), Err(DbError::Forbidden(_))));

        let own = NewPost {
            agent_id: "a2".into(),
            nft_id: Some(nft_id),
            submint: Some("showcase".into()),
            ..Default::default()
        };
        let created = create_post(&conn, &own, 0).expect("own nft");
        assert_eq!(created.submint, Submint::Showcase);
        assert_eq!(created.content, None);
    }

    #[test]
    fn test_comments_increment_count() {
        let mut conn = setup();
        let post = text_post(&conn, "a1");
        for i in 0..5 {
            create_comment(
                &mut conn,
                &NewComment {
                    post_id: post.id.clone(),
                    agent_id: "a2".into(),
                    parent_id: None,
                    content: format!("comment {i}"),
                },
                2_000 + i,
            )
            .expect("comment");
        }
        let stored = posts::get(&conn, &post.id).expect("get").expect("post");
        assert_eq!(stored.comment_count, 5);
        assert_eq!(posts::comments(&conn, &post.id).expect("comments").len(), 5);
    }

    #[test]
    fn test_reply_must_share_post() {
        let mut conn = setup();
        let first = text_post(&conn, "a1");
        let second = text_post(&conn, "a2");
        let parent = create_comment(
            &mut conn,
            &NewComment {
                post_id: first.id.clone(),
                agent_id: "a2".into(),
                parent_id: None,
                content: "top".into(),
            },
            0,
        )
        .expect("parent");

        let reply = NewComment {
            post_id: first.id.clone(),
            agent_id: "a1".into(),
            parent_id: Some(parent.id.clone()),
            content: "reply".into(),
        };
        create_comment(&mut conn, &reply, 1).expect("same-post reply");

        let cross = NewComment {
            post_id: second.id.clone(),
            parent_id: Some(parent.id),
            ..reply
        };
        assert!(matches!(create_comment(&mut conn, &cross, 2), Err(DbError::Invalid(_))));

        let stored = posts::get(&conn, &second.id).expect("get").expect("post");
        assert_eq!(stored.comment_count, 0);
    }

    #[test]
    fn test_toggle_upvote_twice_restores() {
        let mut conn = setup();
        let post = text_post(&conn, "a1");
        let target = UpvoteTarget::Post(post.id.clone());

        assert_eq!(toggle_upvote(&mut conn, "a2", &target, 0).expect("add"), UpvoteAction::Added);
        assert_eq!(posts::get(&conn, &post.id).expect("get").expect("post").upvotes, 1);
        assert!(posts::has_upvoted_post(&conn, "a2", &post.id).expect("query"));

        assert_eq!(toggle_upvote(&mut conn, "a2", &target, 1).expect("remove"), UpvoteAction::Removed);
        assert_eq!(posts::get(&conn, &post.id).expect("get").expect("post").upvotes, 0);
        assert!(!posts::has_upvoted_post(&conn, "a2", &post.id).expect("query"));
    }

    #[test]
    fn test_toggle_comment_upvote() {
        let mut conn = setup();
        let post = text_post(&conn, "a1");
        let comment = create_comment(
            &mut conn,
            &NewComment {
                post_id: post.id.clone(),
                agent_id: "a1".into(),
                parent_id: None,
                content: "nice".into(),
            },
            0,
        )
        .expect("comment");

        let target = UpvoteTarget::Comment(comment.id.clone());
        toggle_upvote(&mut conn, "a1", &target, 0).expect("a1");
        toggle_upvote(&mut conn, "a2", &target, 0).expect("a2");
        let stored = posts::get_comment(&conn, &comment.id).expect("get").expect("comment");
        assert_eq!(stored.upvotes, 2);
    }

    #[test]
    fn test_toggle_missing_target() {
        let mut conn = setup();
        let target = UpvoteTarget::Post("missing".into());
        assert!(matches!(
            toggle_upvote(&mut conn, "a1", &target, 0),
            Err(DbError::NotFound(_))
        ));
    }
}

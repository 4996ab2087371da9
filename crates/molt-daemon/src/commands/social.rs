//! Feed command handlers: posts, comments, upvotes and submints.

use std::sync::Arc;

use molt_db::ledger::social::{self, NewComment, NewPost};
use molt_db::queries::{agents, nfts, posts};
use molt_types::time::iso_datetime;
use molt_types::{Comment, Post, Submint, UpvoteTarget};
use serde_json::Value;
use tracing::debug;

use super::agents::Caller;
use super::mint::nft_json;
use super::{db_error, optional_str, required_str};
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

pub(crate) fn post_json(post: &Post) -> Value {
    serde_json::json!({
        "id": post.id,
        "agentId": post.agent_id,
        "nftId": post.nft_id,
        "submint": post.submint,
        "title": post.title,
        "content": post.content,
        "upvotes": post.upvotes,
        "commentCount": post.comment_count,
        "createdAt": iso_datetime(post.created_at),
    })
}

fn comment_json(comment: &Comment) -> Value {
    serde_json::json!({
        "id": comment.id,
        "postId": comment.post_id,
        "agentId": comment.agent_id,
        "parentId": comment.parent_id,
        "content": comment.content,
        "upvotes": comment.upvotes,
        "createdAt": iso_datetime(comment.created_at),
    })
}

pub async fn create_post(state: &Arc<DaemonState>, caller: &Caller, params: &Value) -> Result {
    let new_post = NewPost {
        agent_id: caller.agent_id.clone(),
        nft_id: optional_str(params, "nftId").map(str::to_string),
        submint: optional_str(params, "submint").map(str::to_string),
        title: optional_str(params, "title").map(str::to_string),
        content: optional_str(params, "content").map(str::to_string),
    };
    let db = state.db.lock().await;
    let post = social::create_post(&db, &new_post, state.clock.now()).map_err(db_error)?;
    Ok(serde_json::json!({ "post": post_json(&post) }))
}

pub async fn create_comment(state: &Arc<DaemonState>, caller: &Caller, params: &Value) -> Result {
    let new_comment = NewComment {
        post_id: required_str(params, "postId")?.to_string(),
        agent_id: caller.agent_id.clone(),
        parent_id: optional_str(params, "parentId").map(str::to_string),
        content: required_str(params, "content")?.to_string(),
    };
    let mut db = state.db.lock().await;
    let comment =
        social::create_comment(&mut db, &new_comment, state.clock.now()).map_err(db_error)?;
    Ok(serde_json::json!({ "comment": comment_json(&comment) }))
}

/// Upvote a post (`postId`) or a comment (`commentId`), or take it back.
pub async fn toggle_upvote(state: &Arc<DaemonState>, caller: &Caller, params: &Value) -> Result {
    let target = match (optional_str(params, "postId"), optional_str(params, "commentId")) {
        (Some(post_id), None) => UpvoteTarget::Post(post_id.to_string()),
        (None, Some(comment_id)) => UpvoteTarget::Comment(comment_id.to_string()),
        _ => {
            return Err(RpcError::invalid_params(
                "exactly one of postId or commentId required",
            ))
        }
    };
    let mut db = state.db.lock().await;
    let action = social::toggle_upvote(&mut db, &caller.agent_id, &target, state.clock.now())
        .map_err(db_error)?;
    debug!(agent = %caller.handle, target = target.id(), ?action, "upvote toggled");
    Ok(serde_json::json!({ "action": action }))
}

/// A post with its author, linked NFT and comments in creation order.
pub async fn get_post(state: &Arc<DaemonState>, params: &Value) -> Result {
    let post_id = required_str(params, "postId")?;
    let db = state.db.lock().await;
    let post = posts::get(&db, post_id)
        .map_err(db_error)?
        .ok_or_else(|| RpcError::not_found(&format!("post {post_id}")))?;
    let author = agents::get(&db, &post.agent_id).map_err(db_error)?;
    let nft = match &post.nft_id {
        Some(nft_id) => nfts::get(&db, nft_id).map_err(db_error)?,
        None => None,
    };
    let comments = posts::comments(&db, &post.id).map_err(db_error)?;

    let gateway = &state.config.content.gateway;
    Ok(serde_json::json!({
        "post": post_json(&post),
        "agent": author.map(|a| serde_json::json!({
            "id": a.id,
            "handle": a.handle,
            "displayName": a.display_name,
        })),
        "nft": nft.as_ref().map(|n| nft_json(n, gateway)),
        "comments": comments.iter().map(comment_json).collect::<Vec<_>>(),
    }))
}

pub async fn list_submints() -> Result {
    let submints: Vec<Value> = Submint::ALL
        .iter()
        .map(|s| serde_json::json!({"name": s.as_str(), "displayName": s.display_name()}))
        .collect();
    Ok(serde_json::json!({ "submints": submints }))
}

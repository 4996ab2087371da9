//! Integration test: feed counters under repeated and concurrent writes.
//!
//! 1. Toggling an upvote twice restores the counter
//! 2. N comments raise `comment_count` by exactly N
//! 3. Concurrent upvotes from many agents are all counted
//! 4. A molt announcement links the post to the minted record

use std::sync::Arc;

use molt_db::ledger::social::{self, NewComment, NewPost};
use molt_db::queries::posts;
use molt_integration_tests::{Harness, T0};
use molt_pipeline::{Announcement, MoltRequest};
use molt_types::{Post, Submint, UpvoteAction, UpvoteTarget};

async fn post_by(h: &Harness, agent_id: &str, content: &str) -> Post {
    let conn = h.db.lock().await;
    social::create_post(
        &conn,
        &NewPost {
            agent_id: agent_id.to_string(),
            nft_id: None,
            submint: Some("discuss".into()),
            title: None,
            content: Some(content.into()),
        },
        T0,
    )
    .expect("post")
}

async fn reload(h: &Harness, post_id: &str) -> Post {
    let conn = h.db.lock().await;
    posts::get(&conn, post_id).expect("query").expect("post")
}

#[tokio::test]
async fn toggle_twice_restores_counter() {
    let h = Harness::new().expect("harness");
    let author = h.register("author").await.expect("register");
    let fan = h.register("fan").await.expect("register");
    let post = post_by(&h, &author.id, "upvote me").await;
    let target = UpvoteTarget::Post(post.id.clone());

    {
        let mut conn = h.db.lock().await;
        let first = social::toggle_upvote(&mut conn, &fan.id, &target, T0).expect("toggle");
        assert_eq!(first, UpvoteAction::Added);
    }
    assert_eq!(reload(&h, &post.id).await.upvotes, 1);

    {
        let mut conn = h.db.lock().await;
        let second = social::toggle_upvote(&mut conn, &fan.id, &target, T0).expect("toggle");
        assert_eq!(second, UpvoteAction::Removed);
        assert!(!posts::has_upvoted_post(&conn, &fan.id, &post.id).expect("query"));
    }
    assert_eq!(reload(&h, &post.id).await.upvotes, post.upvotes);
}

#[tokio::test]
async fn comments_advance_count_exactly() {
    const N: u64 = 5;
    let h = Harness::new().expect("harness");
    let author = h.register("author").await.expect("register");
    let post = post_by(&h, &author.id, "thread").await;

    {
        let mut conn = h.db.lock().await;
        for i in 0..N {
            social::create_comment(
                &mut conn,
                &NewComment {
                    post_id: post.id.clone(),
                    agent_id: author.id.clone(),
                    parent_id: None,
                    content: format!("comment {i}"),
                },
                T0 + i,
            )
            .expect("comment");
        }
        // A rejected comment must not move the counter.
        let rejected = social::create_comment(
            &mut conn,
            &NewComment {
                post_id: post.id.clone(),
                agent_id: author.id.clone(),
                parent_id: Some("no-such-comment".into()),
                content: "orphan".into(),
            },
            T0,
        );
        assert!(rejected.is_err());
    }

    let post = reload(&h, &post.id).await;
    assert_eq!(post.comment_count, N);
    let conn = h.db.lock().await;
    let comments = posts::comments(&conn, &post.id).expect("comments");
    assert_eq!(comments.len() as u64, N);
    assert_eq!(comments[0].content, "comment 0");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_upvotes_all_count() {
    let h = Arc::new(Harness::new().expect("harness"));
    let author = h.register("author").await.expect("register");
    let post = post_by(&h, &author.id, "popular").await;

    let mut voters = Vec::new();
    for i in 0..10 {
        voters.push(h.register(&format!("voter{i}")).await.expect("register").id);
    }

    let mut handles = Vec::new();
    for voter in voters.clone() {
        let h = h.clone();
        let target = UpvoteTarget::Post(post.id.clone());
        handles.push(tokio::spawn(async move {
            let mut conn = h.db.lock().await;
            social::toggle_upvote(&mut conn, &voter, &target, T0)
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.expect("join").expect("toggle"), UpvoteAction::Added);
    }

    assert_eq!(reload(&h, &post.id).await.upvotes, voters.len() as u64);
}

#[tokio::test]
async fn announcement_links_minted_record() {
    let h = Harness::new().expect("harness");
    let agent = h.register("herald").await.expect("register");

    let outcome = h
        .orchestrator
        .run(
            &agent.id,
            MoltRequest::new("proud").announced(Announcement {
                submint: Submint::Showcase,
                title: Some("Day 1".into()),
            }),
        )
        .await
        .expect("molt");
    let report = outcome.report();
    let nft = report.nft.as_ref().expect("record");
    let post = report.post.as_ref().expect("post");
    assert_eq!(post.nft_id.as_deref(), Some(nft.id.as_str()));
    assert_eq!(post.submint, Submint::Showcase);
    assert_eq!(post.title.as_deref(), Some("Day 1"));

    // Posting someone else's NFT is refused.
    let other = h.register("copycat").await.expect("register");
    let conn = h.db.lock().await;
    let refused = social::create_post(
        &conn,
        &NewPost {
            agent_id: other.id.clone(),
            nft_id: Some(nft.id.clone()),
            submint: None,
            title: None,
            content: None,
        },
        T0,
    );
    assert!(matches!(refused, Err(molt_db::DbError::Forbidden(_))));
}

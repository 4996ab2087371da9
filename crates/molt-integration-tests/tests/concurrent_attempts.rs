//! Integration test: racing attempts on a multi-threaded runtime.
//!
//! 1. Eight simultaneous molts of one agent: exactly one reaches the chain
//!    and the ledger; the rest are rejected before any side effect
//! 2. Different agents never block each other

use std::collections::HashSet;

use molt_db::queries::nfts;
use molt_integration_tests::Harness;
use molt_pipeline::{ErrorKind, MoltRequest, PipelineError, PreparedMint};

const RACERS: usize = 8;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_agent_racing_itself_mints_once() {
    let h = Harness::new().expect("harness");
    let agent = h.register("eager").await.expect("register");

    let mut handles = Vec::with_capacity(RACERS);
    for i in 0..RACERS {
        let orchestrator = h.orchestrator.clone();
        let agent_id = agent.id.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .submit_prepared(
                    &agent_id,
                    PreparedMint {
                        metadata_uri: format!("ipfs://bafyrace{i}"),
                        image_uri: None,
                        mood: Some(format!("racer {i}")),
                        network: None,
                    },
                )
                .await
        }));
    }

    let mut minted = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(outcome) => {
                assert_eq!(outcome.lagging(), None);
                minted += 1;
            }
            Err(failure) => {
                assert_eq!(failure.kind(), ErrorKind::RejectedBeforeEffect);
                assert!(matches!(
                    failure.error,
                    PipelineError::AttemptInProgress(_) | PipelineError::Cooldown { .. }
                ));
            }
        }
    }
    assert_eq!(minted, 1);
    assert_eq!(h.relayer.submit_count(), 1);
    assert_eq!(h.relayer.mined_count(), 1);

    let conn = h.db.lock().await;
    assert_eq!(nfts::count_by_agent(&conn, &agent.id).expect("count"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_agents_mint_in_parallel() {
    let h = Harness::new().expect("harness");
    let mut agent_ids = Vec::new();
    for handle in ["ada", "bea", "cyd", "dot"] {
        agent_ids.push(h.register(handle).await.expect("register").id);
    }

    let mut handles = Vec::new();
    for agent_id in agent_ids.clone() {
        let orchestrator = h.orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .run(&agent_id, MoltRequest::new("synchronized"))
                .await
        }));
    }

    let mut token_ids = HashSet::new();
    for handle in handles {
        let outcome = handle.await.expect("join").expect("molt");
        let token_id = outcome.report().confirmation.token_id.expect("token id");
        token_ids.insert(token_id);
    }
    assert_eq!(token_ids.len(), agent_ids.len());
    assert_eq!(h.generator.call_count(), 4);

    for agent_id in &agent_ids {
        assert_eq!(h.agent(agent_id).await.expect("agent").total_mints, 1);
    }
}

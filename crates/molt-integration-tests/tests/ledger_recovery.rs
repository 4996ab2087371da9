//! Integration test: the chain is ahead of the ledger.
//!
//! Covers the ways a confirmed mint can miss its record and how a
//! reconciliation pass brings the ledger back in line:
//! 1. The ledger write fails after confirmation (partial success)
//! 2. The confirmation wait times out (in doubt, claim kept)
//! 3. The broadcast response is lost after the node took the transaction
//! 4. The receipt lacks the mint event (record without token id), also
//!    with unrelated mints in the recipient's timeline

use molt_chain::{MockMode, MockRelayer, Relayer};
use molt_db::ledger::mint::{self as journal, PendingStatus};
use molt_db::queries::nfts;
use molt_integration_tests::{Harness, T0};
use molt_pipeline::{ErrorKind, Lagging, MoltRequest, PipelineError, PreparedMint};
use molt_types::{Clock, Network, COOLDOWN_SECS};

#[tokio::test]
async fn ledger_failure_is_reconciled_from_the_journal() {
    let h = Harness::with_relayer(MockRelayer::new(Network::Testnet).with_next_token_id(7))
        .expect("harness");
    let agent = h.register("molty").await.expect("register");

    {
        let conn = h.db.lock().await;
        conn.execute_batch(
            "CREATE TRIGGER fail_nfts BEFORE INSERT ON nfts
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
        )
        .expect("trigger");
    }

    let outcome = h
        .orchestrator
        .run(&agent.id, MoltRequest::new("stubborn"))
        .await
        .expect("minted");
    assert_eq!(outcome.lagging(), Some(Lagging::Ledger));
    assert_eq!(outcome.report().confirmation.token_id, Some(7));
    assert!(outcome.report().nft.is_none());

    // Nothing recorded, and the open journal row blocks a second attempt.
    assert_eq!(h.agent(&agent.id).await.expect("agent").total_mints, 0);
    h.clock.set(T0 + 60);
    let failure = h
        .orchestrator
        .run(&agent.id, MoltRequest::new("retry"))
        .await
        .expect_err("blocked");
    assert!(matches!(failure.error, PipelineError::AttemptInProgress(_)));

    {
        let conn = h.db.lock().await;
        conn.execute_batch("DROP TRIGGER fail_nfts;").expect("drop trigger");
    }
    let report = h.reconciler.run_once(h.clock.now()).await.expect("reconcile");
    assert_eq!(report.recorded, 1);
    assert!(report.errors.is_empty());

    let records = {
        let conn = h.db.lock().await;
        nfts::list_by_agent(&conn, &agent.id).expect("records")
    };
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].token_id, Some(7));
    assert_eq!(records[0].mood.as_deref(), Some("stubborn"));

    let agent = h.agent(&agent.id).await.expect("agent");
    assert_eq!(agent.total_mints, 1);
    assert!(agent.last_mint_at.is_some());

    // A second pass finds nothing left to do.
    let report = h.reconciler.run_once(h.clock.now()).await.expect("reconcile");
    assert_eq!(report.recorded, 0);
    assert_eq!(h.relayer.submit_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn timed_out_confirmation_stays_in_doubt_until_mined() {
    let h = Harness::with_relayer(MockRelayer::new(Network::Testnet).with_mode(MockMode::Stall))
        .expect("harness");
    let agent = h.register("slowpoke").await.expect("register");

    let failure = h
        .orchestrator
        .submit_prepared(
            &agent.id,
            PreparedMint {
                metadata_uri: "ipfs://bafymetadata".into(),
                image_uri: None,
                mood: Some("patient".into()),
                network: None,
            },
        )
        .await
        .expect_err("in doubt");
    assert_eq!(failure.kind(), ErrorKind::InDoubt);
    let PipelineError::InDoubt {
        attempt_id,
        tx_hash,
        ..
    } = failure.error
    else {
        unreachable!("expected an in-doubt error")
    };

    let pending = {
        let conn = h.db.lock().await;
        journal::get_attempt(&conn, &attempt_id)
            .expect("query")
            .expect("attempt")
    };
    assert_eq!(pending.status, PendingStatus::Submitted);

    // Still unmined: reconciliation leaves it alone.
    let report = h.reconciler.run_once(h.clock.now()).await.expect("reconcile");
    assert_eq!(report.still_pending, 1);

    h.relayer.mine(&tx_hash);
    let report = h.reconciler.run_once(h.clock.now()).await.expect("reconcile");
    assert_eq!(report.recorded, 1);

    let nft = {
        let conn = h.db.lock().await;
        nfts::get_by_tx_hash(&conn, &tx_hash)
            .expect("query")
            .expect("record")
    };
    assert_eq!(nft.token_id, Some(1));
    assert_eq!(h.agent(&agent.id).await.expect("agent").total_mints, 1);
}

#[tokio::test]
async fn missing_event_is_backfilled_from_timeline() {
    let h = Harness::with_relayer(MockRelayer::new(Network::Testnet).with_next_token_id(40))
        .expect("harness");
    h.relayer.set_emit_event(false);
    let agent = h.register("quiet").await.expect("register");

    let outcome = h
        .orchestrator
        .run(&agent.id, MoltRequest::new("understated"))
        .await
        .expect("molt");
    let nft = outcome.report().nft.clone().expect("record");
    assert_eq!(nft.token_id, None);
    assert_eq!(outcome.report().marketplace_url, None);

    let report = h.reconciler.run_once(h.clock.now()).await.expect("reconcile");
    assert_eq!(report.backfilled, 1);

    let conn = h.db.lock().await;
    let nft = nfts::get(&conn, &nft.id).expect("query").expect("record");
    assert_eq!(nft.token_id, Some(40));
}

#[tokio::test]
async fn lost_broadcast_response_is_recorded_once() {
    let h = Harness::with_relayer(MockRelayer::new(Network::Testnet).with_mode(MockMode::LostResponse))
        .expect("harness");
    h.relayer.set_block_time(Some(T0 + 5));
    let agent = h.register("unlucky").await.expect("register");

    let failure = h
        .orchestrator
        .run(&agent.id, MoltRequest::new("jittery"))
        .await
        .expect_err("response lost");
    assert_eq!(failure.kind(), ErrorKind::InDoubt);
    assert_eq!(h.relayer.mined_count(), 1);

    // The claim survives, so a retry cannot mint a second token.
    h.relayer.set_mode(MockMode::Confirm);
    h.clock.set(T0 + 60);
    let retry = h
        .orchestrator
        .run(&agent.id, MoltRequest::new("jittery again"))
        .await
        .expect_err("blocked");
    assert!(matches!(retry.error, PipelineError::AttemptInProgress(_)));
    assert_eq!(h.relayer.mined_count(), 1);

    let report = h.reconciler.run_once(h.clock.now()).await.expect("reconcile");
    assert_eq!(report.recorded, 1);
    let agent_now = h.agent(&agent.id).await.expect("agent");
    assert_eq!(agent_now.total_mints, 1);
    assert_eq!(agent_now.last_mint_at, Some(T0 + 5));

    h.relayer.set_block_time(None);
    h.clock.set(T0 + 5 + COOLDOWN_SECS);
    let outcome = h
        .orchestrator
        .run(&agent.id, MoltRequest::new("steady"))
        .await
        .expect("next day");
    assert_eq!(outcome.report().confirmation.token_id, Some(2));
    assert_eq!(h.relayer.mined_count(), 2);
}

#[tokio::test]
async fn unjournaled_mint_does_not_shift_backfill() {
    let h = Harness::new().expect("harness");
    let agent = h.register("crowded").await.expect("register");

    // Someone else minted to this wallet outside the ledger.
    h.relayer
        .submit(&agent.wallet_address, "ipfs://QmStray")
        .await
        .expect("stray mint");
    h.relayer.set_emit_event(false);

    let outcome = h
        .orchestrator
        .run(&agent.id, MoltRequest::new("hemmed in"))
        .await
        .expect("molt");
    let nft = outcome.report().nft.clone().expect("record");
    assert_eq!(nft.token_id, None);

    let report = h.reconciler.run_once(h.clock.now()).await.expect("reconcile");
    assert_eq!(report.backfilled, 1);

    let conn = h.db.lock().await;
    let nft = nfts::get(&conn, &nft.id).expect("query").expect("record");
    assert_eq!(nft.token_id, Some(2));
}

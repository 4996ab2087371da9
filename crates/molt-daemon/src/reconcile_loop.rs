//! Periodic reconciliation of open mint attempts.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::DaemonState;

/// Start the background pass. `None` when the interval is 0.
pub fn spawn(state: Arc<DaemonState>) -> Option<JoinHandle<()>> {
    let secs = state.config.pipeline.reconcile_interval_secs;
    if secs == 0 {
        info!("Background reconciliation disabled");
        return None;
    }
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = state.clock.now();
                    if let Err(e) = state.reconciler.run_once(now).await {
                        warn!(error = %e, "Reconciliation pass failed");
                    }
                    state.rate_limiter.prune();
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    }))
}

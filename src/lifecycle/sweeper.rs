//! Periodic background sweep.
//!
//! One task per gateway drops expired tokens and idle rate-limit state on
//! a fixed interval. The loop is a `select!` over the interval tick and
//! the shutdown broadcast, so shutdown is deterministic and testable
//! without timing tricks.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::gateway::Gateway;
use crate::lifecycle::Shutdown;

/// Spawn the sweep task for a gateway.
pub fn spawn(
    gateway: Arc<Gateway>,
    interval: Duration,
    shutdown: &Shutdown,
) -> tokio::task::JoinHandle<()> {
    let mut rx = shutdown.subscribe();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; consume it so the first
        // real sweep happens one full interval after startup.
        ticker.tick().await;

        tracing::debug!(interval_secs = interval.as_secs(), "sweeper started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let tokens = gateway.token_manager().sweep_expired();
                    let identifiers = gateway.rate_limiter().sweep_idle();
                    tracing::debug!(tokens, identifiers, "sweep pass complete");
                }
                _ = rx.recv() => {
                    tracing::info!("sweeper stopped");
                    break;
                }
            }
        }
    })
}

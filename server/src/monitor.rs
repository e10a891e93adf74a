//! Heartbeat timeout monitor
//!
//! Periodically evicts players that have gone silent. Eviction goes through
//! the same disconnect path as every other way of leaving, so a player that
//! times out while its connection is also closing is still announced once.

use crate::context::{DisconnectReason, ServerContext};
use crate::network::wait_for_shutdown;
use log::{debug, info};
use shared::PlayerId;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Evicts every player whose heartbeat is older than the configured timeout
/// and returns the ids that were removed by this sweep.
pub async fn sweep(ctx: &ServerContext) -> Vec<PlayerId> {
    let stale = ctx.registry.stale(ctx.config.heartbeat_timeout).await;

    let mut evicted = Vec::with_capacity(stale.len());
    for player_id in stale {
        if ctx.disconnect(player_id, DisconnectReason::Timeout).await {
            evicted.push(player_id);
        }
    }

    if !evicted.is_empty() {
        info!("Timed out {} players: {:?}", evicted.len(), evicted);
    }
    debug!("{} players online", ctx.registry.len().await);
    evicted
}

pub async fn run_timeout_monitor(ctx: Arc<ServerContext>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(ctx.config.monitor_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = ticker.tick() => {
                sweep(&ctx).await;
            }
        }
    }
    debug!("Timeout monitor stopped");
}

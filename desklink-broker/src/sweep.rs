//! Stale-session sweeper
//!
//! Sessions are created by agent registration and normally torn down by
//! disconnect. Agents that vanish (power loss, network drop) would leave
//! their sessions in the table forever, so a background loop removes any
//! session older than the configured TTL.

use std::sync::Arc;

use tokio::sync::broadcast;

use desklink_core::config::BrokerConfig;
use desklink_core::SessionStore;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Report from one sweep pass
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub removed: usize,
    pub remaining: usize,
    pub elapsed_ms: u64,
}

/// Run a single sweep pass, removing sessions past the TTL.
pub async fn sweep_once(store: &Arc<dyn SessionStore>, ttl_hours: u64) -> SweepReport {
    let start = std::time::Instant::now();
    let ttl = chrono::Duration::hours(ttl_hours as i64);

    let removed = store.sweep_expired(ttl).await;
    let remaining = store.session_count().await;

    SweepReport {
        removed,
        remaining,
        elapsed_ms: start.elapsed().as_millis() as u64,
    }
}

/// Background loop that sweeps at the configured interval until the
/// shutdown signal fires.
pub async fn run_sweep_loop(
    store: Arc<dyn SessionStore>,
    config: BrokerConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let interval = tokio::time::Duration::from_secs(config.sweep_interval_minutes * 60);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(
        "Session sweep loop started (interval: {}min, ttl: {}h)",
        config.sweep_interval_minutes,
        config.session_ttl_hours
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = sweep_once(&store, config.session_ttl_hours).await;
                if report.removed > 0 {
                    tracing::info!(
                        "Sweep complete: {} expired sessions removed, {} remain ({}ms)",
                        report.removed,
                        report.remaining,
                        report.elapsed_ms
                    );
                } else {
                    tracing::debug!("Sweep complete: nothing expired");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Sweep loop shutting down");
                break;
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

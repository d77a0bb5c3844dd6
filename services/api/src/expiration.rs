//! services/api/src/expiration.rs
//!
//! Background task that deletes expired reset tokens and blacklist entries.

use dose_core::CredentialLifecycle;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Start the background expiry sweep. It runs until `shutdown` is cancelled.
pub fn start_expiry_sweep(
    credentials: CredentialLifecycle,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(interval);
        interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Expiry sweep stopped");
                    break;
                }
                _ = interval_timer.tick() => run_sweep(&credentials).await,
            }
        }
    })
}

async fn run_sweep(credentials: &CredentialLifecycle) {
    debug!("Running expiry sweep");
    if let Err(e) = credentials.purge_expired().await {
        error!(error = %e, "Failed to clean up expired credentials");
    }
}

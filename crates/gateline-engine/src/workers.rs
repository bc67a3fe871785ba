//! Background expiry workers.
//!
//! Three periodic sweeps: abandoned provisional registrations, stale claim
//! tokens, and expired rate-limit keys. Each worker is a plain interval loop
//! over the matching engine sweep, so an external scheduler can drive the
//! same sweeps directly instead of spawning these tasks.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::DefaultEngine;

/// Periodically delete provisional registrations that were never finished.
pub fn spawn_registration_reaper(
    engine: DefaultEngine,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.tick().await; // first tick completes immediately

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    match engine.reap_unfinished_registrations().await {
                        Ok(0) => debug!("Registration sweep found nothing to reap"),
                        Ok(n) => info!(reaped = n, "Reaped abandoned registrations"),
                        Err(e) => warn!(error = %e, "Registration sweep failed"),
                    }
                }
                _ = shutdown.changed() => {
                    debug!("Registration reaper shutting down");
                    return;
                }
            }
        }
    })
}

/// Periodically delete claim tokens past their validity window, consumed or
/// not.
pub fn spawn_claim_token_reaper(
    engine: DefaultEngine,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    match engine.reap_claim_tokens().await {
                        Ok(0) => debug!("Claim token sweep found nothing to reap"),
                        Ok(n) => info!(reaped = n, "Reaped stale claim tokens"),
                        Err(e) => warn!(error = %e, "Claim token sweep failed"),
                    }
                }
                _ = shutdown.changed() => {
                    debug!("Claim token reaper shutting down");
                    return;
                }
            }
        }
    })
}

/// Periodically delete rate-limit keys whose window has expired.
pub fn spawn_rate_limit_reaper(
    engine: DefaultEngine,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    match engine.reap_rate_limit_keys().await {
                        Ok(0) => debug!("Rate-limit sweep found nothing to reap"),
                        Ok(n) => info!(reaped = n, "Reaped expired rate-limit keys"),
                        Err(e) => warn!(error = %e, "Rate-limit sweep failed"),
                    }
                }
                _ = shutdown.changed() => {
                    debug!("Rate-limit reaper shutting down");
                    return;
                }
            }
        }
    })
}

//! Watch mode: periodic rescans so `lastSeen` stays current
//!
//! Runs until Ctrl+C or SIGTERM. Every scan goes through the session's
//! generation-guarded scan state; a failed scan is logged and the loop
//! carries on.

use anyhow::Result;
use rpmanager_core::Session;
use tokio::time::{interval, Duration, MissedTickBehavior};

pub async fn run_watch(session: &Session, interval_secs: u64) -> Result<()> {
    let period = Duration::from_secs(interval_secs.max(1));

    tracing::info!(
        "Watching {} candidates, scanning every {}s",
        session.scanner().candidates().len(),
        period.as_secs()
    );

    let mut ticker = interval(period);
    // A scan longer than the period delays the next one instead of bunching up
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_scan(session).await;
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested, stopping watch");
                break;
            }
        }
    }

    tracing::info!("Watch stopped after {} scans", session.scan_state().started());
    Ok(())
}

async fn run_scan(session: &Session) {
    match session.scan().await {
        Ok(summary) => {
            let online = summary.devices.iter().filter(|d| d.is_online()).count();
            tracing::info!(
                "Scan {}: {} devices answered, {} online of {} known",
                summary.generation,
                summary.discovered,
                online,
                summary.devices.len()
            );
        }
        Err(e) => tracing::error!("Scan failed: {}", e),
    }
}

/// Resolves on Ctrl+C, or on SIGTERM where available.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl+C"),
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                }
                return;
            }
            Err(e) => tracing::warn!("Could not register SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Could not listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

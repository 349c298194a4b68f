//! Signal-driven cancellation for the sync pipeline.
//!
//! The first SIGINT / SIGTERM / SIGHUP cancels the run token: interactors
//! stop scheduling new items and in-flight transfers drain. Partial
//! artifacts are left in place; the next run reconciles them through the
//! idempotent skip and cleanup passes. A second signal exits immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Spawn the signal listener and hand back the run-wide token.
pub(crate) fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let run_token = token.clone();
    let already_cancelled = Arc::new(AtomicBool::new(false));

    tokio::spawn(async move {
        loop {
            wait_for_signal().await;
            if already_cancelled.swap(true, Ordering::SeqCst) {
                tracing::warn!("Second signal, exiting now");
                std::process::exit(130);
            }
            tracing::info!("Shutdown requested, draining in-flight transfers");
            tracing::info!("Press Ctrl+C again to exit immediately");
            run_token.cancel();
        }
    });

    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    // Registration failure leaves only Ctrl+C handling; the process is
    // still stoppable, so log rather than abort.
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("SIGTERM handler unavailable: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    let mut sighup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("SIGHUP handler unavailable: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
        _ = sighup.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

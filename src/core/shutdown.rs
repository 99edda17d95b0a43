//! # OS termination signals.
//!
//! [`termination`] completes when the process is asked to stop.
//!
//! ## Signals
//! **Unix:** `SIGINT` (Ctrl-C), `SIGTERM` (systemd, container runtimes), `SIGQUIT`.
//!
//! **Other platforms:** Ctrl-C via [`tokio::signal::ctrl_c`].
//!
//! If the handlers cannot be installed the future never completes and the
//! monitor can only be stopped through [`MonitorHandle::stop`](crate::MonitorHandle::stop).

use tracing::{info, warn};

pub(crate) async fn termination() {
    match wait_for_signal().await {
        Ok(()) => info!("termination signal received"),
        Err(e) => {
            warn!(error = %e, "cannot install signal handlers; waiting for an explicit stop");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

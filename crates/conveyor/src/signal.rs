//! Signal handling for graceful shutdown.

use std::io;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::pipeline::CancelHandle;

/// Wait for a shutdown signal (SIGINT, SIGTERM, or SIGQUIT on Unix).
///
/// Returns the name of the signal that arrived, or an error if the handlers
/// could not be installed.
#[cfg(unix)]
pub async fn shutdown_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    info!(message = "Signal received.", signal = name);
    Ok(name)
}

/// Wait for Ctrl-C.
#[cfg(not(unix))]
pub async fn shutdown_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    info!(message = "Signal received.", signal = "ctrl-c");
    Ok("ctrl-c")
}

/// Cancel a pipeline when the process receives a shutdown signal.
///
/// The returned task ends on its own once the pipeline terminates.
pub fn cancel_on_shutdown(handle: CancelHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = handle.terminated() => {}
            signal = shutdown_signal() => match signal {
                Ok(_) => handle.cancel(),
                Err(e) => warn!(error = %e, "Failed to install shutdown signal handlers"),
            },
        }
    })
}

//! # OS termination signals.
//!
//! [`shutdown_signal`] completes with the name of the first termination signal
//! the process receives. On Unix it listens for `SIGINT`, `SIGTERM` and
//! `SIGQUIT` (plus Ctrl-C); elsewhere for Ctrl-C only.

use crate::error::RuntimeError;

fn setup_failed(err: std::io::Error) -> RuntimeError {
    RuntimeError::Signal {
        error: err.to_string(),
    }
}

/// Waits for a termination signal and returns its name.
#[cfg(unix)]
pub(crate) async fn shutdown_signal() -> Result<&'static str, RuntimeError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt()).map_err(setup_failed)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(setup_failed)?;
    let mut sigquit = signal(SignalKind::quit()).map_err(setup_failed)?;

    let name = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.map_err(setup_failed)?;
            "ctrl-c"
        }
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    Ok(name)
}

/// Waits for a termination signal and returns its name.
#[cfg(not(unix))]
pub(crate) async fn shutdown_signal() -> Result<&'static str, RuntimeError> {
    tokio::signal::ctrl_c().await.map_err(setup_failed)?;
    Ok("ctrl-c")
}

//! Signal handling for graceful shutdown (SIGINT/SIGTERM)
//!
//! On the first SIGINT or SIGTERM the shutdown token is cancelled: the HTTP
//! server stops accepting requests and every supervised run is interrupted
//! and marked failed. The process then waits up to the grace period for the
//! sequencers to finish writing.
//!
//! On a second signal the process exits immediately.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Default grace period for in-flight runs to record their interruption
pub const DEFAULT_GRACE_PERIOD_SECONDS: u64 = 10;

/// Exit code after a second interrupt
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Signal handler state
#[derive(Debug)]
pub struct SignalState {
    signal_count: AtomicU8,
    grace_period: Duration,
}

impl SignalState {
    pub fn new() -> Self {
        Self::with_grace_period(Duration::from_secs(DEFAULT_GRACE_PERIOD_SECONDS))
    }

    pub fn with_grace_period(grace_period: Duration) -> Self {
        Self {
            signal_count: AtomicU8::new(0),
            grace_period,
        }
    }

    #[cfg(test)]
    fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Record a received signal and decide what to do about it.
    pub fn handle_signal(&self) -> SignalAction {
        let count = self.signal_count.fetch_add(1, Ordering::SeqCst);

        match count {
            0 => SignalAction::InitiateShutdown,
            1 => SignalAction::ImmediateExit,
            _ => SignalAction::Ignore,
        }
    }
}

impl Default for SignalState {
    fn default() -> Self {
        Self::new()
    }
}

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: stop serving and interrupt runs
    InitiateShutdown,
    /// Second signal: exit without waiting
    ImmediateExit,
    /// Third+ signal: ignore
    Ignore,
}

/// Listen for SIGINT/SIGTERM until the process exits.
///
/// Cancels `shutdown` on the first signal and exits the process on the second.
pub async fn listen(state: Arc<SignalState>, shutdown: CancellationToken) {
    loop {
        if let Err(err) = wait_for_signal().await {
            tracing::error!(error = %err, "failed to install signal handler");
            return;
        }

        match state.handle_signal() {
            SignalAction::InitiateShutdown => {
                tracing::info!(
                    grace_seconds = state.grace_period().as_secs(),
                    "received interrupt signal, shutting down"
                );
                shutdown.cancel();
            }
            SignalAction::ImmediateExit => {
                tracing::warn!("received second interrupt, exiting immediately");
                std::process::exit(EXIT_CODE_INTERRUPTED);
            }
            SignalAction::Ignore => {}
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

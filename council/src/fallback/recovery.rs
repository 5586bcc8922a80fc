//! Background circuit recovery.
//!
//! Periodically promotes expired open circuits to half-open and probes them.
//! The sweep runs as its own tokio task and is stopped through a
//! [`CancellationToken`].

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::manager::SharedFallbackManager;

/// Periodic recovery sweep over a fallback manager's breakers.
pub struct RecoveryTask {
    manager: SharedFallbackManager,
    interval: Duration,
}

impl RecoveryTask {
    /// Sweep every `settings().health_check_interval`.
    pub fn new(manager: SharedFallbackManager) -> Self {
        let interval = manager.settings().health_check_interval;
        Self { manager, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one sweep now. Returns the providers that were probed.
    pub async fn tick(&self) -> Vec<String> {
        let probed = self.manager.maybe_recover().await;
        if !probed.is_empty() {
            debug!(probed = probed.len(), "recovery sweep");
        }
        probed
    }

    /// Start sweeping on a background task. The first sweep happens one
    /// interval from now.
    pub fn spawn(self) -> RecoveryHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let join = tokio::spawn(async move { self.run(token).await });
        RecoveryHandle { cancel, join }
    }

    async fn run(self, cancel: CancellationToken) {
        let period = self.interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // A sweep in flight is dropped on shutdown.
                    tokio::select! {
                        _ = self.tick() => {}
                        _ = cancel.cancelled() => break,
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
        info!("circuit recovery task shutting down");
    }
}

/// Handle to a running [`RecoveryTask`].
pub struct RecoveryHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl RecoveryHandle {
    /// Token that stops the sweep when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cancel the sweep and wait for the task to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            tracing::warn!("Recovery task ended abnormally: {}", e);
        }
    }
}

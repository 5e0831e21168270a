//! Periodic calendar scan.
//!
//! Checks once immediately, then every interval or whenever the engine
//! reports a change to its events or suggestions, until shut down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use kwararru_core::types::Timestamp;

use crate::proactive::ProactiveEngine;

/// Background loop driving [`ProactiveEngine::check_calendar`].
pub struct CalendarScheduler {
    engine: Arc<ProactiveEngine>,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl CalendarScheduler {
    pub fn new(engine: Arc<ProactiveEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Run until [`shutdown`](Self::shutdown) is signalled.
    pub async fn run(&self) {
        loop {
            if let Err(e) = self.engine.check_calendar(Timestamp::now()).await {
                tracing::warn!(error = %e, "Could not check calendar events");
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.engine.recheck_requested() => {
                    tracing::trace!("Calendar re-check requested");
                }
                _ = self.shutdown.notified() => {
                    tracing::debug!("Calendar scheduler stopped");
                    return;
                }
            }
        }
    }

    /// Run on the current tokio runtime.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Signal the loop to stop after the current check.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

//! StatusPoller: waits for a started deployment to reach a terminal state.
//!
//! Fixed interval, no backoff, no attempt cap. A failed poll is logged and
//! retried on the next tick; only a terminal status from the provider or
//! caller cancellation ends the wait. Cancellation is honoured between
//! ticks, never in the middle of a status request.

use std::sync::Arc;
use std::time::Duration;

use planner::{DeployError, DeployResult, StatusUpdate};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::providers::HostingProvider;

#[derive(Clone)]
pub struct StatusPoller {
    hosting: Arc<dyn HostingProvider>,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(hosting: Arc<dyn HostingProvider>, interval: Duration) -> Self {
        Self { hosting, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll `deployment_id` until READY, ERROR or CANCELED.
    ///
    /// `on_update` sees every successful poll, terminal one included.
    /// Returns the terminal update, or `DeployError::Cancelled`.
    pub async fn wait_for_terminal<F>(
        &self,
        deployment_id: &str,
        cancel: &CancellationToken,
        mut on_update: F,
    ) -> DeployResult<StatusUpdate>
    where
        F: FnMut(&StatusUpdate) + Send,
    {
        let mut polls: u64 = 0;
        let mut consecutive_errors: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                debug!(deployment_id, polls, "status polling cancelled");
                return Err(DeployError::Cancelled);
            }

            polls += 1;
            match self.hosting.deployment_status(deployment_id).await {
                Ok(update) => {
                    consecutive_errors = 0;
                    debug!(deployment_id, polls, status = %update.status, "status poll");
                    on_update(&update);
                    if update.status.is_terminal() {
                        return Ok(update);
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(
                        deployment_id,
                        consecutive_errors,
                        error = %e,
                        "status poll failed; retrying next tick"
                    );
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(deployment_id, polls, "status polling cancelled");
                    return Err(DeployError::Cancelled);
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

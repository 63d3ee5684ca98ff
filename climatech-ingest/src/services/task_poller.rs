//! Task completion poller
//!
//! Bounded, cancellable wait for a remote task. Transient status-check
//! failures (non-200, network, malformed body) count as "not yet done".

use climatech_common::config::PollingConfig;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::services::appeears_client::{AuthToken, ImageryApi, TaskStatus};

/// Floor for every sleep between status checks
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Backoff schedule between status checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_wait: Duration,
}

impl PollPolicy {
    /// First sleep, never below [`MIN_POLL_INTERVAL`]
    pub fn first_interval(&self) -> Duration {
        self.initial_interval.max(MIN_POLL_INTERVAL)
    }

    /// Interval after `interval`: doubled, capped at `max_interval`
    pub fn next_interval(&self, interval: Duration) -> Duration {
        interval
            .saturating_mul(2)
            .min(self.max_interval)
            .max(MIN_POLL_INTERVAL)
    }
}

impl From<&PollingConfig> for PollPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self {
            initial_interval: Duration::from_secs(config.initial_interval_secs).max(MIN_POLL_INTERVAL),
            max_interval: Duration::from_secs(config.max_interval_secs).max(MIN_POLL_INTERVAL),
            max_wait: Duration::from_secs(config.max_wait_secs),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

/// Why polling stopped without the task finishing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("Remote task ended with status '{0}'")]
    TaskFailed(String),

    #[error("Remote task still running after {waited:?}")]
    Timeout { waited: Duration },

    #[error("Polling cancelled")]
    Cancelled,
}

/// Poll until the task is done
///
/// Checks immediately, then sleeps `initial_interval`, doubling each round up
/// to `max_interval`. Gives up with [`PollError::Timeout`] once the next
/// sleep would push the elapsed wall-clock time past `max_wait`.
pub async fn poll_until_done(
    api: &dyn ImageryApi,
    token: &AuthToken,
    task_id: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<(), PollError> {
    let started = Instant::now();
    let mut interval = policy.first_interval();
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }

        attempt += 1;
        match api.task_status(token, task_id).await {
            Ok(TaskStatus::Done) => {
                let waited_secs = started.elapsed().as_secs();
                tracing::info!(task_id, attempt, waited_secs, "Task done");
                return Ok(());
            }
            Ok(TaskStatus::Failed(status)) => {
                tracing::error!(task_id, %status, "Task failed remotely");
                return Err(PollError::TaskFailed(status));
            }
            Ok(TaskStatus::Running(status)) => {
                tracing::info!(task_id, %status, attempt, "Task not finished yet");
            }
            Err(e) => {
                tracing::warn!(task_id, attempt, error = %e, "Status check failed, treating as not done");
            }
        }

        let waited = started.elapsed();
        if waited + interval > policy.max_wait {
            tracing::error!(task_id, waited_secs = waited.as_secs(), "Task polling timed out");
            return Err(PollError::Timeout { waited });
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = tokio::time::sleep(interval) => {}
        }

        interval = policy.next_interval(interval);
    }
}

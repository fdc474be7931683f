//! Waiting for executions to finish.
//!
//! Turns the one-shot status check into a cancellable wait with a delay
//! between checks and an upper bound on how many checks are issued.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::athena::{ExecutionId, QueryExecution, QueryService, QueryState};
use crate::error::{ConsoleError, Result};

/// Delay and bound between status checks.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay after the first non-terminal check.
    pub interval: Duration,
    /// Factor applied to the delay after every check.
    pub multiplier: f64,
    /// Upper bound on the delay.
    pub max_interval: Duration,
    /// Maximum number of status checks.
    pub max_attempts: u32,
}

impl PollPolicy {
    /// Polls every `interval` without backoff.
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            multiplier: 1.0,
            max_interval: interval,
            max_attempts,
        }
    }

    /// Returns the delay to use after `current`, never more than `max_interval`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .map_or(self.max_interval, |next| next.min(self.max_interval))
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            multiplier: 1.5,
            max_interval: Duration::from_secs(5),
            max_attempts: 600,
        }
    }
}

/// Waits for executions to reach a terminal state.
#[derive(Debug, Clone, Default)]
pub struct Poller {
    policy: PollPolicy,
}

impl Poller {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Checks the execution's status until it is terminal.
    ///
    /// Returns the execution once it has SUCCEEDED. FAILED and CANCELLED
    /// become [`ConsoleError::ExecutionFailed`]. A failing status check is
    /// returned as is. Once `cancel` fires no further checks are issued and
    /// the wait fails with [`ConsoleError::Cancelled`].
    pub async fn wait_for_completion(
        &self,
        service: &dyn QueryService,
        id: &ExecutionId,
        cancel: &CancellationToken,
    ) -> Result<QueryExecution> {
        let mut delay = self.policy.interval;

        for attempt in 1..=self.policy.max_attempts {
            if cancel.is_cancelled() {
                debug!("Polling for {} cancelled before check {}", id, attempt);
                return Err(ConsoleError::Cancelled);
            }

            let execution = tokio::select! {
                biased;

                _ = cancel.cancelled() => return Err(ConsoleError::Cancelled),
                result = service.get_execution(id) => result?,
            };

            debug!("Execution {} is {} (check {})", id, execution.status, attempt);

            match execution.status {
                QueryState::Succeeded => {
                    info!("Execution {} succeeded after {} checks", id, attempt);
                    return Ok(execution);
                }
                QueryState::Failed | QueryState::Cancelled => {
                    info!(
                        "Execution {} ended {}: {}",
                        id,
                        execution.status,
                        execution.state_reason.as_deref().unwrap_or("no reason given")
                    );
                    return Err(ConsoleError::execution_failed(execution.status));
                }
                QueryState::Queued | QueryState::Running => {}
            }

            if attempt == self.policy.max_attempts {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => return Err(ConsoleError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            delay = self.policy.next_delay(delay);
        }

        Err(ConsoleError::PollTimeout {
            attempts: self.policy.max_attempts,
        })
    }
}

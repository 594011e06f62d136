use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::proxmox::{Gateway, TaskHandle, TaskState};

/// Growth factor applied to the poll interval after every inconclusive poll.
pub const BACKOFF_FACTOR: f64 = 1.5;

/// Lower bound for any poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Timing for tracking one task: an overall deadline plus a capped backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            initial_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(30),
        }
    }
}

impl PollPolicy {
    #[cfg(test)]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Delay before the second poll.
    pub fn first_interval(&self) -> Duration {
        self.initial_interval
            .min(self.max_interval)
            .max(MIN_POLL_INTERVAL)
    }

    /// next = clamp(current * 1.5, MIN_POLL_INTERVAL, max_interval)
    ///
    /// A product too large for a `Duration` saturates at `max_interval`.
    pub fn next_interval(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * BACKOFF_FACTOR)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
            .max(MIN_POLL_INTERVAL)
    }
}

/// How tracking of a single task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskCompletion {
    Completed,
    /// The task itself reported failure; carries its exit status.
    Failed(String),
    /// The deadline passed while the task was still pending.
    TimedOut { elapsed: Duration },
}

/// Poll `handle` until it reaches a terminal state or `policy.timeout` passes.
///
/// A failed status query counts as an inconclusive poll, never as a task
/// failure. The initiating call is never repeated here, and no poll is issued
/// once the deadline has been reached.
pub async fn await_completion<G: Gateway>(
    gateway: &G,
    handle: &TaskHandle,
    policy: &PollPolicy,
) -> TaskCompletion {
    let start = Instant::now();
    let mut interval = policy.first_interval();
    let mut polls: u32 = 0;

    loop {
        let elapsed = start.elapsed();
        if elapsed >= policy.timeout {
            warn!(
                upid = %handle,
                polls,
                elapsed_secs = elapsed.as_secs_f64(),
                timeout_secs = policy.timeout.as_secs_f64(),
                "timed out waiting for task"
            );
            return TaskCompletion::TimedOut { elapsed };
        }

        polls += 1;
        match gateway.task_status(handle).await {
            Ok(TaskState::Succeeded) => {
                info!(
                    upid = %handle,
                    polls,
                    elapsed_secs = start.elapsed().as_secs_f64(),
                    "task completed"
                );
                return TaskCompletion::Completed;
            }
            Ok(TaskState::Failed(exit_status)) => {
                warn!(upid = %handle, polls, exit_status = %exit_status, "task failed");
                return TaskCompletion::Failed(exit_status);
            }
            Ok(TaskState::Pending) => {
                info!(
                    upid = %handle,
                    polls,
                    elapsed_secs = start.elapsed().as_secs_f64(),
                    next_poll_secs = interval.as_secs_f64(),
                    "task in progress"
                );
            }
            Err(err) => {
                warn!(
                    upid = %handle,
                    polls,
                    error = %err,
                    next_poll_secs = interval.as_secs_f64(),
                    "task status query failed, polling again"
                );
            }
        }

        // Never sleep past the deadline.
        let remaining = policy.timeout.saturating_sub(start.elapsed());
        sleep(interval.min(remaining)).await;
        interval = policy.next_interval(interval);
    }
}

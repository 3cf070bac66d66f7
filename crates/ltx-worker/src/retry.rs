//! Output delivery backoff and poll failure accounting for the serverless loop.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

/// How many times to send a job's output, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Total sends, including the first
    pub attempts: u32,
    /// Wait before the first resend; doubles after each failure
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl DeliveryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// Wait after the `failed`-th failed send (1-based).
    fn backoff(&self, failed: u32) -> Duration {
        let factor = 2u32.saturating_pow(failed.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Send `job_id`'s output with `send` until it succeeds or the policy's
/// attempts run out. Returns the number of sends on success, the last
/// error otherwise.
pub async fn deliver<F, Fut, E>(policy: &DeliveryPolicy, job_id: &str, send: F) -> Result<u32, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let mut sent = 0u32;
    loop {
        sent += 1;
        match send().await {
            Ok(()) => return Ok(sent),
            Err(e) if sent < policy.attempts => {
                let delay = policy.backoff(sent);
                warn!(
                    job_id = %job_id,
                    "Output delivery {}/{} failed, retrying in {:?}: {}",
                    sent, policy.attempts, delay, e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Consecutive poll failures, logged up to a limit so an unreachable
/// endpoint does not flood the logs.
#[derive(Debug)]
pub struct PollFailures {
    streak: u32,
    log_limit: u32,
}

impl PollFailures {
    pub fn new(log_limit: u32) -> Self {
        Self {
            streak: 0,
            log_limit,
        }
    }

    /// A poll reached the platform.
    pub fn record_success(&mut self) {
        if self.streak > self.log_limit {
            info!("Job polling recovered after {} failures", self.streak);
        }
        self.streak = 0;
    }

    /// A poll failed. Returns whether this failure should be logged.
    pub fn record_failure(&mut self) -> bool {
        self.streak += 1;
        if self.streak == self.log_limit + 1 {
            warn!(
                "Job polling failed {} times in a row; muting until it recovers",
                self.log_limit
            );
        }
        self.streak <= self.log_limit
    }
}

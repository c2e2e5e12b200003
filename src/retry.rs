//! Retry with exponential backoff

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Policy for opening documents
    #[must_use]
    pub fn document_open() -> Self {
        Self::default()
    }

    /// Policy for idempotent remote writes
    #[must_use]
    pub fn remote_sync() -> Self {
        Self {
            initial_delay_ms: 500,
            ..Self::default()
        }
    }

    /// Fail on the first error
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.saturating_sub(1) as i32);
        let millis = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(millis as u64)
    }
}

/// Whether repeating an operation is safe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    Idempotent,
    /// Attempted exactly once regardless of policy
    NonIdempotent,
}

/// Run `op` until it succeeds or the policy is exhausted. `op` receives the
/// 1-based attempt number. The last error is returned.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    idempotency: Idempotency,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = match idempotency {
        Idempotency::Idempotent => policy.max_attempts.max(1),
        Idempotency::NonIdempotent => 1,
    };

    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{label} succeeded on attempt {attempt}");
                }
                return Ok(value);
            }
            Err(e) if attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!("{label} failed (attempt {attempt}/{max_attempts}): {e}; retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!("{label} failed after {attempt} attempt(s): {e}");
                return Err(e);
            }
        }
    }
}

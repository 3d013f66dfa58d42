//! Failure-window backoff shared by the consumer reconnect loop and the
//! publisher.
//!
//! Failures are remembered for a rolling window. A burst of failures inside
//! the window triggers a long pause, otherwise the caller waits a short delay
//! and tries again. Retrying never gives up.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Backoff parameters.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// How long a failure is remembered.
    pub window: Duration,
    /// Failures inside the window that trigger the long pause.
    pub max_failures: usize,
    /// Delay after an isolated failure.
    pub short_delay: Duration,
    /// Delay after a burst of failures.
    pub long_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_failures: 5,
            short_delay: Duration::from_secs(5),
            long_delay: Duration::from_secs(5 * 60),
        }
    }
}

/// Rolling window of recent failure timestamps.
#[derive(Debug)]
pub struct FailureWindow {
    policy: RetryPolicy,
    failures: VecDeque<Instant>,
}

impl FailureWindow {
    /// Create an empty window.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: VecDeque::new(),
        }
    }

    /// Record a failure at `now` and return how long to wait before retrying.
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        while let Some(oldest) = self.failures.front() {
            if now.duration_since(*oldest) >= self.policy.window {
                self.failures.pop_front();
            } else {
                break;
            }
        }

        self.failures.push_back(now);

        if self.failures.len() >= self.policy.max_failures {
            self.failures.clear();
            self.policy.long_delay
        } else {
            self.policy.short_delay
        }
    }

    /// Number of failures currently inside the window.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Whether no failures are remembered.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl Default for FailureWindow {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

/// Run `op` until it succeeds, sleeping between attempts according to the
/// shared failure window.
pub async fn retry_forever<T, E, F, Fut>(window: &Mutex<FailureWindow>, label: &str, mut op: F) -> T
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    loop {
        match op().await {
            Ok(value) => return value,
            Err(e) => {
                let delay = match window.lock() {
                    Ok(mut guard) => guard.record_failure(Instant::now()),
                    Err(poisoned) => poisoned.into_inner().record_failure(Instant::now()),
                };
                warn!("[{}] Attempt failed: {}, retrying in {:?}", label, e, delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

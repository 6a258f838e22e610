//! Configuration for the owning service.

use platsync_protocol::{join_url, INBOUND_PLATFORMS};
use std::time::Duration;

/// Default address of the follower's inbound endpoint.
pub const DEFAULT_FOLLOWER_ADDRESS: &str = "http://localhost:6000";

/// Configuration for the best-effort push to a follower.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushConfig {
    /// Base address of the follower.
    pub follower_address: String,
    /// Path of the inbound endpoint on the follower.
    pub path: String,
}

impl PushConfig {
    /// Creates a push configuration for the given follower address.
    pub fn new(follower_address: impl Into<String>) -> Self {
        Self {
            follower_address: follower_address.into(),
            path: INBOUND_PLATFORMS.to_string(),
        }
    }

    /// Returns the full push URL.
    pub fn push_url(&self) -> String {
        join_url(&self.follower_address, &self.path)
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FOLLOWER_ADDRESS)
    }
}

/// Bounded, linearly increasing retry schedule for the schema migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay unit; the wait after failed attempt `k` is `base_delay * k`.
    pub base_delay: Duration,
}

impl MigrationRetryPolicy {
    /// Creates a policy with the given attempt limit and a 2 second base delay.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(2000),
        }
    }

    /// Creates a policy that tries once.
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Returns the wait after failed attempt `attempt` (1-indexed), or `None`
    /// when no further attempt follows.
    ///
    /// A product that overflows `Duration` saturates at `Duration::MAX`.
    pub fn delay_after_failure(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        Some(self.base_delay.saturating_mul(attempt))
    }

    /// Returns every wait the policy can produce, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts)
            .filter_map(|attempt| self.delay_after_failure(attempt))
            .collect()
    }
}

impl Default for MigrationRetryPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}

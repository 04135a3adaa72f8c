//! Rate limiting backends
//!
//! The HTTP layer only sees [`RateLimitBackend`]. The in-process limiter
//! suits single-instance deployments; running several API instances behind a
//! load balancer needs a shared backend implementing the same trait.

mod memory;

pub use memory::InMemoryRateLimiter;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Result of counting one request against a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Milliseconds until the current window resets
    pub reset_ms: u64,
    pub window_ms: u64,
}

impl RateLimitDecision {
    /// Whole seconds for a `Retry-After` header, rounded up
    pub fn retry_after_secs(&self) -> u64 {
        self.reset_ms.div_ceil(1000)
    }
}

#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Count one request for `key` and decide whether it may proceed
    async fn check(&self, key: &str) -> Result<RateLimitDecision>;

    fn limit(&self) -> u32;

    fn window(&self) -> Duration;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_rounds_up() {
        let decision = RateLimitDecision {
            allowed: false,
            limit: 1,
            remaining: 0,
            reset_ms: 1001,
            window_ms: 60_000,
        };
        assert_eq!(decision.retry_after_secs(), 2);
        assert_eq!(
            RateLimitDecision {
                reset_ms: 0,
                ..decision
            }
            .retry_after_secs(),
            0
        );
    }
}

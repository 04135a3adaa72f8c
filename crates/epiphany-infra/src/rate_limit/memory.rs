use anyhow::Result;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{RateLimitBackend, RateLimitDecision};

const DEFAULT_SHARDS: usize = 16;
const DEFAULT_MAX_BUCKETS: usize = 10_000;

#[derive(Clone)]
struct Bucket {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window counter per key, held in process memory.
///
/// Keys are spread over several independently locked shards. Each shard
/// holds at most `max_buckets` keys; expired buckets are dropped first and
/// the bucket closest to its reset is evicted after that.
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    shards: Vec<Arc<Mutex<HashMap<String, Bucket>>>>,
    limit: u32,
    window: Duration,
    max_buckets: usize,
}

impl InMemoryRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self::with_shards(limit, window, DEFAULT_SHARDS)
    }

    pub fn with_shards(limit: u32, window: Duration, shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| Arc::new(Mutex::new(HashMap::new())))
            .collect();
        Self {
            shards,
            limit,
            window,
            max_buckets: DEFAULT_MAX_BUCKETS,
        }
    }

    fn shard(&self, key: &str) -> &Arc<Mutex<HashMap<String, Bucket>>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Drop buckets whose window has ended
    pub async fn cleanup_expired_buckets(&self) {
        let now = Instant::now();
        let mut cleaned = 0;
        for shard in &self.shards {
            let mut buckets = shard.lock().await;
            let before = buckets.len();
            buckets.retain(|_, bucket| bucket.reset_at > now);
            cleaned += before - buckets.len();
        }
        if cleaned > 0 {
            tracing::debug!(buckets_cleaned = cleaned, "Cleaned up expired rate limit buckets");
        }
    }

    /// Run `cleanup_expired_buckets` every window until the runtime stops
    pub fn spawn_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(limiter.window.max(Duration::from_secs(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                limiter.cleanup_expired_buckets().await;
            }
        })
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryRateLimiter {
    async fn check(&self, key: &str) -> Result<RateLimitDecision> {
        let now = Instant::now();
        let mut buckets = self.shard(key).lock().await;

        if buckets.len() >= self.max_buckets && !buckets.contains_key(key) {
            buckets.retain(|_, bucket| bucket.reset_at > now);
            if buckets.len() >= self.max_buckets {
                let oldest = buckets
                    .iter()
                    .min_by_key(|(_, bucket)| bucket.reset_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    buckets.remove(&oldest);
                }
            }
        }

        let bucket = buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            count: 0,
            reset_at: now + self.window,
        });
        if now >= bucket.reset_at {
            bucket.count = 0;
            bucket.reset_at = now + self.window;
        }
        bucket.count = bucket.count.saturating_add(1);

        Ok(RateLimitDecision {
            allowed: bucket.count <= self.limit,
            limit: self.limit,
            remaining: self.limit.saturating_sub(bucket.count),
            reset_ms: bucket.reset_at.saturating_duration_since(now).as_millis() as u64,
            window_ms: self.window.as_millis() as u64,
        })
    }

    fn limit(&self) -> u32 {
        self.limit
    }

    fn window(&self) -> Duration {
        self.window
    }
}

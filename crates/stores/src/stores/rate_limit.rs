//! Rate limiting for Redis.

use anyhow::Result;
use async_trait::async_trait;

/// Rate limiter trait for presence-marker throttling.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Create-if-absent marker with a TTL. `Limited` when the marker already
    /// existed (someone acted within the window); no release step, the
    /// marker self-expires.
    async fn check_throttle(&self, key: &str, ttl_secs: u64) -> Result<RateLimitResult>;
}

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,
    Limited,
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed)
    }
}

/// Redis implementation of RateLimiter.
#[derive(Clone)]
pub struct RedisRateLimiter {
    client: redis::Client,
}

impl RedisRateLimiter {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check_throttle(&self, key: &str, ttl_secs: u64) -> Result<RateLimitResult> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // SET NX EX creates the marker and its expiry in one round-trip;
        // a nil reply means another request holds the window.
        let created: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;

        if created.is_some() {
            Ok(RateLimitResult::Allowed)
        } else {
            Ok(RateLimitResult::Limited)
        }
    }
}

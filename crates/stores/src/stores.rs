//! Ephemeral stores (Redis).
//!
//! This module contains traits and implementations for the contended
//! aggregate state both features keep in Redis. Carts expire as a unit when
//! idle; poll tallies persist until external cleanup, except for the
//! self-expiring throttle markers and results cache.
//!
//! ## Stores
//!
//! - **cart** - Per-session line items, metadata cache and promo code
//! - **poll** - Vote counters, recent-votes log, dedup sets, results cache
//! - **rate_limit** - Presence-marker throttling (create-if-absent + TTL)
//!
//! ## Redis Key Patterns
//!
//! ```text
//! cart:{session}:qty           → hash product_id → quantity
//! cart:{session}:details       → hash product_id → ProductDetails JSON
//! cart:{session}:promo_code    → string (all three share one TTL)
//! poll:{id}                    → hash option_id → vote count
//! poll:{id}:recent_votes       → list of VoteRecord JSON, newest first
//! poll:{id}:voted_user         → set of voter ids that already voted
//! poll:{id}:voted_ips          → set of origin addresses that already voted
//! poll:{id}:results_cache      → cached results blob (own TTL)
//! ratelimit:vote:{origin}      → throttle marker (5s TTL, self-expires)
//! ```

mod cart;
mod poll;
mod rate_limit;

pub use cart::{CartStore, DecrementOutcome, RedisCartStore};
pub use poll::{DedupAxis, PollTallyStore, RedisPollTallyStore};
pub use rate_limit::{RateLimitResult, RateLimiter, RedisRateLimiter};

#[cfg(test)]
pub use cart::MockCartStore;
#[cfg(test)]
pub use poll::MockPollTallyStore;
#[cfg(test)]
pub use rate_limit::MockRateLimiter;

use std::sync::Arc;

use crate::config::Config;

/// Collection of all ephemeral stores.
#[derive(Clone)]
pub struct Stores {
    pub cart: Arc<dyn CartStore>,
    pub poll: Arc<dyn PollTallyStore>,
    pub rate_limiter: Arc<dyn RateLimiter>,
}

impl Stores {
    /// Wire every store to the given Redis client. The client is injected,
    /// never a process-wide singleton.
    pub fn redis(client: redis::Client, config: &Config) -> Self {
        Self {
            cart: Arc::new(RedisCartStore::new(client.clone(), config.cart_ttl_secs)),
            poll: Arc::new(RedisPollTallyStore::new(client.clone())),
            rate_limiter: Arc::new(RedisRateLimiter::new(client)),
        }
    }
}

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub redis_url: String,
    /// Idle lifetime of a cart's three sub-keys, refreshed on every mutation.
    #[serde(default = "default_cart_ttl_secs")]
    pub cart_ttl_secs: u64,
    /// Lifetime of a cached poll results snapshot.
    #[serde(default = "default_results_cache_ttl_secs")]
    pub results_cache_ttl_secs: u64,
    /// Lifetime of the per-origin vote throttle marker.
    #[serde(default = "default_vote_throttle_secs")]
    pub vote_throttle_secs: u64,
    /// Set to "production" for JSON logging, anything else for human-readable.
    #[serde(default)]
    pub env: String,
}

fn default_cart_ttl_secs() -> u64 {
    60 * 60
}

fn default_results_cache_ttl_secs() -> u64 {
    60 * 60
}

fn default_vote_throttle_secs() -> u64 {
    5
}

impl Config {
    /// Load from `STORES_`-prefixed environment variables.
    pub fn from_env() -> Result<Self> {
        let config = envy::prefixed("STORES_").from_env::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.redis_url.is_empty(), "redis_url must not be empty");
        anyhow::ensure!(self.cart_ttl_secs > 0, "cart_ttl_secs must be positive");
        anyhow::ensure!(
            self.results_cache_ttl_secs > 0,
            "results_cache_ttl_secs must be positive"
        );
        anyhow::ensure!(
            self.vote_throttle_secs > 0,
            "vote_throttle_secs must be positive"
        );
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.env == "production"
    }
}

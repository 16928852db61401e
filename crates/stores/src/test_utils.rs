//! Shared test utilities.
//!
//! Small factories for the fixtures most tests need: a config with dummy
//! values, an active poll snapshot and a plain vote request.

use std::collections::BTreeMap;

use crate::config::Config;
use crate::models::PollSnapshot;
use crate::votes::VoteRequest;

/// Creates a test configuration with dummy values.
pub fn test_config() -> Config {
    Config {
        redis_url: "redis://test".to_string(),
        cart_ttl_secs: 3600,
        results_cache_ttl_secs: 3600,
        vote_throttle_secs: 5,
        env: "test".to_string(),
    }
}

/// Creates an active, unexpiring poll with the given option ids.
pub fn poll_snapshot(id: &str, option_ids: &[&str]) -> PollSnapshot {
    PollSnapshot {
        id: id.to_string(),
        question: "?".to_string(),
        options: option_ids
            .iter()
            .map(|&option_id| (option_id.to_string(), format!("Option {}", option_id)))
            .collect::<BTreeMap<_, _>>(),
        is_active: true,
        expires_at: None,
    }
}

/// Creates a vote request whose cookie check passed.
pub fn vote_request(voter_id: Option<&str>, origin: &str, option_id: &str) -> VoteRequest {
    VoteRequest {
        voter_id: voter_id.map(str::to_string),
        origin: origin.to_string(),
        option_id: option_id.to_string(),
        cookie_already_voted: false,
    }
}

//! Vote admission workflow.
//!
//! The ordering of checks here is a correctness contract: every check that
//! cannot mutate state (poll status, option validity, throttle, cookie)
//! runs before the irreversible dedup-set registrations, and the tally is
//! only touched once every guard has passed. A rejected vote never writes
//! partial tally state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::models::{PollSnapshot, VoteRecord};
use crate::stores::{DedupAxis, PollTallyStore, RateLimiter};

/// A vote attempt as the HTTP layer hands it over. Identity is supplied,
/// not verified, and the session-cookie dedup result arrives pre-computed.
#[derive(Debug, Clone)]
pub struct VoteRequest {
    /// Authenticated user id, when one was supplied.
    pub voter_id: Option<String>,
    /// Client origin address.
    pub origin: String,
    pub option_id: String,
    /// Result of the caller's cookie-based dedup check.
    pub cookie_already_voted: bool,
}

/// Which dedup axis rejected the vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteRejection {
    Cookie,
    User,
    Origin,
}

/// Outcome of a vote attempt. Rejections are values, not errors; only a
/// store failure surfaces as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    Accepted,
    PollInactive,
    PollExpired,
    InvalidOption,
    /// Malformed request, rejected before any store round-trip.
    InvalidRequest(&'static str),
    RateLimited,
    AlreadyVoted(VoteRejection),
}

impl VoteOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, VoteOutcome::Accepted)
    }
}

/// Derived results view: every option filled in, zero counts included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResults {
    pub poll_id: String,
    pub question: String,
    pub results: BTreeMap<String, i64>,
    pub total_votes: i64,
}

/// Vote admission and results over the tally store.
#[derive(Clone)]
pub struct PollService {
    tally: Arc<dyn PollTallyStore>,
    rate_limiter: Arc<dyn RateLimiter>,
    throttle_ttl_secs: u64,
    results_cache_ttl_secs: u64,
}

fn throttle_key(origin: &str) -> String {
    format!("ratelimit:vote:{}", origin)
}

impl PollService {
    pub fn new(
        tally: Arc<dyn PollTallyStore>,
        rate_limiter: Arc<dyn RateLimiter>,
        config: &Config,
    ) -> Self {
        Self {
            tally,
            rate_limiter,
            throttle_ttl_secs: config.vote_throttle_secs,
            results_cache_ttl_secs: config.results_cache_ttl_secs,
        }
    }

    /// Run the admission checks in order and record the vote if they all
    /// pass. `now` is a unix timestamp used for the expiry check.
    pub async fn submit_vote(
        &self,
        poll: &PollSnapshot,
        request: &VoteRequest,
        now: i64,
    ) -> Result<VoteOutcome> {
        if !poll.is_active {
            return Ok(VoteOutcome::PollInactive);
        }
        if poll.is_expired(now) {
            return Ok(VoteOutcome::PollExpired);
        }
        if !poll.options.contains_key(&request.option_id) {
            return Ok(VoteOutcome::InvalidOption);
        }
        if request.origin.is_empty() {
            return Ok(VoteOutcome::InvalidRequest("origin address is required"));
        }

        let throttle = self
            .rate_limiter
            .check_throttle(&throttle_key(&request.origin), self.throttle_ttl_secs)
            .await?;
        if !throttle.is_allowed() {
            tracing::info!(poll_id = %poll.id, origin = %request.origin, "vote throttled");
            return Ok(VoteOutcome::RateLimited);
        }

        // Registering on a dedup set is irreversible, so the cookie verdict
        // is consulted first: a cookie-rejected vote must not mark its user
        // or origin as having voted.
        if request.cookie_already_voted {
            return Ok(VoteOutcome::AlreadyVoted(VoteRejection::Cookie));
        }

        if let Some(voter_id) = &request.voter_id {
            let newly_added = self
                .tally
                .try_register_vote(&poll.id, voter_id, DedupAxis::User)
                .await?;
            if !newly_added {
                return Ok(VoteOutcome::AlreadyVoted(VoteRejection::User));
            }
        }

        let newly_added = self
            .tally
            .try_register_vote(&poll.id, &request.origin, DedupAxis::Origin)
            .await?;
        if !newly_added {
            return Ok(VoteOutcome::AlreadyVoted(VoteRejection::Origin));
        }

        let record = VoteRecord {
            voter_id: request
                .voter_id
                .clone()
                .unwrap_or_else(|| "anonymous".to_string()),
            origin: request.origin.clone(),
            option_id: request.option_id.clone(),
        };
        self.tally.record_vote(&poll.id, &record).await?;

        tracing::info!(poll_id = %poll.id, option_id = %request.option_id, "vote recorded");
        Ok(VoteOutcome::Accepted)
    }

    /// Results for a poll, served from the cache when possible. A miss
    /// recomputes from the counters and repopulates the cache.
    pub async fn results(&self, poll: &PollSnapshot) -> Result<PollResults> {
        if let Some(blob) = self.tally.cached_results(&poll.id).await? {
            if let Ok(cached) = serde_json::from_str::<PollResults>(&blob) {
                return Ok(cached);
            }
            // Unreadable blob: fall through and rebuild it.
            tracing::warn!(poll_id = %poll.id, "discarding unreadable results cache");
        }

        let counts = self.tally.vote_counts(&poll.id).await?;
        let results = merge_results(poll, &counts);

        self.tally
            .cache_results(
                &poll.id,
                &serde_json::to_string(&results)?,
                self.results_cache_ttl_secs,
            )
            .await?;

        Ok(results)
    }
}

/// Fill in zero counts for options nobody has voted for and total the rest.
pub fn merge_results(poll: &PollSnapshot, counts: &HashMap<String, i64>) -> PollResults {
    let mut results: BTreeMap<String, i64> = counts
        .iter()
        .map(|(option_id, &count)| (option_id.clone(), count))
        .collect();

    for option_id in poll.options.keys() {
        results.entry(option_id.clone()).or_insert(0);
    }

    let total_votes = results.values().sum();

    PollResults {
        poll_id: poll.id.clone(),
        question: poll.question.clone(),
        results,
        total_votes,
    }
}

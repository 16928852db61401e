//! Poll tally storage for Redis.
//!
//! Counters are the source of truth; the results cache is a derived blob
//! that is deleted on every accepted vote and repopulated on the next read.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;

use crate::models::VoteRecord;

/// Cap on the recent-votes log; older entries are dropped, not archived.
const RECENT_VOTES_CAP: isize = 100;

/// The two independent dedup axes. A voter may be blocked by either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupAxis {
    /// Authenticated user id.
    User,
    /// Origin address.
    Origin,
}

impl DedupAxis {
    fn key_suffix(self) -> &'static str {
        match self {
            DedupAxis::User => "voted_user",
            DedupAxis::Origin => "voted_ips",
        }
    }
}

/// Store for poll tally operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PollTallyStore: Send + Sync {
    /// Minimal counter primitive: atomic increment of one option's count.
    async fn increment_vote(&self, poll_id: &str, option_id: &str) -> Result<()>;

    /// Mark an identity as having voted on the given axis. True iff the
    /// identity was newly added, so exactly one concurrent caller wins.
    async fn try_register_vote(
        &self,
        poll_id: &str,
        identity: &str,
        axis: DedupAxis,
    ) -> Result<bool>;

    /// The core write path: increment the counter, push the vote onto the
    /// recent log and trim it, all in one atomic batch; then invalidate the
    /// results cache.
    async fn record_vote(&self, poll_id: &str, record: &VoteRecord) -> Result<()>;

    /// All counters for a poll; empty map when nobody has voted yet.
    async fn vote_counts(&self, poll_id: &str) -> Result<HashMap<String, i64>>;

    /// Most recent votes, newest first, at most 100.
    async fn recent_votes(&self, poll_id: &str) -> Result<Vec<VoteRecord>>;

    /// Cached results blob, if one is set and unexpired.
    async fn cached_results(&self, poll_id: &str) -> Result<Option<String>>;

    /// Store a pre-serialized results blob with its own TTL.
    async fn cache_results(&self, poll_id: &str, data: &str, ttl_secs: u64) -> Result<()>;
}

/// Redis implementation of PollTallyStore.
#[derive(Clone)]
pub struct RedisPollTallyStore {
    client: redis::Client,
}

impl RedisPollTallyStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    fn votes_key(poll_id: &str) -> String {
        format!("poll:{}", poll_id)
    }

    fn recent_key(poll_id: &str) -> String {
        format!("poll:{}:recent_votes", poll_id)
    }

    fn dedup_key(poll_id: &str, axis: DedupAxis) -> String {
        format!("poll:{}:{}", poll_id, axis.key_suffix())
    }

    fn cache_key(poll_id: &str) -> String {
        format!("poll:{}:results_cache", poll_id)
    }
}

#[async_trait]
impl PollTallyStore for RedisPollTallyStore {
    async fn increment_vote(&self, poll_id: &str, option_id: &str) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let _: () = conn.hincr(Self::votes_key(poll_id), option_id, 1).await?;
        Ok(())
    }

    async fn try_register_vote(
        &self,
        poll_id: &str,
        identity: &str,
        axis: DedupAxis,
    ) -> Result<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let added: i64 = conn.sadd(Self::dedup_key(poll_id, axis), identity).await?;
        Ok(added == 1)
    }

    async fn record_vote(&self, poll_id: &str, record: &VoteRecord) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let recent_key = Self::recent_key(poll_id);

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hincr(Self::votes_key(poll_id), &record.option_id, 1)
            .ignore();
        pipe.lpush(&recent_key, serde_json::to_string(record)?)
            .ignore();
        pipe.ltrim(&recent_key, 0, RECENT_VOTES_CAP - 1).ignore();
        let _: () = pipe.query_async(&mut conn).await?;

        // Second, non-atomic step: a momentarily stale cache is harmless and
        // self-heals on the next results read.
        let _: () = conn.del(Self::cache_key(poll_id)).await?;

        Ok(())
    }

    async fn vote_counts(&self, poll_id: &str) -> Result<HashMap<String, i64>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let counts: HashMap<String, i64> = conn.hgetall(Self::votes_key(poll_id)).await?;
        Ok(counts)
    }

    async fn recent_votes(&self, poll_id: &str) -> Result<Vec<VoteRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let raw: Vec<String> = conn
            .lrange(Self::recent_key(poll_id), 0, RECENT_VOTES_CAP - 1)
            .await?;

        Ok(raw
            .iter()
            .filter_map(|entry| serde_json::from_str(entry).ok())
            .collect())
    }

    async fn cached_results(&self, poll_id: &str) -> Result<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let blob: Option<String> = conn.get(Self::cache_key(poll_id)).await?;
        Ok(blob)
    }

    async fn cache_results(&self, poll_id: &str, data: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let _: () = conn.set_ex(Self::cache_key(poll_id), data, ttl_secs).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_axes_map_to_distinct_sets() {
        assert_eq!(
            RedisPollTallyStore::dedup_key("42", DedupAxis::User),
            "poll:42:voted_user"
        );
        assert_eq!(
            RedisPollTallyStore::dedup_key("42", DedupAxis::Origin),
            "poll:42:voted_ips"
        );
    }

    #[test]
    fn tally_keys_share_the_poll_prefix() {
        assert_eq!(RedisPollTallyStore::votes_key("42"), "poll:42");
        assert_eq!(
            RedisPollTallyStore::recent_key("42"),
            "poll:42:recent_votes"
        );
        assert_eq!(
            RedisPollTallyStore::cache_key("42"),
            "poll:42:results_cache"
        );
    }
}

//! Cart storage for Redis.
//!
//! A cart is three keys sharing one TTL: a quantities hash, a details hash
//! and an optional promo code. Every mutation refreshes the TTL inside the
//! same atomic pipeline, so a just-written key never sits without an expiry.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;

use crate::models::{CartItem, ProductDetails};

/// Bound on the decrement watch/retry loop.
const MAX_DECREMENT_ATTEMPTS: usize = 5;

/// Result of a quantity decrement.
///
/// Exhausted retries are reported distinctly from a missing product so
/// callers can retry at a higher level instead of treating contention as
/// "not in cart".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecrementOutcome {
    /// Quantity lowered; carries the new value.
    Updated(i64),
    /// Quantity dropped below 1; product removed from the cart.
    Removed,
    /// Product was not in the cart.
    NotFound,
    /// Concurrent writers kept invalidating the watched key.
    ContentionExhausted,
}

/// Store for per-session cart operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Add `quantity` of a product, writing its metadata once (first add
    /// wins). Negative quantities are accepted; the caller validates.
    async fn add_item(
        &self,
        session_id: &str,
        product_id: &str,
        quantity: i64,
        name: &str,
        price: f64,
    ) -> Result<()>;

    /// All products present in both the quantities and details hashes.
    /// Quantity entries with no matching details are silently skipped.
    async fn get_cart(&self, session_id: &str) -> Result<Vec<CartItem>>;

    /// Remove a product from both hashes; clears the promo code when this
    /// empties the cart.
    async fn remove_item(&self, session_id: &str, product_id: &str) -> Result<()>;

    /// Atomic increment; creates the entry at `step` if absent.
    async fn increment_quantity(&self, session_id: &str, product_id: &str, step: i64)
        -> Result<()>;

    /// Decrement under optimistic concurrency control; removes the product
    /// once the quantity would drop below 1. `step` must be positive.
    async fn decrement_quantity(
        &self,
        session_id: &str,
        product_id: &str,
        step: i64,
    ) -> Result<DecrementOutcome>;

    /// Overwrite the stored quantity. Returns false if the product is not
    /// in the cart.
    async fn set_quantity(&self, session_id: &str, product_id: &str, quantity: i64)
        -> Result<bool>;

    /// Overwrite both the metadata record and the quantity in one batch.
    async fn update_item(
        &self,
        session_id: &str,
        product_id: &str,
        name: &str,
        price: f64,
        quantity: i64,
    ) -> Result<()>;

    /// Delete all three cart keys.
    async fn clear(&self, session_id: &str) -> Result<()>;

    /// Store the promo code and refresh the cart TTL.
    async fn set_promo_code(&self, session_id: &str, code: &str) -> Result<()>;

    /// Plain read, no side effects.
    async fn promo_code(&self, session_id: &str) -> Result<Option<String>>;
}

/// Redis implementation of CartStore.
#[derive(Clone)]
pub struct RedisCartStore {
    client: redis::Client,
    ttl_secs: u64,
}

impl RedisCartStore {
    pub fn new(client: redis::Client, ttl_secs: u64) -> Self {
        Self { client, ttl_secs }
    }

    fn qty_key(session_id: &str) -> String {
        format!("cart:{}:qty", session_id)
    }

    fn details_key(session_id: &str) -> String {
        format!("cart:{}:details", session_id)
    }

    fn promo_key(session_id: &str) -> String {
        format!("cart:{}:promo_code", session_id)
    }

    /// Queue TTL refreshes for all three cart keys on the given pipeline.
    /// Always bundled with the mutation that justifies them.
    fn refresh_ttl(&self, pipe: &mut redis::Pipeline, session_id: &str) {
        let ttl = self.ttl_secs as i64;
        pipe.expire(Self::qty_key(session_id), ttl).ignore();
        pipe.expire(Self::details_key(session_id), ttl).ignore();
        pipe.expire(Self::promo_key(session_id), ttl).ignore();
    }
}

#[async_trait]
impl CartStore for RedisCartStore {
    async fn add_item(
        &self,
        session_id: &str,
        product_id: &str,
        quantity: i64,
        name: &str,
        price: f64,
    ) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let details = ProductDetails {
            product_id: product_id.to_string(),
            name: name.to_string(),
            price,
        };

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hincr(Self::qty_key(session_id), product_id, quantity)
            .ignore();
        // HSETNX keeps the first add's metadata; later adds never overwrite.
        pipe.hset_nx(
            Self::details_key(session_id),
            product_id,
            serde_json::to_string(&details)?,
        )
        .ignore();
        self.refresh_ttl(&mut pipe, session_id);
        let _: () = pipe.query_async(&mut conn).await?;

        Ok(())
    }

    async fn get_cart(&self, session_id: &str) -> Result<Vec<CartItem>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // Not transactional across the two hashes: a concurrent removal may
        // leave a quantity briefly visible, which the join below drops.
        let qtys: HashMap<String, i64> = conn.hgetall(Self::qty_key(session_id)).await?;
        let details: HashMap<String, String> = conn.hgetall(Self::details_key(session_id)).await?;

        Ok(join_items(&qtys, &details))
    }

    async fn remove_item(&self, session_id: &str, product_id: &str) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let qty_key = Self::qty_key(session_id);

        let had_product: bool = conn.hexists(&qty_key, product_id).await?;
        let len: i64 = conn.hlen(&qty_key).await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hdel(&qty_key, product_id).ignore();
        pipe.hdel(Self::details_key(session_id), product_id).ignore();
        if had_product && len <= 1 {
            // Last item leaving the cart takes the promo code with it.
            pipe.del(Self::promo_key(session_id)).ignore();
        }
        self.refresh_ttl(&mut pipe, session_id);
        let _: () = pipe.query_async(&mut conn).await?;

        Ok(())
    }

    async fn increment_quantity(
        &self,
        session_id: &str,
        product_id: &str,
        step: i64,
    ) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hincr(Self::qty_key(session_id), product_id, step)
            .ignore();
        self.refresh_ttl(&mut pipe, session_id);
        let _: () = pipe.query_async(&mut conn).await?;

        Ok(())
    }

    async fn decrement_quantity(
        &self,
        session_id: &str,
        product_id: &str,
        step: i64,
    ) -> Result<DecrementOutcome> {
        anyhow::ensure!(step >= 1, "decrement step must be positive");

        let qty_key = Self::qty_key(session_id);
        let details_key = Self::details_key(session_id);

        // WATCH state lives on the connection, so this path needs one that
        // no other in-flight operation shares. `get_multiplexed_async_connection`
        // opens a fresh connection per call, which gives us exactly that.
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        for attempt in 0..MAX_DECREMENT_ATTEMPTS {
            let _: () = redis::cmd("WATCH")
                .arg(&qty_key)
                .query_async(&mut conn)
                .await?;

            // Read outside the queued transaction; the WATCH above turns a
            // concurrent write into an aborted EXEC below.
            let current: Option<i64> = conn.hget(&qty_key, product_id).await?;
            let current = match current {
                Some(qty) => qty,
                None => {
                    let _: () = redis::cmd("UNWATCH").query_async(&mut conn).await?;
                    return Ok(DecrementOutcome::NotFound);
                }
            };
            let new_qty = current - step;

            let mut pipe = redis::pipe();
            pipe.atomic();
            if new_qty < 1 {
                pipe.hdel(&qty_key, product_id).ignore();
                pipe.hdel(&details_key, product_id).ignore();
            } else {
                pipe.hset(&qty_key, product_id, new_qty).ignore();
            }
            self.refresh_ttl(&mut pipe, session_id);

            // EXEC replies nil when the watched key changed since the read.
            let committed: Option<()> = pipe.query_async(&mut conn).await?;
            if committed.is_some() {
                return Ok(if new_qty < 1 {
                    DecrementOutcome::Removed
                } else {
                    DecrementOutcome::Updated(new_qty)
                });
            }

            tracing::debug!(session_id, product_id, attempt, "decrement conflicted, retrying");
        }

        tracing::warn!(session_id, product_id, "decrement retries exhausted");
        Ok(DecrementOutcome::ContentionExhausted)
    }

    async fn set_quantity(
        &self,
        session_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> Result<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let qty_key = Self::qty_key(session_id);

        // Quantity lives in the qty hash only; the copy once embedded in the
        // details record is deprecated and no longer written.
        let exists: bool = conn.hexists(&qty_key, product_id).await?;
        if !exists {
            return Ok(false);
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hset(&qty_key, product_id, quantity).ignore();
        self.refresh_ttl(&mut pipe, session_id);
        let _: () = pipe.query_async(&mut conn).await?;

        Ok(true)
    }

    async fn update_item(
        &self,
        session_id: &str,
        product_id: &str,
        name: &str,
        price: f64,
        quantity: i64,
    ) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let details = ProductDetails {
            product_id: product_id.to_string(),
            name: name.to_string(),
            price,
        };

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hset(
            Self::details_key(session_id),
            product_id,
            serde_json::to_string(&details)?,
        )
        .ignore();
        pipe.hset(Self::qty_key(session_id), product_id, quantity)
            .ignore();
        self.refresh_ttl(&mut pipe, session_id);
        let _: () = pipe.query_async(&mut conn).await?;

        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.del(Self::qty_key(session_id)).ignore();
        pipe.del(Self::details_key(session_id)).ignore();
        pipe.del(Self::promo_key(session_id)).ignore();
        let _: () = pipe.query_async(&mut conn).await?;

        Ok(())
    }

    async fn set_promo_code(&self, session_id: &str, code: &str) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.set(Self::promo_key(session_id), code).ignore();
        self.refresh_ttl(&mut pipe, session_id);
        let _: () = pipe.query_async(&mut conn).await?;

        Ok(())
    }

    async fn promo_code(&self, session_id: &str) -> Result<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let code: Option<String> = conn.get(Self::promo_key(session_id)).await?;
        Ok(code)
    }
}

/// Join the quantities hash with the details hash into the read view.
/// Orphan quantities (no metadata yet, or metadata that fails to parse) are
/// dropped; that inconsistency is recoverable, not an error.
fn join_items(qtys: &HashMap<String, i64>, details: &HashMap<String, String>) -> Vec<CartItem> {
    let mut items: Vec<CartItem> = qtys
        .iter()
        .filter_map(|(product_id, &quantity)| {
            let raw = details.get(product_id)?;
            let detail: ProductDetails = serde_json::from_str(raw).ok()?;
            Some(CartItem {
                product_id: detail.product_id,
                name: detail.name,
                price: detail.price,
                quantity,
            })
        })
        .collect();

    // Redis hash order is arbitrary; sort for a stable view.
    items.sort_by(|a, b| a.product_id.cmp(&b.product_id));
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details_json(product_id: &str, name: &str, price: f64) -> String {
        serde_json::to_string(&ProductDetails {
            product_id: product_id.to_string(),
            name: name.to_string(),
            price,
        })
        .unwrap()
    }

    #[test]
    fn join_merges_quantity_with_metadata() {
        let qtys = HashMap::from([("p1".to_string(), 5)]);
        let details = HashMap::from([("p1".to_string(), details_json("p1", "Widget", 9.99))]);

        let items = join_items(&qtys, &details);

        assert_eq!(
            items,
            vec![CartItem {
                product_id: "p1".to_string(),
                name: "Widget".to_string(),
                price: 9.99,
                quantity: 5,
            }]
        );
    }

    #[test]
    fn join_skips_quantities_without_details() {
        let qtys = HashMap::from([("p1".to_string(), 2), ("p2".to_string(), 1)]);
        let details = HashMap::from([("p1".to_string(), details_json("p1", "Widget", 1.5))]);

        let items = join_items(&qtys, &details);

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id, "p1");
    }

    #[test]
    fn join_skips_unparseable_details() {
        let qtys = HashMap::from([("p1".to_string(), 2)]);
        let details = HashMap::from([("p1".to_string(), "not json".to_string())]);

        assert!(join_items(&qtys, &details).is_empty());
    }

    #[test]
    fn join_orders_by_product_id() {
        let qtys = HashMap::from([
            ("b".to_string(), 1),
            ("a".to_string(), 1),
            ("c".to_string(), 1),
        ]);
        let details = HashMap::from([
            ("a".to_string(), details_json("a", "A", 1.0)),
            ("b".to_string(), details_json("b", "B", 2.0)),
            ("c".to_string(), details_json("c", "C", 3.0)),
        ]);

        let ids: Vec<String> = join_items(&qtys, &details)
            .into_iter()
            .map(|item| item.product_id)
            .collect();

        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn cart_keys_share_the_session_prefix() {
        assert_eq!(RedisCartStore::qty_key("s1"), "cart:s1:qty");
        assert_eq!(RedisCartStore::details_key("s1"), "cart:s1:details");
        assert_eq!(RedisCartStore::promo_key("s1"), "cart:s1:promo_code");
    }
}

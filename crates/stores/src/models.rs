use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One read-view line of a cart: metadata joined with the live quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub price: f64,
    pub quantity: i64,
}

/// Write-once product metadata, stored as JSON in the details hash.
///
/// Written on the first `add_item` for a product and never overwritten by
/// later adds, so the cart keeps showing the name/price the shopper saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub product_id: String,
    pub name: String,
    pub price: f64,
}

/// One entry of a poll's recent-votes log (newest first, capped at 100).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter_id: String,
    pub origin: String,
    pub option_id: String,
}

/// Poll metadata from the relational layer, used to validate a vote before
/// any tally state is touched. This crate never loads it itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSnapshot {
    pub id: String,
    pub question: String,
    /// Option id → display label. Vote admission checks membership by id.
    pub options: BTreeMap<String, String>,
    pub is_active: bool,
    /// Unix timestamp; `None` means the poll never expires.
    pub expires_at: Option<i64>,
}

impl PollSnapshot {
    pub fn is_expired(&self, now: i64) -> bool {
        match self.expires_at {
            Some(at) => now >= at,
            None => false,
        }
    }
}

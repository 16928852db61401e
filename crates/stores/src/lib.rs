//! Ephemeral state shared by the cart and poll features.
//!
//! Both features keep short-lived, highly contended aggregate state in Redis
//! and mutate it from many concurrent requests. This crate owns that layer:
//! the store traits, their Redis implementations, and the vote admission
//! workflow that orders dedup checks correctly. HTTP routing, schemas and
//! the relational poll metadata live upstream and are passed in.
//!
//! All coordination is delegated to Redis: atomic pipelines for multi-key
//! writes, `WATCH`/`MULTI`/`EXEC` with bounded retry where an operation must
//! branch on a value it just read, and `SET NX EX` for self-expiring
//! throttle markers. There is no in-process shared mutable state.

pub mod config;
pub mod models;
pub mod stores;
pub mod votes;

#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use stores::Stores;

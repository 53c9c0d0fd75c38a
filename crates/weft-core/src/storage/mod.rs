//! # Storage
//!
//! The durable node/edge repository, backed by redb.

mod redb_store;

pub use redb_store::{SearchHit, Store, StoreStats, WriteBatch};

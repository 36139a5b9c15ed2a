//! WHEREABOUTS Storage - Durable Store and Two-Tier Cache
//!
//! Defines the durable key/value abstraction for location records, the
//! LMDB-backed implementation, the in-memory TTL cache layered on top of
//! it, and the periodic sweeper that purges expired records.

pub mod cache;
pub mod lmdb;
pub mod store;
pub mod sweeper;

pub use cache::{CacheConfig, LocationCache};
pub use lmdb::{LmdbLocationStore, LmdbStoreError};
pub use store::{LocationStore, MemoryLocationStore};
pub use sweeper::{
    sweep_expired, sweeper_task, SweeperConfig, SweeperMetrics, SweeperSnapshot,
};

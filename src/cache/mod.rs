//! Partitioned response caching with per-request strategies.
//!
//! This module provides:
//! - A `Store` contract over named key → response partitions, with a SQLite
//!   implementation
//! - Cache-first, network-first and stale-while-revalidate resolution
//! - Background refreshes that never block or fail the caller

mod background;
mod storage;
mod strategy;
mod traits;

pub use storage::SqliteStore;
pub use strategy::{Engine, Strategy};
pub use traits::{CacheResult, CacheSource, CachedEntry, Store};

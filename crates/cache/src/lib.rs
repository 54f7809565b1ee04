//! Slot cache: a capacity-bounded LRU cache that multiplexes a fixed range of
//! resource slots (texture units, loaded model handles) across an unbounded
//! stream of keys.
//!
//! # Invariants
//! - Occupancy never exceeds capacity; every resident entry holds a distinct
//!   slot index in `0..capacity`.
//! - The recency chain, the key index and the occupancy always agree.
//! - On eviction, release completes before the vacated slot is produced into.
//! - Structural bookkeeping never suspends; only the provider does.
//!
//! # Layout
//! Entries live in an arena of indexed slots with `prev`/`next` indices
//! threading the recency order. The slot index of an entry is its position in
//! the arena, which keeps the slot ↔ resource mapping explicit.

mod arena;
mod cache;
mod config;
mod error;
mod provider;
mod stats;

pub use arena::SlotIndex;
pub use cache::SlotCache;
pub use config::{CacheConfig, ConfigError, DEFAULT_CAPACITY, EvictionPolicy};
pub use error::{CacheError, InvariantViolation};
pub use provider::{FnProvider, NoRelease, SlotProvider};
pub use stats::{CacheDump, CacheStats, DumpEntry};

pub fn crate_info() -> &'static str {
    "slotcache-core v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("core"));
    }
}

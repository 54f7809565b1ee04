use crate::arena::SlotIndex;

/// Errors surfaced by [`SlotCache::get`](crate::SlotCache::get).
///
/// Producer and releaser faults carry the collaborator's own error as their
/// source. The cache is left consistent in every case: a failed production
/// inserts nothing, a failed release has already committed the eviction.
#[derive(Debug, thiserror::Error)]
pub enum CacheError<E: std::error::Error + 'static> {
    #[error("producer failed for `{key}`")]
    Produce {
        key: String,
        #[source]
        source: E,
    },
    #[error("releaser failed for evicted `{key}`")]
    Release {
        key: String,
        #[source]
        source: E,
    },
    #[error("eviction rejected: cache is full ({capacity} entries), cannot admit `{key}`")]
    EvictionRejected { key: String, capacity: usize },
    #[error("cache structure corrupted: {0}")]
    Corrupted(#[from] InvariantViolation),
}

impl<E: std::error::Error + 'static> CacheError<E> {
    /// The key of the request (or evicted entry) the error concerns.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Produce { key, .. }
            | Self::Release { key, .. }
            | Self::EvictionRejected { key, .. } => Some(key.as_str()),
            Self::Corrupted(InvariantViolation::DuplicateKey { key })
            | Self::Corrupted(InvariantViolation::IndexMismatch { key }) => Some(key.as_str()),
            Self::Corrupted(_) => None,
        }
    }
}

/// A broken structural invariant of the slot arena.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("occupancy {occupancy} exceeds capacity {capacity}")]
    OverCapacity { occupancy: usize, capacity: usize },
    #[error("{linked} entries linked but {indexed} indexed")]
    OccupancyMismatch { linked: usize, indexed: usize },
    #[error("broken link at slot {slot}")]
    BrokenLink { slot: SlotIndex },
    #[error("chain end at slot {slot} has a dangling link")]
    DanglingEnd { slot: SlotIndex },
    #[error("key `{key}` indexed at the wrong slot")]
    IndexMismatch { key: String },
    #[error("{vacant} vacant slots but {free} on the free list")]
    FreeListMismatch { vacant: usize, free: usize },
    #[error("slot {slot} is not vacant")]
    SlotNotVacant { slot: SlotIndex },
    #[error("key `{key}` is already resident")]
    DuplicateKey { key: String },
    #[error("cache is full but has no back entry to evict")]
    MissingBack,
}

use std::fmt;
use std::marker::PhantomData;

use tracing::Instrument;

use crate::arena::{SlotArena, SlotIndex};
use crate::config::{CacheConfig, ConfigError, EvictionPolicy};
use crate::error::{CacheError, InvariantViolation};
use crate::provider::SlotProvider;
use crate::stats::{CacheDump, CacheStats, DumpEntry};

/// Where a miss will land.
enum Admission {
    Vacant(SlotIndex),
    Full,
}

/// Capacity-bounded LRU cache over a fixed range of resource slots.
///
/// Every resident entry occupies one slot index in `0..capacity`. A miss on a
/// full cache evicts the least recently used entry, waits for its release and
/// then produces the new value into the slot the evicted entry held.
///
/// `get` borrows the cache mutably for the whole lookup, including any
/// suspension inside the provider, so lookups never interleave.
pub struct SlotCache<E: ?Sized, P: SlotProvider<E>> {
    provider: P,
    arena: SlotArena<P::Value>,
    policy: EvictionPolicy,
    stats: CacheStats,
    _element: PhantomData<fn(&E)>,
}

impl<E: ?Sized, P: SlotProvider<E>> SlotCache<E, P> {
    pub fn new(provider: P, config: CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        tracing::debug!(capacity = config.capacity, policy = %config.policy, "slot cache created");
        Ok(Self {
            provider,
            arena: SlotArena::new(config.capacity),
            policy: config.policy,
            stats: CacheStats::default(),
            _element: PhantomData,
        })
    }

    /// Create a cache with the default [`EvictionPolicy::Release`].
    pub fn with_capacity(provider: P, capacity: usize) -> Result<Self, ConfigError> {
        Self::new(provider, CacheConfig::new(capacity, EvictionPolicy::default()))
    }

    /// Look up `element`, producing its value on a miss.
    ///
    /// A hit promotes the entry to most recently used and returns a clone of
    /// its value. A miss with room produces into the next vacant slot. A miss
    /// on a full cache evicts the back entry first (subject to the policy),
    /// awaits its release, and reuses its slot.
    pub async fn get(&mut self, element: &E) -> Result<P::Value, CacheError<P::Error>> {
        let key = self.provider.key_of(element);
        let span = tracing::trace_span!("slot_cache_get", key = %key);
        self.lookup_or_admit(key, element).instrument(span).await
    }

    async fn lookup_or_admit(
        &mut self,
        key: String,
        element: &E,
    ) -> Result<P::Value, CacheError<P::Error>> {
        if let Some((slot, value)) = self.arena.touch(&key) {
            let value = value.clone();
            self.stats.hits += 1;
            tracing::debug!(%key, %slot, "hit");
            return Ok(value);
        }
        self.stats.misses += 1;

        let slot = match self.admission() {
            Admission::Vacant(slot) => slot,
            Admission::Full => self.evict(&key).await?,
        };
        self.produce_into(slot, key, element).await
    }

    fn admission(&self) -> Admission {
        match self.arena.vacant_slot() {
            Some(slot) => Admission::Vacant(slot),
            None => Admission::Full,
        }
    }

    /// Commit the eviction of the back entry, then release it. Returns the
    /// vacated slot.
    async fn evict(&mut self, key: &str) -> Result<SlotIndex, CacheError<P::Error>> {
        let capacity = self.arena.capacity();
        if self.policy == EvictionPolicy::Strict {
            self.stats.rejected += 1;
            tracing::warn!(key, capacity, "eviction rejected by strict policy");
            return Err(CacheError::EvictionRejected {
                key: key.to_owned(),
                capacity,
            });
        }

        let evicted = self
            .arena
            .evict_back()
            .ok_or(InvariantViolation::MissingBack)?;
        self.stats.evictions += 1;
        let slot = evicted.slot;
        tracing::debug!(evicted = %evicted.key, %slot, for_key = key, "evicted");

        if self.policy == EvictionPolicy::Release {
            let released = self.provider.release(&evicted.key, evicted.value).await;
            if let Err(source) = released {
                self.stats.release_failures += 1;
                tracing::warn!(evicted = %evicted.key, %slot, error = %source, "release failed");
                return Err(CacheError::Release {
                    key: evicted.key,
                    source,
                });
            }
        }
        Ok(slot)
    }

    async fn produce_into(
        &mut self,
        slot: SlotIndex,
        key: String,
        element: &E,
    ) -> Result<P::Value, CacheError<P::Error>> {
        let value = match self.provider.produce(element, slot).await {
            Ok(value) => value,
            Err(source) => {
                self.stats.produce_failures += 1;
                tracing::warn!(%key, %slot, error = %source, "produce failed");
                return Err(CacheError::Produce { key, source });
            }
        };
        tracing::debug!(%key, %slot, occupancy = self.arena.len() + 1, "inserted");
        self.arena.occupy(slot, key, value.clone())?;
        Ok(value)
    }

    /// Emit the resident keys front to back through `tracing`. Does nothing
    /// on an empty cache.
    pub fn print(&self) {
        for (rank, (slot, key, _)) in self.arena.iter().enumerate() {
            tracing::info!(rank, %slot, key, "resident");
        }
    }

    /// Ordered listing of resident keys, most recently used first.
    pub fn dump(&self) -> CacheDump {
        CacheDump {
            capacity: self.capacity(),
            entries: self
                .arena
                .iter()
                .map(|(slot, key, _)| DumpEntry {
                    slot,
                    key: key.to_owned(),
                })
                .collect(),
        }
    }

    /// Resident keys from most to least recently used.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.arena.iter().map(|(_, key, _)| key)
    }

    /// Value for `key` without promoting it.
    pub fn peek(&self, key: &str) -> Option<&P::Value> {
        self.arena.lookup(key).and_then(|slot| self.arena.value(slot))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.arena.lookup(key).is_some()
    }

    pub fn slot_of(&self, key: &str) -> Option<SlotIndex> {
        self.arena.lookup(key)
    }

    /// Key of the entry the next full miss would evict.
    pub fn lru_key(&self) -> Option<&str> {
        self.arena.back_key()
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    pub fn is_full(&self) -> bool {
        self.arena.is_full()
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    /// Drop every resident entry without releasing it.
    pub fn clear(&mut self) {
        tracing::debug!(dropped = self.arena.len(), "slot cache cleared");
        self.arena.clear();
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.arena.check()
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn into_provider(self) -> P {
        self.provider
    }
}

impl<E: ?Sized, P: SlotProvider<E>> fmt::Debug for SlotCache<E, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotCache")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("policy", &self.policy)
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::{Future, ready};

    #[derive(Debug, PartialEq, Eq, thiserror::Error)]
    #[error("boom: {0}")]
    struct Boom(String);

    /// Provider recording every call; values are `"<key>@<slot>"`.
    #[derive(Default)]
    struct Recorder {
        produced: Vec<(String, SlotIndex)>,
        released: Vec<(String, String)>,
        fail_produce: Option<String>,
        fail_release: bool,
    }

    impl SlotProvider<str> for Recorder {
        type Value = String;
        type Error = Boom;

        fn key_of(&self, element: &str) -> String {
            element.to_owned()
        }

        fn produce(
            &mut self,
            element: &str,
            slot: SlotIndex,
        ) -> impl Future<Output = Result<String, Boom>> {
            self.produced.push((element.to_owned(), slot));
            let result = if self.fail_produce.as_deref() == Some(element) {
                Err(Boom(element.to_owned()))
            } else {
                Ok(format!("{element}@{}", slot.get()))
            };
            ready(result)
        }

        fn release(&mut self, key: &str, value: String) -> impl Future<Output = Result<(), Boom>> {
            self.released.push((key.to_owned(), value));
            ready(if self.fail_release {
                Err(Boom(key.to_owned()))
            } else {
                Ok(())
            })
        }
    }

    fn cache(capacity: usize, policy: EvictionPolicy) -> SlotCache<str, Recorder> {
        SlotCache::new(Recorder::default(), CacheConfig::new(capacity, policy)).unwrap()
    }

    fn get(cache: &mut SlotCache<str, Recorder>, key: &str) -> Result<String, CacheError<Boom>> {
        let result = pollster::block_on(cache.get(key));
        cache.check_invariants().unwrap();
        result
    }

    #[test]
    fn zero_capacity_rejected() {
        let result = SlotCache::<str, _>::with_capacity(Recorder::default(), 0);
        assert!(matches!(result, Err(ConfigError::ZeroCapacity)));
    }

    #[test]
    fn fills_slots_in_insertion_order() {
        let mut c = cache(3, EvictionPolicy::Release);
        assert_eq!(get(&mut c, "a").unwrap(), "a@0");
        assert_eq!(get(&mut c, "b").unwrap(), "b@1");
        assert_eq!(get(&mut c, "c").unwrap(), "c@2");
        assert_eq!(c.len(), 3);
        assert!(c.is_full());
        assert_eq!(c.provider().produced.len(), 3);
    }

    #[test]
    fn hit_does_not_produce() {
        let mut c = cache(2, EvictionPolicy::Release);
        let first = get(&mut c, "a").unwrap();
        let second = get(&mut c, "a").unwrap();
        assert_eq!(first, second);
        assert_eq!(c.provider().produced.len(), 1);
        assert_eq!(c.stats().hits, 1);
        assert_eq!(c.stats().misses, 1);
    }

    #[test]
    fn full_miss_evicts_oldest_and_reuses_its_slot() {
        let mut c = cache(3, EvictionPolicy::Release);
        for k in ["k1", "k2", "k3"] {
            get(&mut c, k).unwrap();
        }
        let k1_slot = c.slot_of("k1").unwrap();

        assert_eq!(get(&mut c, "k4").unwrap(), format!("k4@{}", k1_slot.get()));
        assert!(!c.contains("k1"));
        assert_eq!(c.slot_of("k4"), Some(k1_slot));
        assert_eq!(
            c.provider().released,
            [("k1".to_owned(), "k1@0".to_owned())]
        );
        assert_eq!(c.stats().evictions, 1);
    }

    #[test]
    fn promotion_protects_refreshed_entry() {
        let mut c = cache(3, EvictionPolicy::Release);
        for k in ["A", "B", "C"] {
            get(&mut c, k).unwrap();
        }
        get(&mut c, "A").unwrap();
        get(&mut c, "D").unwrap();

        assert!(c.contains("A"));
        assert!(!c.contains("B"));
        assert_eq!(c.keys().collect::<Vec<_>>(), ["D", "A", "C"]);
    }

    #[test]
    fn two_slot_scenario() {
        let mut c = cache(2, EvictionPolicy::Release);
        assert_eq!(get(&mut c, "x").unwrap(), "x@0");
        assert_eq!(get(&mut c, "y").unwrap(), "y@1");
        get(&mut c, "x").unwrap();
        assert_eq!(get(&mut c, "z").unwrap(), "z@1");

        assert_eq!(c.keys().collect::<Vec<_>>(), ["z", "x"]);
        assert_eq!(c.provider().released[0].0, "y");
        assert_eq!(c.dump().keys(), ["z", "x"]);
    }

    #[test]
    fn silent_policy_evicts_without_release() {
        let mut c = cache(1, EvictionPolicy::Silent);
        get(&mut c, "a").unwrap();
        assert_eq!(get(&mut c, "b").unwrap(), "b@0");
        assert!(c.provider().released.is_empty());
        assert_eq!(c.stats().evictions, 1);
        assert_eq!(c.keys().collect::<Vec<_>>(), ["b"]);
    }

    #[test]
    fn strict_policy_rejects_overflow_without_touching_state() {
        let mut c = cache(2, EvictionPolicy::Strict);
        get(&mut c, "a").unwrap();
        get(&mut c, "b").unwrap();
        let before = c.dump();

        let err = get(&mut c, "c").unwrap_err();
        assert!(matches!(
            err,
            CacheError::EvictionRejected { ref key, capacity: 2 } if key == "c"
        ));
        assert_eq!(c.dump(), before);
        assert_eq!(c.provider().produced.len(), 2);
        assert!(c.provider().released.is_empty());
        assert_eq!(c.stats().rejected, 1);

        // hits still work
        assert_eq!(get(&mut c, "a").unwrap(), "a@0");
    }

    #[test]
    fn produce_failure_with_room_inserts_nothing() {
        let mut c = cache(2, EvictionPolicy::Release);
        c.provider_mut().fail_produce = Some("bad".into());

        let err = get(&mut c, "bad").unwrap_err();
        assert!(matches!(err, CacheError::Produce { ref key, .. } if key == "bad"));
        assert_eq!(err.key(), Some("bad"));
        assert!(c.is_empty());
        assert_eq!(c.stats().produce_failures, 1);

        // the slot that failed is handed to the next insertion
        assert_eq!(get(&mut c, "good").unwrap(), "good@0");
    }

    #[test]
    fn produce_failure_after_eviction_leaves_slot_vacant() {
        let mut c = cache(2, EvictionPolicy::Release);
        get(&mut c, "a").unwrap();
        get(&mut c, "b").unwrap();
        c.provider_mut().fail_produce = Some("bad".into());

        assert!(get(&mut c, "bad").is_err());
        assert_eq!(c.len(), 1);
        assert!(!c.contains("a"));
        assert_eq!(c.provider().released.len(), 1);

        // slot 0 was vacated by "a" and must be reused, not slot 1 again
        assert_eq!(get(&mut c, "c").unwrap(), "c@0");
        assert_eq!(c.slot_of("b"), Some(SlotIndex(1)));
        assert_eq!(c.provider().released.len(), 1);
    }

    #[test]
    fn release_failure_commits_eviction_and_skips_produce() {
        let mut c = cache(1, EvictionPolicy::Release);
        get(&mut c, "a").unwrap();
        c.provider_mut().fail_release = true;

        let err = get(&mut c, "b").unwrap_err();
        assert!(matches!(err, CacheError::Release { ref key, .. } if key == "a"));
        assert!(c.is_empty());
        assert_eq!(c.provider().produced.len(), 1);
        assert_eq!(c.stats().release_failures, 1);

        c.provider_mut().fail_release = false;
        assert_eq!(get(&mut c, "b").unwrap(), "b@0");
    }

    #[test]
    fn peek_does_not_promote() {
        let mut c = cache(2, EvictionPolicy::Release);
        get(&mut c, "a").unwrap();
        get(&mut c, "b").unwrap();
        assert_eq!(c.peek("a").map(String::as_str), Some("a@0"));
        assert_eq!(c.lru_key(), Some("a"));
        assert!(c.peek("zzz").is_none());
    }

    #[test]
    fn print_and_dump_on_empty_cache() {
        let c = cache(4, EvictionPolicy::Release);
        c.print();
        let dump = c.dump();
        assert!(dump.is_empty());
        assert_eq!(dump.capacity, 4);
    }

    #[test]
    fn clear_drops_without_release() {
        let mut c = cache(2, EvictionPolicy::Release);
        get(&mut c, "a").unwrap();
        get(&mut c, "b").unwrap();
        c.clear();
        assert!(c.is_empty());
        assert!(c.provider().released.is_empty());
        assert_eq!(get(&mut c, "c").unwrap(), "c@0");
    }

    #[test]
    fn reset_stats_zeroes_counters() {
        let mut c = cache(1, EvictionPolicy::Release);
        get(&mut c, "a").unwrap();
        get(&mut c, "a").unwrap();
        c.reset_stats();
        assert_eq!(c.stats(), &CacheStats::default());
    }

    #[test]
    fn debug_lists_keys() {
        let mut c = cache(2, EvictionPolicy::Silent);
        get(&mut c, "a").unwrap();
        let text = format!("{c:?}");
        assert!(text.contains("capacity: 2"));
        assert!(text.contains("\"a\""));
    }
}

use std::fmt;

use serde::Serialize;

use crate::arena::SlotIndex;

/// Running counters for instrumentation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub produce_failures: u64,
    pub release_failures: u64,
    pub rejected: u64,
}

impl CacheStats {
    /// Fraction of lookups served without producing, 0.0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} evictions={} produce_failures={} release_failures={} rejected={} hit_rate={:.1}%",
            self.hits,
            self.misses,
            self.evictions,
            self.produce_failures,
            self.release_failures,
            self.rejected,
            self.hit_rate() * 100.0
        )
    }
}

/// One resident entry in a [`CacheDump`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DumpEntry {
    pub slot: SlotIndex,
    pub key: String,
}

/// Ordered snapshot of resident keys, most recently used first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheDump {
    pub capacity: usize,
    pub entries: Vec<DumpEntry>,
}

impl CacheDump {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.key.as_str()).collect()
    }
}

impl fmt::Display for CacheDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Slot Cache ({}/{}) ===", self.len(), self.capacity)?;
        for (rank, entry) in self.entries.iter().enumerate() {
            writeln!(f, "  {rank:>3} [{}] {}", entry.slot, entry.key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_of_empty_stats_is_zero() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn hit_rate_counts_hits_over_lookups() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..CacheStats::default()
        };
        assert_eq!(stats.hit_rate(), 0.75);
        assert!(stats.to_string().contains("hit_rate=75.0%"));
    }

    #[test]
    fn dump_display_lists_front_to_back() {
        let dump = CacheDump {
            capacity: 2,
            entries: vec![
                DumpEntry {
                    slot: SlotIndex(1),
                    key: "z".into(),
                },
                DumpEntry {
                    slot: SlotIndex(0),
                    key: "x".into(),
                },
            ],
        };
        let text = dump.to_string();
        assert!(text.starts_with("=== Slot Cache (2/2) ==="));
        let z = text.find("[#1] z").unwrap();
        let x = text.find("[#0] x").unwrap();
        assert!(z < x);
        assert_eq!(dump.keys(), ["z", "x"]);
    }
}

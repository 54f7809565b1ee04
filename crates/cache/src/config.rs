use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Default capacity of a [`CacheConfig`].
pub const DEFAULT_CAPACITY: usize = 16;

/// What happens to the least recently used entry when a full cache admits a
/// new key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Evict and hand the value to the provider's `release` before the slot is reused.
    #[default]
    Release,
    /// Evict and drop the value without calling `release`.
    Silent,
    /// Never evict. A miss on a full cache is a configuration fault.
    Strict,
}

impl EvictionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Silent => "silent",
            Self::Strict => "strict",
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "release" => Ok(Self::Release),
            "silent" => Ok(Self::Silent),
            "strict" => Ok(Self::Strict),
            _ => Err(ConfigError::UnknownPolicy(s.to_owned())),
        }
    }
}

/// Errors from building or loading a cache configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cache capacity must be at least 1")]
    ZeroCapacity,
    #[error("unknown eviction policy `{0}` (expected release, silent or strict)")]
    UnknownPolicy(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Construction parameters for a [`SlotCache`](crate::SlotCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of resident entries. Fixed for the lifetime of the cache.
    pub capacity: usize,
    #[serde(default)]
    pub policy: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            policy: EvictionPolicy::default(),
        }
    }
}

impl CacheConfig {
    pub fn new(capacity: usize, policy: EvictionPolicy) -> Self {
        Self { capacity, policy }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    /// Load a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        let config: Self = serde_json::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

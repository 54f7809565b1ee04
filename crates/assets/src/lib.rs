//! Slot cache collaborators: the concrete caches the renderer uses.
//!
//! - [`TextureUnitCache`]: maps texture ids onto the fixed set of texture
//!   units. Evicted bindings are simply rebound; no release step.
//! - [`PrefabCache`]: keeps loaded glTF prefabs by source URL. Sized so it
//!   never has to evict; overflow is reported as a configuration fault.
//!
//! # Invariants
//! - A texture's unit is derived from its slot index only.
//! - Prefab ids are content-addressed: same bytes, same [`AssetId`].

mod fetch;
mod prefab;
mod texture;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use fetch::{FsFetcher, MemoryFetcher, PrefabFetcher};
pub use prefab::{Material, Mesh, PREFAB_CAPACITY, Prefab, PrefabCache, PrefabCacheConfig, PrefabLoader};
pub use texture::{
    DEFAULT_TEXTURE_UNITS, GL_TEXTURE0, TextureBinding, TextureCacheConfig, TextureId,
    TextureUnit, TextureUnitAllocator, TextureUnitCache,
};

/// Content-addressed asset ID computed from the asset data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub u64);

impl AssetId {
    /// First eight bytes of the SHA-256 of `data`.
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        AssetId(u64::from_le_bytes(bytes))
    }
}

/// Errors from asset operations.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("invalid asset url: {0}")]
    InvalidUrl(String),
    #[error("glTF parse error: {0}")]
    GltfParse(String),
}

pub fn crate_info() -> &'static str {
    "slotcache-assets v0.1.0"
}

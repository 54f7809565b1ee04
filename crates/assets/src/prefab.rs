use serde::{Deserialize, Serialize};
use std::sync::Arc;

use slotcache_core::{
    CacheConfig, CacheDump, CacheError, ConfigError, EvictionPolicy, SlotCache, SlotIndex,
    SlotProvider,
};

use crate::fetch::PrefabFetcher;
use crate::{AssetError, AssetId};

/// Prefab slots. Large enough that a scene never cycles through them.
pub const PREFAB_CAPACITY: usize = 1024;

/// A mesh as described by glTF metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub name: String,
    pub primitive_count: usize,
}

/// A material as described by glTF metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub base_color: [f32; 4],
}

const DEFAULT_BASE_COLOR: [f32; 4] = [0.8, 0.8, 0.8, 1.0];

/// A loaded model, shared by every scene node instancing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prefab {
    pub id: AssetId,
    pub url: String,
    pub slot: SlotIndex,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
}

impl Prefab {
    /// Parse glTF JSON metadata. Buffers and accessors are not decoded.
    pub fn parse(url: &str, slot: SlotIndex, bytes: &[u8]) -> Result<Self, AssetError> {
        let json: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| AssetError::GltfParse(e.to_string()))?;
        if !json.is_object() {
            return Err(AssetError::GltfParse(format!(
                "{url}: top-level value is not an object"
            )));
        }

        let meshes = json
            .get("meshes")
            .and_then(|m| m.as_array())
            .map(|meshes| {
                meshes
                    .iter()
                    .enumerate()
                    .map(|(i, mesh)| Mesh {
                        name: name_or_index(mesh, "mesh", i),
                        primitive_count: mesh
                            .get("primitives")
                            .and_then(|p| p.as_array())
                            .map_or(0, |p| p.len()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let materials = json
            .get("materials")
            .and_then(|m| m.as_array())
            .map(|materials| {
                materials
                    .iter()
                    .enumerate()
                    .map(|(i, mat)| Material {
                        name: name_or_index(mat, "material", i),
                        base_color: base_color(mat),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            id: AssetId::of(bytes),
            url: url.to_owned(),
            slot,
            meshes,
            materials,
        })
    }

    pub fn primitive_count(&self) -> usize {
        self.meshes.iter().map(|m| m.primitive_count).sum()
    }
}

fn name_or_index(value: &serde_json::Value, kind: &str, i: usize) -> String {
    value
        .get("name")
        .and_then(|n| n.as_str())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("{kind}_{i}"))
}

fn base_color(material: &serde_json::Value) -> [f32; 4] {
    let Some(factor) = material
        .get("pbrMetallicRoughness")
        .and_then(|pbr| pbr.get("baseColorFactor"))
        .and_then(|c| c.as_array())
    else {
        return DEFAULT_BASE_COLOR;
    };
    let mut color = DEFAULT_BASE_COLOR;
    for (i, v) in factor.iter().enumerate().take(4) {
        if let Some(f) = v.as_f64() {
            color[i] = f as f32;
        }
    }
    color
}

/// Provider that fetches and parses prefabs by URL.
#[derive(Debug)]
pub struct PrefabLoader<F> {
    fetcher: F,
}

impl<F: PrefabFetcher> PrefabLoader<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }
}

impl<F: PrefabFetcher> SlotProvider<str> for PrefabLoader<F> {
    type Value = Arc<Prefab>;
    type Error = AssetError;

    fn key_of(&self, url: &str) -> String {
        url.to_owned()
    }

    async fn produce(&mut self, url: &str, slot: SlotIndex) -> Result<Arc<Prefab>, AssetError> {
        let bytes = self.fetcher.fetch(url).await?;
        let prefab = Prefab::parse(url, slot, &bytes)?;
        tracing::debug!(
            url,
            %slot,
            meshes = prefab.meshes.len(),
            materials = prefab.materials.len(),
            "prefab loaded"
        );
        Ok(Arc::new(prefab))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefabCacheConfig {
    pub capacity: usize,
}

impl Default for PrefabCacheConfig {
    fn default() -> Self {
        Self {
            capacity: PREFAB_CAPACITY,
        }
    }
}

/// Loaded prefabs by source URL.
///
/// Uses [`EvictionPolicy::Strict`]: loading more distinct prefabs than the
/// capacity fails with [`CacheError::EvictionRejected`] instead of dropping a
/// model that scene nodes may still reference.
#[derive(Debug)]
pub struct PrefabCache<F: PrefabFetcher> {
    cache: SlotCache<str, PrefabLoader<F>>,
}

impl<F: PrefabFetcher> PrefabCache<F> {
    pub fn new(fetcher: F, config: PrefabCacheConfig) -> Result<Self, ConfigError> {
        let cache = SlotCache::new(
            PrefabLoader::new(fetcher),
            CacheConfig::new(config.capacity, EvictionPolicy::Strict),
        )?;
        Ok(Self { cache })
    }

    /// Load the prefab at `url`, fetching it only the first time.
    pub async fn load(&mut self, url: &str) -> Result<Arc<Prefab>, CacheError<AssetError>> {
        self.cache.get(url).await
    }

    pub fn contains(&self, url: &str) -> bool {
        self.cache.contains(url)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.capacity()
    }

    pub fn fetcher(&self) -> &F {
        self.cache.provider().fetcher()
    }

    pub fn dump(&self) -> CacheDump {
        self.cache.dump()
    }

    pub fn print(&self) {
        self.cache.print();
    }
}

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::future::{Future, ready};

use slotcache_core::{
    CacheConfig, CacheDump, CacheError, ConfigError, EvictionPolicy, SlotCache, SlotIndex,
    SlotProvider,
};

/// Texture units assumed when none are configured.
pub const DEFAULT_TEXTURE_UNITS: usize = 16;

/// `GL_TEXTURE0`; unit `n` is `GL_TEXTURE0 + n`.
pub const GL_TEXTURE0: u32 = 0x84C0;

/// Identifier of a texture resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextureId(pub u64);

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tex:{}", self.0)
    }
}

/// A fixed-function texture unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextureUnit(pub u32);

impl TextureUnit {
    pub fn from_slot(slot: SlotIndex) -> Self {
        TextureUnit(slot.get() as u32)
    }

    pub fn index(self) -> u32 {
        self.0
    }

    /// The `GL_TEXTUREn` enum for this unit.
    pub fn gl_enum(self) -> u32 {
        GL_TEXTURE0 + self.0
    }
}

/// A texture bound to a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureBinding {
    pub texture: TextureId,
    pub unit: TextureUnit,
}

/// Provider that hands out the unit matching the slot index.
#[derive(Debug, Default)]
pub struct TextureUnitAllocator;

impl SlotProvider<TextureId> for TextureUnitAllocator {
    type Value = TextureBinding;
    type Error = Infallible;

    fn key_of(&self, element: &TextureId) -> String {
        element.to_string()
    }

    fn produce(
        &mut self,
        element: &TextureId,
        slot: SlotIndex,
    ) -> impl Future<Output = Result<TextureBinding, Infallible>> {
        let unit = TextureUnit::from_slot(slot);
        tracing::debug!(texture = %element, unit = unit.index(), "binding texture");
        ready(Ok(TextureBinding {
            texture: *element,
            unit,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureCacheConfig {
    /// Number of texture units available to the renderer.
    pub units: usize,
}

impl Default for TextureCacheConfig {
    fn default() -> Self {
        Self {
            units: DEFAULT_TEXTURE_UNITS,
        }
    }
}

/// Least-recently-used assignment of textures to texture units.
#[derive(Debug)]
pub struct TextureUnitCache {
    cache: SlotCache<TextureId, TextureUnitAllocator>,
}

impl TextureUnitCache {
    pub fn new(config: TextureCacheConfig) -> Result<Self, ConfigError> {
        let cache = SlotCache::new(
            TextureUnitAllocator,
            CacheConfig::new(config.units, EvictionPolicy::Silent),
        )?;
        Ok(Self { cache })
    }

    /// Bind `texture`, reusing its unit if it is still resident.
    pub async fn bind(&mut self, texture: TextureId) -> Result<TextureBinding, CacheError<Infallible>> {
        self.cache.get(&texture).await
    }

    /// Bind from synchronous render code. The allocator never suspends.
    pub fn bind_now(&mut self, texture: TextureId) -> Result<TextureBinding, CacheError<Infallible>> {
        pollster::block_on(self.bind(texture))
    }

    /// Unit currently holding `texture`, without refreshing it.
    pub fn unit_of(&self, texture: TextureId) -> Option<TextureUnit> {
        self.cache
            .slot_of(&texture.to_string())
            .map(TextureUnit::from_slot)
    }

    pub fn units(&self) -> usize {
        self.cache.capacity()
    }

    pub fn bound(&self) -> usize {
        self.cache.len()
    }

    pub fn dump(&self) -> CacheDump {
        self.cache.dump()
    }

    pub fn print(&self) {
        self.cache.print();
    }
}

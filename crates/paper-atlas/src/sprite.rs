//! Sprites
//!
//! The packer never owns sprites. Slots hold a `SpriteId` and the host
//! resolves it through a `SpriteRegistry`, so a reference whose sprite is no
//! longer loaded is simply `None` rather than a dangling pointer.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::atlas::AtlasId;
use crate::texture::{TextureBackend, TextureHandle};
use crate::BYTES_PER_PIXEL;

/// Stable sprite identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SpriteId(pub u64);

impl fmt::Display for SpriteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a sprite's pixels live after baking into an atlas page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpriteBacking {
    /// Atlas page texture
    pub texture: TextureHandle,
    /// Pixel origin of the sprite within the page (inside the padding)
    pub uv_origin: (u32, u32),
    /// Sprite size in pixels
    pub dimension: (u32, u32),
}

impl SpriteBacking {
    /// Start and size UVs normalized by the page texture size
    pub fn normalized(&self, texture_size: (u32, u32)) -> ([f32; 2], [f32; 2]) {
        normalize_rect(self.uv_origin, self.dimension, texture_size)
    }
}

fn normalize_rect(origin: (u32, u32), size: (u32, u32), texture_size: (u32, u32)) -> ([f32; 2], [f32; 2]) {
    let inv_w = 1.0 / texture_size.0.max(1) as f32;
    let inv_h = 1.0 / texture_size.1.max(1) as f32;
    (
        [origin.0 as f32 * inv_w, origin.1 as f32 * inv_h],
        [size.0 as f32 * inv_w, size.1 as f32 * inv_h],
    )
}

/// A sprite as seen by the packer
pub trait Sprite {
    fn id(&self) -> SpriteId;

    /// Size of the source rectangle in source texture pixels
    fn source_size(&self) -> (u32, u32);

    /// Whether the sprite currently has source pixels to bake
    fn has_source_texture(&self) -> bool;

    /// Read the source rectangle as tightly packed 4-byte pixels
    fn read_source_pixels(&self) -> Option<Vec<u8>>;

    /// Current baked placement, if any
    fn backing(&self) -> Option<SpriteBacking>;

    fn set_backing(&mut self, backing: SpriteBacking);

    /// Drop the baked placement; the sprite renders from its source again
    fn clear_backing(&mut self);

    /// Render data must be regenerated from the new backing
    fn notify_rebuilt(&mut self) {}

    /// The sprite changed and should be re-saved
    fn notify_changed(&mut self) {}
}

/// Resolves sprite membership and sprite references for the packer
pub trait SpriteRegistry {
    /// Every sprite that currently declares membership in `atlas`
    fn sprites_referencing(&self, atlas: AtlasId) -> Vec<SpriteId>;

    fn resolve(&self, id: SpriteId) -> Option<&dyn Sprite>;

    fn resolve_mut(&mut self, id: SpriteId) -> Option<&mut dyn Sprite>;
}

/// RGBA/BGRA source image shared between sprites cut from the same sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub width: u32,
    pub height: u32,
    /// 4 bytes per pixel, row-major
    pub data: Vec<u8>,
}

impl SourceImage {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }

    /// Image filled with a single pixel value
    pub fn solid(width: u32, height: u32, pixel: [u8; 4]) -> Self {
        let data = pixel.repeat(width as usize * height as usize);
        Self { width, height, data }
    }

    /// Copy out a sub-rectangle; pixels outside the image read as zero
    pub fn extract(&self, x: u32, y: u32, width: u32, height: u32) -> Vec<u8> {
        let mut result = Vec::with_capacity(width as usize * height as usize * BYTES_PER_PIXEL);

        for row in 0..height {
            let src_y = y + row;
            for col in 0..width {
                let src_x = x + col;
                if src_x >= self.width || src_y >= self.height {
                    result.extend_from_slice(&[0; BYTES_PER_PIXEL]);
                    continue;
                }

                let offset = (src_y as usize * self.width as usize + src_x as usize) * BYTES_PER_PIXEL;
                match self.data.get(offset..offset + BYTES_PER_PIXEL) {
                    Some(pixel) => result.extend_from_slice(pixel),
                    None => result.extend_from_slice(&[0; BYTES_PER_PIXEL]),
                }
            }
        }

        result
    }
}

/// Plain-data sprite
#[derive(Debug, Clone)]
pub struct MemorySprite {
    id: SpriteId,
    /// Source sheet; `None` when the texture is missing
    source: Option<Arc<SourceImage>>,
    /// Origin of the sprite within the source sheet
    source_origin: (u32, u32),
    source_size: (u32, u32),
    atlas: Option<AtlasId>,
    backing: Option<SpriteBacking>,
    /// Times render data was rebuilt
    pub rebuild_count: u32,
    /// Times the sprite was flagged as changed
    pub change_count: u32,
}

impl MemorySprite {
    /// Sprite covering an entire source image
    pub fn new(id: SpriteId, source: Arc<SourceImage>) -> Self {
        let size = (source.width, source.height);
        Self::with_region(id, source, (0, 0), size)
    }

    /// Sprite cut from a region of a larger sheet
    pub fn with_region(id: SpriteId, source: Arc<SourceImage>, origin: (u32, u32), size: (u32, u32)) -> Self {
        Self {
            id,
            source: Some(source),
            source_origin: origin,
            source_size: size,
            atlas: None,
            backing: None,
            rebuild_count: 0,
            change_count: 0,
        }
    }

    /// Sprite whose source texture is gone; it keeps its nominal size
    pub fn without_source(id: SpriteId, size: (u32, u32)) -> Self {
        Self {
            id,
            source: None,
            source_origin: (0, 0),
            source_size: size,
            atlas: None,
            backing: None,
            rebuild_count: 0,
            change_count: 0,
        }
    }

    pub fn in_atlas(mut self, atlas: AtlasId) -> Self {
        self.atlas = Some(atlas);
        self
    }

    pub fn atlas(&self) -> Option<AtlasId> {
        self.atlas
    }

    /// Move the sprite to another atlas (or none).
    ///
    /// Leaving every atlas drops the baked placement so the sprite falls
    /// back to its own source texture. Both the old and the new atlas need
    /// a build afterwards.
    pub fn set_atlas(&mut self, atlas: Option<AtlasId>) {
        if self.atlas == atlas {
            return;
        }
        self.atlas = atlas;
        if atlas.is_none() && self.backing.take().is_some() {
            self.change_count += 1;
        }
    }

    /// Replace the source sheet, e.g. after a reimport
    pub fn set_source(&mut self, source: Option<Arc<SourceImage>>, origin: (u32, u32), size: (u32, u32)) {
        self.source = source;
        self.source_origin = origin;
        self.source_size = size;
    }

    pub fn source_origin(&self) -> (u32, u32) {
        self.source_origin
    }

    /// Baked page texture if baked, otherwise `None` for "use the source sheet"
    pub fn effective_texture(&self) -> Option<TextureHandle> {
        self.backing.map(|b| b.texture)
    }

    /// Normalized start and size UVs of the sprite in whatever texture it
    /// currently renders from.
    pub fn atlas_data(&self, textures: &dyn TextureBackend) -> Option<([f32; 2], [f32; 2])> {
        match (&self.backing, &self.source) {
            (Some(backing), _) => {
                let size = textures.texture_size(backing.texture)?;
                Some(backing.normalized(size))
            }
            (None, Some(source)) => Some(normalize_rect(
                self.source_origin,
                self.source_size,
                (source.width, source.height),
            )),
            (None, None) => None,
        }
    }
}

impl Sprite for MemorySprite {
    fn id(&self) -> SpriteId {
        self.id
    }

    fn source_size(&self) -> (u32, u32) {
        self.source_size
    }

    fn has_source_texture(&self) -> bool {
        self.source.is_some()
    }

    fn read_source_pixels(&self) -> Option<Vec<u8>> {
        let source = self.source.as_ref()?;
        let (x, y) = self.source_origin;
        let (w, h) = self.source_size;
        Some(source.extract(x, y, w, h))
    }

    fn backing(&self) -> Option<SpriteBacking> {
        self.backing
    }

    fn set_backing(&mut self, backing: SpriteBacking) {
        self.backing = Some(backing);
    }

    fn clear_backing(&mut self) {
        self.backing = None;
    }

    fn notify_rebuilt(&mut self) {
        self.rebuild_count += 1;
    }

    fn notify_changed(&mut self) {
        self.change_count += 1;
    }
}

/// Sprite registry over plain data, keyed by id
#[derive(Debug, Default)]
pub struct MemorySpriteRegistry {
    sprites: BTreeMap<SpriteId, MemorySprite>,
}

impl MemorySpriteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sprite: MemorySprite) {
        self.sprites.insert(sprite.id, sprite);
    }

    pub fn remove(&mut self, id: SpriteId) -> Option<MemorySprite> {
        self.sprites.remove(&id)
    }

    pub fn get(&self, id: SpriteId) -> Option<&MemorySprite> {
        self.sprites.get(&id)
    }

    pub fn get_mut(&mut self, id: SpriteId) -> Option<&mut MemorySprite> {
        self.sprites.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemorySprite> {
        self.sprites.values()
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }
}

impl SpriteRegistry for MemorySpriteRegistry {
    fn sprites_referencing(&self, atlas: AtlasId) -> Vec<SpriteId> {
        self.sprites
            .values()
            .filter(|s| s.atlas == Some(atlas))
            .map(|s| s.id)
            .collect()
    }

    fn resolve(&self, id: SpriteId) -> Option<&dyn Sprite> {
        self.sprites.get(&id).map(|s| s as &dyn Sprite)
    }

    fn resolve_mut(&mut self, id: SpriteId) -> Option<&mut dyn Sprite> {
        self.sprites.get_mut(&id).map(|s| s as &mut dyn Sprite)
    }
}

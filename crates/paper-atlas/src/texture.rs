//! Atlas Page Textures
//!
//! Page textures are opaque handles owned by the host. The packer allocates
//! them, asks for their size, and hands finished page images over for upload.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{AtlasError, Result};

/// Opaque page texture handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TextureHandle(pub u32);

impl fmt::Display for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "texture {}", self.0)
    }
}

/// Pixel format of uploaded pages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    #[default]
    Bgra8,
}

impl TextureFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            TextureFormat::Bgra8 => 4,
        }
    }
}

/// A fully composited page, base level followed by each mip level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub width: u32,
    pub height: u32,
    pub mip_count: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
}

impl PageImage {
    /// Pixels of one mip level
    pub fn level(&self, level: u32) -> Option<&[u8]> {
        if level >= self.mip_count {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let mut offset = 0;
        let (mut w, mut h) = (self.width as usize, self.height as usize);
        for _ in 0..level {
            offset += w * h * bpp;
            w /= 2;
            h /= 2;
        }
        self.data.get(offset..offset + w * h * bpp)
    }
}

/// Host-side texture storage
pub trait TextureBackend {
    /// Create a new, uninitialized texture
    fn allocate_texture(&mut self) -> TextureHandle;

    /// Size of the base level, `None` if never uploaded or unknown
    fn texture_size(&self, handle: TextureHandle) -> Option<(u32, u32)>;

    /// Replace the texture contents with a page image
    fn upload(&mut self, handle: TextureHandle, image: PageImage) -> Result<()>;
}

/// Texture storage over plain data
#[derive(Debug, Default)]
pub struct MemoryTextureBackend {
    next_handle: u32,
    textures: HashMap<TextureHandle, Option<PageImage>>,
    /// Sizes reported for textures that were never uploaded
    sizes: HashMap<TextureHandle, (u32, u32)>,
    /// Total uploads performed
    pub uploads: u32,
}

impl MemoryTextureBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last image uploaded to a texture
    pub fn image(&self, handle: TextureHandle) -> Option<&PageImage> {
        self.textures.get(&handle)?.as_ref()
    }

    /// Force the reported size of a texture
    pub fn set_size(&mut self, handle: TextureHandle, width: u32, height: u32) {
        self.sizes.insert(handle, (width, height));
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

impl TextureBackend for MemoryTextureBackend {
    fn allocate_texture(&mut self) -> TextureHandle {
        let handle = TextureHandle(self.next_handle);
        self.next_handle += 1;
        self.textures.insert(handle, None);
        handle
    }

    fn texture_size(&self, handle: TextureHandle) -> Option<(u32, u32)> {
        if let Some(size) = self.sizes.get(&handle) {
            return Some(*size);
        }
        self.image(handle).map(|image| (image.width, image.height))
    }

    fn upload(&mut self, handle: TextureHandle, image: PageImage) -> Result<()> {
        let slot = self.textures.get_mut(&handle).ok_or(AtlasError::UnknownTexture(handle))?;
        self.sizes.remove(&handle);
        *slot = Some(image);
        self.uploads += 1;
        Ok(())
    }
}

//! Paper Atlas - Sprite Texture Atlas Packer
//!
//! Packs rectangular sprite images into one or more fixed-size atlas pages:
//! - Guillotine slot store with best-fit placement
//! - Incremental rebuilds as sprites join or leave an atlas
//! - Shadow repack to detect when starting over would use fewer pages
//! - Page compositing with border padding and masked mip chains
//!
//! # Example
//! ```rust,ignore
//! use paper_atlas::{Atlas, AtlasId, AtlasSettings, BuildConfig, RepackPolicy, run_build};
//!
//! let mut atlas = Atlas::new(AtlasId(1), AtlasSettings::default());
//! let report = run_build(
//!     &mut atlas,
//!     &mut sprites,
//!     &mut textures,
//!     &mut RepackPolicy::KeepIncremental,
//!     &BuildConfig::default(),
//! );
//! println!("{} pages, {} sprites packed", report.page_count, report.packed);
//! ```

pub mod atlas;
pub mod build;
pub mod compose;
pub mod mips;
pub mod packer;
pub mod remap;
pub mod settings;
pub mod slot;
pub mod sprite;
pub mod texture;

pub use atlas::{Atlas, AtlasId};
pub use build::{run_build, BuildConfig, BuildReport, ConfirmRepack, RepackPolicy, SkippedSprite};
pub use compose::PageBuffer;
pub use packer::Placement;
pub use settings::{AtlasSettings, ClampedSettings, PaddingMode};
pub use slot::{AtlasSlot, SlotIndex, SlotStore};
pub use sprite::{MemorySprite, MemorySpriteRegistry, SourceImage, Sprite, SpriteBacking, SpriteId, SpriteRegistry};
pub use texture::{MemoryTextureBackend, PageImage, TextureBackend, TextureFormat, TextureHandle};

/// Bytes per pixel of every buffer the packer reads or writes (BGRA8)
pub const BYTES_PER_PIXEL: usize = 4;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Atlas error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AtlasError {
    #[error("Sprite {0} could not be resolved")]
    SpriteNotResolved(SpriteId),

    #[error("Sprite {0} has no source texture")]
    MissingSourceTexture(SpriteId),

    #[error("Sprite {sprite} has an empty {width}x{height} source region")]
    EmptySprite { sprite: SpriteId, width: u32, height: u32 },

    #[error("Sprite {sprite} is {width}x{height} padded, larger than the {max_width}x{max_height} page")]
    SpriteTooLarge {
        sprite: SpriteId,
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },

    #[error("Sprite {sprite} pixel data is {actual} bytes, expected {expected}")]
    PixelDataSize {
        sprite: SpriteId,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown texture handle: {0}")]
    UnknownTexture(TextureHandle),

    #[error("Texture upload failed for {handle}: {reason}")]
    TextureUpload { handle: TextureHandle, reason: String },
}

pub type Result<T> = std::result::Result<T, AtlasError>;

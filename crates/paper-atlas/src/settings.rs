//! Atlas Settings
//!
//! User-facing page configuration and the clamped values a build actually uses.

use serde::{Deserialize, Serialize};

/// Smallest page dimension a build will use
pub const MIN_PAGE_SIZE: u32 = 16;

/// Largest page dimension a build will use
pub const MAX_PAGE_SIZE: u32 = 4096;

/// How the border around each placed sprite is filled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaddingMode {
    /// Replicate the nearest edge pixel outward
    #[default]
    DilateBorder,
    /// Leave the border transparent black
    PadWithZero,
}

/// Atlas page configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasSettings {
    /// Page width in pixels
    pub max_width: u32,
    /// Page height in pixels
    pub max_height: u32,
    /// Border pixels added on every side of each sprite
    pub padding: u32,
    /// Border fill mode
    pub padding_mode: PaddingMode,
    /// Requested mip levels, including the base level
    pub mip_count: u32,
}

impl Default for AtlasSettings {
    fn default() -> Self {
        Self {
            max_width: 2048,
            max_height: 2048,
            padding: 2,
            padding_mode: PaddingMode::DilateBorder,
            mip_count: 1,
        }
    }
}

impl AtlasSettings {
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width,
            max_height,
            ..Default::default()
        }
    }

    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_padding_mode(mut self, mode: PaddingMode) -> Self {
        self.padding_mode = mode;
        self
    }

    pub fn with_mip_count(mut self, mip_count: u32) -> Self {
        self.mip_count = mip_count;
        self
    }

    /// Clamp into the range a build can use.
    ///
    /// Out-of-range values are never rejected: page sizes are clamped into
    /// `[MIN_PAGE_SIZE, MAX_PAGE_SIZE]` and the mip count is cut to the number
    /// of levels that still halve both page dimensions cleanly.
    pub fn clamped(&self) -> ClampedSettings {
        let width = self.max_width.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
        let height = self.max_height.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
        let mip_count = clamp_mip_count(width, height, self.mip_count);

        if width != self.max_width || height != self.max_height || mip_count != self.mip_count {
            tracing::debug!(
                "Atlas settings clamped: {}x{} ({} mips) -> {}x{} ({} mips)",
                self.max_width,
                self.max_height,
                self.mip_count,
                width,
                height,
                mip_count
            );
        }

        ClampedSettings {
            width,
            height,
            padding: self.padding,
            padding_mode: self.padding_mode,
            mip_count,
        }
    }
}

/// Settings after clamping, as used by one build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampedSettings {
    pub width: u32,
    pub height: u32,
    pub padding: u32,
    pub padding_mode: PaddingMode,
    pub mip_count: u32,
}

impl ClampedSettings {
    /// Padded footprint of a sprite with the given source size
    pub fn padded_size(&self, width: u32, height: u32) -> (u32, u32) {
        let border = self.padding.saturating_mul(2);
        (width.saturating_add(border), height.saturating_add(border))
    }

    /// Whether a padded footprint can ever fit on a page
    pub fn fits_page(&self, padded_width: u32, padded_height: u32) -> bool {
        padded_width <= self.width && padded_height <= self.height
    }
}

/// Largest mip count not above `requested` whose every level above the
/// last still has even dimensions.
pub fn clamp_mip_count(width: u32, height: u32, requested: u32) -> u32 {
    let requested = requested.max(1);
    let (mut w, mut h) = (width, height);
    let mut levels = 1;

    while levels < requested && w % 2 == 0 && h % 2 == 0 {
        w /= 2;
        h /= 2;
        levels += 1;
    }

    levels
}

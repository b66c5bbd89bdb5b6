//! Page Compositing
//!
//! Builds the pixel data of one atlas page: sprite pixels are copied inside
//! their padded slots and the padding border is filled around them. The
//! buffer holds the base level followed by every mip level, each half the
//! size of the previous one.

use crate::settings::PaddingMode;
use crate::texture::{PageImage, TextureFormat};
use crate::BYTES_PER_PIXEL;

/// Rectangle of a placed sprite inside a page, excluding padding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpriteRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl SpriteRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// Zero-initialized page pixels with room for the full mip chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBuffer {
    width: u32,
    height: u32,
    mip_count: u32,
    data: Vec<u8>,
}

impl PageBuffer {
    pub fn new(width: u32, height: u32, mip_count: u32) -> Self {
        let mip_count = mip_count.max(1);
        let len = (0..mip_count)
            .map(|level| level_pixels(width, height, level))
            .sum::<usize>()
            * BYTES_PER_PIXEL;

        Self {
            width,
            height,
            mip_count,
            data: vec![0u8; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mip_count(&self) -> u32 {
        self.mip_count
    }

    /// Dimensions of a mip level
    pub fn level_size(&self, level: u32) -> (u32, u32) {
        (self.width >> level, self.height >> level)
    }

    /// Byte offset where a mip level starts
    pub fn level_offset(&self, level: u32) -> usize {
        (0..level).map(|l| level_pixels(self.width, self.height, l)).sum::<usize>() * BYTES_PER_PIXEL
    }

    pub fn level(&self, level: u32) -> &[u8] {
        let start = self.level_offset(level);
        let len = level_pixels(self.width, self.height, level) * BYTES_PER_PIXEL;
        &self.data[start..start + len]
    }

    pub fn level_mut(&mut self, level: u32) -> &mut [u8] {
        let start = self.level_offset(level);
        let len = level_pixels(self.width, self.height, level) * BYTES_PER_PIXEL;
        &mut self.data[start..start + len]
    }

    /// Base-level pixel at `(x, y)`
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = self.pixel_offset(x, y);
        let mut pixel = [0u8; 4];
        pixel.copy_from_slice(&self.data[offset..offset + BYTES_PER_PIXEL]);
        pixel
    }

    fn pixel_offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL
    }

    fn copy_pixel(&mut self, from: (u32, u32), to: (u32, u32)) {
        let src = self.pixel_offset(from.0, from.1);
        let dst = self.pixel_offset(to.0, to.1);
        for channel in 0..BYTES_PER_PIXEL {
            self.data[dst + channel] = self.data[src + channel];
        }
    }

    fn zero_pixel(&mut self, at: (u32, u32)) {
        let dst = self.pixel_offset(at.0, at.1);
        self.data[dst..dst + BYTES_PER_PIXEL].fill(0);
    }

    /// Copy tightly packed sprite pixels into the base level.
    ///
    /// Rows falling outside the page or past the end of `pixels` are skipped.
    pub fn blit(&mut self, rect: SpriteRect, pixels: &[u8]) {
        let src_stride = rect.width as usize * BYTES_PER_PIXEL;
        let dst_stride = self.width as usize * BYTES_PER_PIXEL;
        let visible_width = rect.width.min(self.width.saturating_sub(rect.x)) as usize * BYTES_PER_PIXEL;
        if visible_width == 0 {
            return;
        }

        for row in 0..rect.height as usize {
            let dst_y = rect.y as usize + row;
            if dst_y >= self.height as usize {
                break;
            }

            let src_start = row * src_stride;
            let Some(src) = pixels.get(src_start..src_start + visible_width) else {
                break;
            };

            let dst_start = dst_y * dst_stride + rect.x as usize * BYTES_PER_PIXEL;
            self.data[dst_start..dst_start + visible_width].copy_from_slice(src);
        }
    }

    /// Fill the `padding`-wide border around a placed sprite.
    ///
    /// Columns go first and cover the full padded height, then rows cover
    /// the full padded width, so corner pixels keep the row pass value.
    pub fn fill_padding(&mut self, rect: SpriteRect, padding: u32, mode: PaddingMode) {
        if padding == 0 || rect.width == 0 || rect.height == 0 {
            return;
        }
        // Slots are padded, so the border never leaves the page
        debug_assert!(rect.x >= padding && rect.y >= padding);
        debug_assert!(rect.x + rect.width + padding <= self.width);
        debug_assert!(rect.y + rect.height + padding <= self.height);

        let left = rect.x;
        let top = rect.y;
        let right = rect.x + rect.width - 1;
        let bottom = rect.y + rect.height - 1;

        // Vertical pass: left and right columns
        for y in top - padding..=bottom + padding {
            let src_y = y.clamp(top, bottom);
            for k in 1..=padding {
                match mode {
                    PaddingMode::DilateBorder => {
                        self.copy_pixel((left, src_y), (left - k, y));
                        self.copy_pixel((right, src_y), (right + k, y));
                    }
                    PaddingMode::PadWithZero => {
                        self.zero_pixel((left - k, y));
                        self.zero_pixel((right + k, y));
                    }
                }
            }
        }

        // Horizontal pass: top and bottom rows
        for x in left - padding..=right + padding {
            let src_x = x.clamp(left, right);
            for k in 1..=padding {
                match mode {
                    PaddingMode::DilateBorder => {
                        self.copy_pixel((src_x, top), (x, top - k));
                        self.copy_pixel((src_x, bottom), (x, bottom + k));
                    }
                    PaddingMode::PadWithZero => {
                        self.zero_pixel((x, top - k));
                        self.zero_pixel((x, bottom + k));
                    }
                }
            }
        }
    }

    /// Hand the finished buffer over for upload
    pub fn into_image(self) -> PageImage {
        PageImage {
            width: self.width,
            height: self.height,
            mip_count: self.mip_count,
            format: TextureFormat::Bgra8,
            data: self.data,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

fn level_pixels(width: u32, height: u32, level: u32) -> usize {
    (width >> level) as usize * (height >> level) as usize
}

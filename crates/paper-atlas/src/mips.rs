//! Masked Mip Chains
//!
//! Lower mip levels average only pixels that belong to a placed sprite.
//! Padding and empty page space never bleed into a neighbouring sprite's
//! mips: a validity mask at base resolution marks sprite pixels, and each
//! level averages the valid pixels of every 2x2 block, then ORs the mask.

use crate::compose::{PageBuffer, SpriteRect};
use crate::BYTES_PER_PIXEL;

/// One byte per pixel, 1 where the pixel belongs to a sprite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityMask {
    width: u32,
    height: u32,
    bits: Vec<u8>,
}

impl ValidityMask {
    /// Mask with every pixel invalid
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![0; width as usize * height as usize],
        }
    }

    /// Mark the unpadded area of each sprite as valid
    pub fn from_rects(width: u32, height: u32, rects: &[SpriteRect]) -> Self {
        let mut mask = Self::new(width, height);
        for rect in rects {
            mask.mark(*rect);
        }
        mask
    }

    pub fn mark(&mut self, rect: SpriteRect) {
        let x_end = (rect.x + rect.width).min(self.width);
        let y_end = (rect.y + rect.height).min(self.height);
        for y in rect.y..y_end {
            let row = y as usize * self.width as usize;
            self.bits[row + rect.x as usize..row + x_end as usize].fill(1);
        }
    }

    pub fn is_valid(&self, x: u32, y: u32) -> bool {
        self.bits[y as usize * self.width as usize + x as usize] != 0
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Half-resolution mask: a pixel is valid if any of its 2x2 sources is
    pub fn downsample(&self) -> ValidityMask {
        let mut next = ValidityMask::new(self.width / 2, self.height / 2);
        for y in 0..next.height {
            for x in 0..next.width {
                let valid = self.is_valid(2 * x, 2 * y)
                    || self.is_valid(2 * x + 1, 2 * y)
                    || self.is_valid(2 * x, 2 * y + 1)
                    || self.is_valid(2 * x + 1, 2 * y + 1);
                next.bits[y as usize * next.width as usize + x as usize] = valid as u8;
            }
        }
        next
    }
}

/// Fill every level after the base from the level above it.
///
/// Returns the mask of the smallest level.
pub fn generate_mip_chain(buffer: &mut PageBuffer, base_mask: ValidityMask) -> ValidityMask {
    let mut mask = base_mask;

    for level in 1..buffer.mip_count() {
        let (src_w, _) = buffer.level_size(level - 1);
        let (dst_w, dst_h) = buffer.level_size(level);

        // Previous level is copied out so both levels can be addressed
        let src: Vec<u8> = buffer.level(level - 1).to_vec();
        let dst = buffer.level_mut(level);

        for y in 0..dst_h {
            for x in 0..dst_w {
                let mut sums = [0u32; BYTES_PER_PIXEL];
                let mut count = 0u32;

                for (sx, sy) in [(2 * x, 2 * y), (2 * x + 1, 2 * y), (2 * x, 2 * y + 1), (2 * x + 1, 2 * y + 1)] {
                    if !mask.is_valid(sx, sy) {
                        continue;
                    }
                    let offset = (sy as usize * src_w as usize + sx as usize) * BYTES_PER_PIXEL;
                    for (channel, sum) in sums.iter_mut().enumerate() {
                        *sum += src[offset + channel] as u32;
                    }
                    count += 1;
                }

                let out = (y as usize * dst_w as usize + x as usize) * BYTES_PER_PIXEL;
                for (channel, sum) in sums.iter().enumerate() {
                    dst[out + channel] = if count == 0 { 0 } else { (sum / count) as u8 };
                }
            }
        }

        mask = mask.downsample();
    }

    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_from_rects() {
        let mask = ValidityMask::from_rects(4, 4, &[SpriteRect::new(1, 1, 2, 1)]);
        assert!(mask.is_valid(1, 1));
        assert!(mask.is_valid(2, 1));
        assert!(!mask.is_valid(0, 1));
        assert!(!mask.is_valid(1, 2));
    }

    #[test]
    fn test_mip_averages_only_valid_pixels() {
        let mut buffer = PageBuffer::new(4, 4, 2);
        // Valid 2x2 block in the top-left
        buffer.blit(
            SpriteRect::new(0, 0, 2, 2),
            &[[10u8; 4], [20; 4], [30; 4], [41; 4]].concat(),
        );
        // Bright padding-like garbage that must not bleed in
        buffer.blit(SpriteRect::new(2, 0, 2, 4), &vec![255u8; 2 * 4 * 4]);

        let mask = ValidityMask::from_rects(4, 4, &[SpriteRect::new(0, 0, 2, 2)]);
        let last = generate_mip_chain(&mut buffer, mask);

        let level = buffer.level(1);
        // (10 + 20 + 30 + 41) / 4 with integer division
        assert_eq!(&level[0..4], &[25, 25, 25, 25]);
        // Blocks with no valid source pixel come out zero
        assert_eq!(&level[4..8], &[0, 0, 0, 0]);
        assert_eq!(&level[12..16], &[0, 0, 0, 0]);

        assert!(last.is_valid(0, 0));
        assert!(!last.is_valid(1, 0));
    }

    #[test]
    fn test_partial_block_not_diluted() {
        let mut buffer = PageBuffer::new(2, 2, 2);
        buffer.blit(SpriteRect::new(0, 0, 1, 1), &[200, 100, 50, 255]);

        let mask = ValidityMask::from_rects(2, 2, &[SpriteRect::new(0, 0, 1, 1)]);
        generate_mip_chain(&mut buffer, mask);

        assert_eq!(buffer.level(1), &[200, 100, 50, 255]);
    }

    #[test]
    fn test_mask_propagates_through_levels() {
        let mut buffer = PageBuffer::new(8, 8, 4);
        buffer.blit(SpriteRect::new(7, 7, 1, 1), &[8, 8, 8, 8]);

        let mask = ValidityMask::from_rects(8, 8, &[SpriteRect::new(7, 7, 1, 1)]);
        let last = generate_mip_chain(&mut buffer, mask);

        assert_eq!((last.width(), last.height()), (1, 1));
        assert!(last.is_valid(0, 0));
        assert_eq!(buffer.level(3), &[8, 8, 8, 8]);
    }
}

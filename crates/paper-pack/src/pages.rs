//! Page textures on disk
//!
//! Each page texture is written as one PNG per mip level:
//! `page-<handle>.png` for the base level, `page-<handle>-mip<n>.png` below it.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use paper_atlas::{AtlasError, PageImage, TextureBackend, TextureHandle};

use crate::state::TextureRecord;

/// Swap between BGRA and RGBA in place
pub fn swap_red_blue(pixels: &mut [u8]) {
    for pixel in pixels.chunks_exact_mut(4) {
        pixel.swap(0, 2);
    }
}

pub fn page_file_name(handle: TextureHandle, level: u32) -> String {
    if level == 0 {
        format!("page-{}.png", handle.0)
    } else {
        format!("page-{}-mip{}.png", handle.0, level)
    }
}

/// Delete a file, treating an already missing file as success
fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

fn upload_error(handle: TextureHandle, reason: impl Into<String>) -> AtlasError {
    AtlasError::TextureUpload {
        handle,
        reason: reason.into(),
    }
}

/// Texture backend writing PNG files into an output directory
#[derive(Debug)]
pub struct PageWriter {
    dir: PathBuf,
    next_handle: u32,
    textures: BTreeMap<TextureHandle, TextureRecord>,
}

impl PageWriter {
    /// Resume from the textures recorded by a previous run
    pub fn new(dir: &Path, next_handle: u32, records: &[TextureRecord]) -> Self {
        Self {
            dir: dir.to_path_buf(),
            next_handle,
            textures: records.iter().map(|r| (r.handle, *r)).collect(),
        }
    }

    pub fn next_handle(&self) -> u32 {
        self.next_handle
    }

    pub fn records(&self) -> Vec<TextureRecord> {
        self.textures.values().copied().collect()
    }

    pub fn path_of(&self, handle: TextureHandle, level: u32) -> PathBuf {
        self.dir.join(page_file_name(handle, level))
    }

    /// Forget a texture and delete its files
    pub fn release(&mut self, handle: TextureHandle) -> io::Result<()> {
        let Some(record) = self.textures.remove(&handle) else {
            return Ok(());
        };

        for level in 0..record.mip_count.max(1) {
            remove_if_present(&self.path_of(handle, level))?;
        }
        tracing::debug!("Released {}", handle);
        Ok(())
    }
}

impl TextureBackend for PageWriter {
    fn allocate_texture(&mut self) -> TextureHandle {
        let handle = TextureHandle(self.next_handle);
        self.next_handle += 1;
        self.textures.insert(
            handle,
            TextureRecord {
                handle,
                size: None,
                mip_count: 0,
            },
        );
        handle
    }

    fn texture_size(&self, handle: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&handle).and_then(|r| r.size)
    }

    fn upload(&mut self, handle: TextureHandle, image: PageImage) -> paper_atlas::Result<()> {
        if !self.textures.contains_key(&handle) {
            return Err(AtlasError::UnknownTexture(handle));
        }

        let (mut width, mut height) = (image.width, image.height);
        for level in 0..image.mip_count {
            let mut pixels = image
                .level(level)
                .ok_or_else(|| upload_error(handle, format!("mip level {level} missing")))?
                .to_vec();
            swap_red_blue(&mut pixels);

            let png = RgbaImage::from_raw(width, height, pixels)
                .ok_or_else(|| upload_error(handle, "pixel buffer does not match page size"))?;
            let path = self.path_of(handle, level);
            png.save(&path).map_err(|e| upload_error(handle, e.to_string()))?;

            width /= 2;
            height /= 2;
        }

        // Mip files from an earlier, deeper chain
        let previous_mips = self.textures.get(&handle).map_or(0, |r| r.mip_count);
        for level in image.mip_count..previous_mips {
            remove_if_present(&self.path_of(handle, level)).map_err(|e| upload_error(handle, e.to_string()))?;
        }

        self.textures.insert(
            handle,
            TextureRecord {
                handle,
                size: Some((image.width, image.height)),
                mip_count: image.mip_count,
            },
        );
        tracing::debug!("Wrote {} ({}x{})", handle, image.width, image.height);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paper_atlas::TextureFormat;

    fn page(width: u32, height: u32, mip_count: u32, pixel: [u8; 4]) -> PageImage {
        let mut pixels = 0;
        let (mut w, mut h) = (width, height);
        for _ in 0..mip_count {
            pixels += w * h;
            w /= 2;
            h /= 2;
        }
        PageImage {
            width,
            height,
            mip_count,
            format: TextureFormat::Bgra8,
            data: pixel.repeat(pixels as usize),
        }
    }

    #[test]
    fn test_upload_writes_rgba_png() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = PageWriter::new(dir.path(), 0, &[]);
        let handle = writer.allocate_texture();
        assert_eq!(writer.texture_size(handle), None);

        // BGRA blue-ish pixel
        writer.upload(handle, page(4, 2, 1, [200, 10, 20, 255])).unwrap();
        assert_eq!(writer.texture_size(handle), Some((4, 2)));

        let png = image::open(writer.path_of(handle, 0)).unwrap().into_rgba8();
        assert_eq!(png.dimensions(), (4, 2));
        assert_eq!(png.get_pixel(0, 0).0, [20, 10, 200, 255]);
    }

    #[test]
    fn test_mip_levels_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = PageWriter::new(dir.path(), 5, &[]);
        let handle = writer.allocate_texture();
        assert_eq!(handle, TextureHandle(5));

        writer.upload(handle, page(8, 8, 3, [1, 2, 3, 4])).unwrap();
        assert!(writer.path_of(handle, 2).exists());

        // Shallower chain removes stale mips
        writer.upload(handle, page(8, 8, 1, [1, 2, 3, 4])).unwrap();
        assert!(!writer.path_of(handle, 1).exists());

        writer.release(handle).unwrap();
        assert!(!writer.path_of(handle, 0).exists());
        assert!(writer.records().is_empty());
    }

    #[test]
    fn test_stale_mip_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let record = TextureRecord {
            handle: TextureHandle(0),
            size: Some((8, 8)),
            mip_count: 3,
        };
        let mut writer = PageWriter::new(dir.path(), 1, &[record]);

        // Recorded mips that are already gone are fine
        writer.upload(TextureHandle(0), page(8, 8, 2, [0; 4])).unwrap();

        // Anything else that blocks removal fails the upload
        let mip = writer.path_of(TextureHandle(0), 1);
        fs::remove_file(&mip).unwrap();
        fs::create_dir(&mip).unwrap();
        let err = writer.upload(TextureHandle(0), page(8, 8, 1, [0; 4])).unwrap_err();
        assert!(matches!(err, AtlasError::TextureUpload { handle: TextureHandle(0), .. }));
    }

    #[test]
    fn test_unknown_handle() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = PageWriter::new(dir.path(), 0, &[]);
        let err = writer.upload(TextureHandle(3), page(2, 2, 1, [0; 4])).unwrap_err();
        assert_eq!(err, AtlasError::UnknownTexture(TextureHandle(3)));
    }

    #[test]
    fn test_resume_from_records() {
        let dir = tempfile::tempdir().unwrap();
        let record = TextureRecord {
            handle: TextureHandle(2),
            size: Some((64, 64)),
            mip_count: 1,
        };
        let mut writer = PageWriter::new(dir.path(), 3, &[record]);
        assert_eq!(writer.texture_size(TextureHandle(2)), Some((64, 64)));
        assert_eq!(writer.allocate_texture(), TextureHandle(3));
        assert_eq!(writer.next_handle(), 4);
    }
}

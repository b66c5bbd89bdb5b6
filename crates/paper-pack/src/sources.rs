//! Sprite sources
//!
//! Every PNG in the input directory becomes one sprite covering the whole
//! image. Files that fail to decode stay members of the atlas without a
//! source texture, so the build skips them and keeps their old placement.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use paper_atlas::{MemorySprite, MemorySpriteRegistry, SourceImage, Sprite, SpriteId};

use crate::pages::swap_red_blue;
use crate::state::PackState;

/// Sprites of one run and the file each came from
#[derive(Debug, Default)]
pub struct LoadedSprites {
    pub registry: MemorySpriteRegistry,
    pub names: BTreeMap<SpriteId, String>,
}

impl LoadedSprites {
    pub fn file_names(&self) -> Vec<String> {
        self.names.values().cloned().collect()
    }
}

/// PNG files in `dir`, sorted by name
pub fn sprite_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).with_context(|| format!("Failed to read input directory {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_png = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        if path.is_file() && is_png {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Decode a PNG into a BGRA source image
pub fn decode_source(path: &Path) -> Result<SourceImage> {
    let image = image::open(path)
        .with_context(|| format!("Failed to decode {}", path.display()))?
        .into_rgba8();
    let (width, height) = image.dimensions();
    let mut data = image.into_raw();
    swap_red_blue(&mut data);
    Ok(SourceImage::new(width, height, data))
}

/// Load every sprite in `dir` as a member of the state's atlas
pub fn load_sprites(dir: &Path, state: &mut PackState) -> Result<LoadedSprites> {
    let atlas = state.atlas.id();
    let mut loaded = LoadedSprites::default();

    for path in sprite_files(dir)? {
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            tracing::warn!("Skipping non UTF-8 file name {}", path.display());
            continue;
        };

        let id = state.sprite_id(&name);
        let previous = state.backing_of(&name);

        let mut sprite = match decode_source(&path) {
            Ok(source) => MemorySprite::new(id, Arc::new(source)),
            Err(err) => {
                tracing::warn!("{:#}", err);
                let size = previous.map(|b| b.dimension).unwrap_or((0, 0));
                MemorySprite::without_source(id, size)
            }
        }
        .in_atlas(atlas);

        if let Some(backing) = previous {
            sprite.set_backing(backing);
        }

        loaded.registry.insert(sprite);
        loaded.names.insert(id, name);
    }

    tracing::info!("Loaded {} sprites from {}", loaded.names.len(), dir.display());
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use paper_atlas::AtlasSettings;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32, pixel: [u8; 4]) {
        let image = RgbaImage::from_pixel(width, height, image::Rgba(pixel));
        image.save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_only_png_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "b.png", 2, 2, [0; 4]);
        write_png(dir.path(), "a.PNG", 2, 2, [0; 4]);
        fs::write(dir.path().join("notes.txt"), "hi").unwrap();

        let files = sprite_files(dir.path()).unwrap();
        let names: Vec<_> = files.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
        assert_eq!(names, vec!["a.PNG", "b.png"]);
    }

    #[test]
    fn test_decoded_pixels_are_bgra() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "red.png", 3, 1, [255, 0, 0, 128]);

        let source = decode_source(&dir.path().join("red.png")).unwrap();
        assert_eq!((source.width, source.height), (3, 1));
        assert_eq!(&source.data[0..4], &[0, 0, 255, 128]);
    }

    #[test]
    fn test_undecodable_file_has_no_source() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "ok.png", 4, 4, [1, 2, 3, 255]);
        fs::write(dir.path().join("broken.png"), b"not a png").unwrap();

        let mut state = PackState::new(AtlasSettings::default());
        let loaded = load_sprites(dir.path(), &mut state).unwrap();
        assert_eq!(loaded.registry.len(), 2);

        let broken = loaded.registry.get(state.sprite_id("broken.png")).unwrap();
        assert!(!broken.has_source_texture());
        let ok = loaded.registry.get(state.sprite_id("ok.png")).unwrap();
        assert_eq!(ok.source_size(), (4, 4));
        assert_eq!(ok.atlas(), Some(state.atlas.id()));
    }
}

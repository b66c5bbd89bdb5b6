//! Atlas manifest
//!
//! `atlas.json` lists where each sprite ended up, in pixels and in
//! normalized UVs, for whatever consumes the generated pages.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use paper_atlas::{Atlas, Sprite};
use serde::{Deserialize, Serialize};

use crate::pages::{page_file_name, PageWriter};
use crate::sources::LoadedSprites;

pub const MANIFEST_FILE: &str = "atlas.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSprite {
    pub name: String,
    pub page: usize,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Normalized start and size: `[u, v, width, height]`
    pub uv: [f32; 4],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Base-level file of each page, by page index
    pub pages: Vec<String>,
    pub sprites: Vec<ManifestSprite>,
    /// Sprites without a placement this run
    pub unpacked: Vec<String>,
}

impl Manifest {
    pub fn from_build(atlas: &Atlas, loaded: &LoadedSprites, pages: &PageWriter) -> Self {
        let mut manifest = Manifest {
            pages: atlas
                .generated_textures()
                .iter()
                .map(|texture| page_file_name(*texture, 0))
                .collect(),
            ..Default::default()
        };

        for (id, name) in &loaded.names {
            let Some(sprite) = loaded.registry.get(*id) else {
                continue;
            };
            // The slot is authoritative; a backing that disagrees with it is stale
            let placed = atlas.placement_of(*id).and_then(|(page, origin)| {
                let backing = sprite.backing()?;
                let texture = atlas.generated_textures().get(page as usize)?;
                if backing.texture != *texture || backing.uv_origin != origin {
                    return None;
                }
                let (start, size) = sprite.atlas_data(pages)?;
                Some((page as usize, origin, backing, start, size))
            });

            match placed {
                Some((page, origin, backing, start, size)) => manifest.sprites.push(ManifestSprite {
                    name: name.clone(),
                    page,
                    x: origin.0,
                    y: origin.1,
                    width: backing.dimension.0,
                    height: backing.dimension.1,
                    uv: [start[0], start[1], size[0], size[1]],
                }),
                None => manifest.unpacked.push(name.clone()),
            }
        }

        manifest
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}

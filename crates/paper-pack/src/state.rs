//! Persisted packer state
//!
//! Everything the next run needs to build incrementally: the atlas, a stable
//! sprite id per file name with that sprite's last placement, and the page
//! textures written so far.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use paper_atlas::{Atlas, AtlasId, AtlasSettings, SpriteBacking, SpriteId, TextureHandle};
use serde::{Deserialize, Serialize};

/// State file name inside the output directory
pub const STATE_FILE: &str = "atlas-state.json";

/// The atlas every run of the packer builds
pub const ATLAS_ID: AtlasId = AtlasId(1);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpriteRecord {
    pub id: SpriteId,
    #[serde(default)]
    pub backing: Option<SpriteBacking>,
}

/// A page texture on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureRecord {
    pub handle: TextureHandle,
    /// Base level size, `None` until first written
    pub size: Option<(u32, u32)>,
    pub mip_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackState {
    pub atlas: Atlas,
    /// Sprites keyed by source file name
    pub sprites: BTreeMap<String, SpriteRecord>,
    pub next_sprite_id: u64,
    pub textures: Vec<TextureRecord>,
    pub next_texture: u32,
}

impl PackState {
    pub fn new(settings: AtlasSettings) -> Self {
        Self {
            atlas: Atlas::new(ATLAS_ID, settings),
            sprites: BTreeMap::new(),
            next_sprite_id: 1,
            textures: Vec::new(),
            next_texture: 0,
        }
    }

    /// Load state from an output directory, `None` on the first run
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(STATE_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let state = serde_json::from_str(&json).with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(state))
    }

    pub fn save(&mut self, dir: &Path) -> Result<()> {
        let path = dir.join(STATE_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        self.atlas.mark_saved();
        tracing::debug!("Saved atlas state to {}", path.display());
        Ok(())
    }

    /// Stable id for a sprite file, assigned on first sight
    pub fn sprite_id(&mut self, name: &str) -> SpriteId {
        if let Some(record) = self.sprites.get(name) {
            return record.id;
        }

        let id = SpriteId(self.next_sprite_id);
        self.next_sprite_id += 1;
        self.sprites.insert(name.to_string(), SpriteRecord { id, backing: None });
        id
    }

    pub fn backing_of(&self, name: &str) -> Option<SpriteBacking> {
        self.sprites.get(name).and_then(|r| r.backing)
    }

    /// Forget sprites whose files are gone
    pub fn retain_sprites(&mut self, present: &[String]) {
        let before = self.sprites.len();
        self.sprites.retain(|name, _| present.contains(name));
        let removed = before - self.sprites.len();
        if removed > 0 {
            tracing::info!("Forgot {} sprites no longer in the input directory", removed);
        }
    }
}

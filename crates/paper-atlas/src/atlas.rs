//! Atlas
//!
//! The persistent aggregate one build works on: settings, slot layout, page
//! textures, and the settings the last build used.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::settings::{AtlasSettings, ClampedSettings};
use crate::slot::SlotStore;
use crate::sprite::SpriteId;
use crate::texture::TextureHandle;

/// Atlas identity; sprites declare membership by this id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct AtlasId(pub u64);

impl fmt::Display for AtlasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "atlas {}", self.0)
    }
}

/// Sprite atlas state persisted across builds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Atlas {
    id: AtlasId,
    /// Page configuration; edits take effect on the next build
    pub settings: AtlasSettings,
    pub(crate) slots: SlotStore,
    /// Texture per page index, dense after every build
    pub(crate) generated_textures: Vec<TextureHandle>,
    /// Builds since the last full rebuild
    pub(crate) incremental_build_counter: u32,
    pub(crate) built_width: u32,
    pub(crate) built_height: u32,
    pub(crate) built_padding: u32,
    #[serde(default)]
    pub(crate) rebuild_requested: bool,
    #[serde(skip)]
    pub(crate) needs_save: bool,
}

impl Atlas {
    /// Empty atlas; the first build is always a full rebuild
    pub fn new(id: AtlasId, settings: AtlasSettings) -> Self {
        Self {
            id,
            settings,
            slots: SlotStore::new(),
            generated_textures: Vec::new(),
            incremental_build_counter: 0,
            built_width: 0,
            built_height: 0,
            built_padding: 0,
            rebuild_requested: false,
            needs_save: false,
        }
    }

    pub fn id(&self) -> AtlasId {
        self.id
    }

    pub fn slots(&self) -> &SlotStore {
        &self.slots
    }

    pub fn generated_textures(&self) -> &[TextureHandle] {
        &self.generated_textures
    }

    pub fn page_count(&self) -> usize {
        self.generated_textures.len()
    }

    pub fn incremental_build_counter(&self) -> u32 {
        self.incremental_build_counter
    }

    /// Page width, height and padding used by the last build
    pub fn built_settings(&self) -> (u32, u32, u32) {
        (self.built_width, self.built_height, self.built_padding)
    }

    /// Force the next build to start from an empty layout
    pub fn request_rebuild(&mut self) {
        self.rebuild_requested = true;
    }

    pub fn rebuild_requested(&self) -> bool {
        self.rebuild_requested
    }

    /// Whether a build changed the atlas since it was last saved
    pub fn needs_save(&self) -> bool {
        self.needs_save
    }

    pub fn mark_saved(&mut self) {
        self.needs_save = false;
    }

    /// Page and pixel origin (inside padding) of a packed sprite
    pub fn placement_of(&self, sprite: SpriteId) -> Option<(u32, (u32, u32))> {
        let padding = self.built_padding;
        self.slots
            .iter()
            .find(|s| s.occupant == Some(sprite))
            .map(|s| (s.page, (s.x + padding, s.y + padding)))
    }

    /// Whether the page size or padding differ from the last build
    pub(crate) fn settings_changed(&self, clamped: &ClampedSettings) -> bool {
        clamped.width != self.built_width || clamped.height != self.built_height || clamped.padding != self.built_padding
    }

    pub(crate) fn record_built(&mut self, clamped: &ClampedSettings) {
        self.built_width = clamped.width;
        self.built_height = clamped.height;
        self.built_padding = clamped.padding;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_atlas_is_empty() {
        let atlas = Atlas::new(AtlasId(1), AtlasSettings::default());
        assert!(atlas.slots().is_empty());
        assert_eq!(atlas.page_count(), 0);
        assert_eq!(atlas.built_settings(), (0, 0, 0));
        assert!(!atlas.needs_save());
    }

    #[test]
    fn test_settings_changed() {
        let mut atlas = Atlas::new(AtlasId(1), AtlasSettings::new(256, 256));
        let clamped = atlas.settings.clamped();
        assert!(atlas.settings_changed(&clamped));

        atlas.record_built(&clamped);
        assert!(!atlas.settings_changed(&clamped));

        atlas.settings.padding = 4;
        assert!(atlas.settings_changed(&atlas.settings.clamped()));
    }

    #[test]
    fn test_mip_count_does_not_force_rebuild() {
        let mut atlas = Atlas::new(AtlasId(1), AtlasSettings::new(256, 256));
        let clamped = atlas.settings.clamped();
        atlas.record_built(&clamped);
        atlas.settings.mip_count = 4;
        assert!(!atlas.settings_changed(&atlas.settings.clamped()));
    }
}

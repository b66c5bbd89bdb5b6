//! Atlas Build
//!
//! One synchronous pass over an atlas: decide between an incremental and a
//! full rebuild, drop sprites that left the atlas, pack current members
//! largest-first, optionally compare against a from-scratch repack, compact
//! page indices, composite every page and point sprites at their new
//! placement.
//!
//! Builds are not reentrant. The host must run at most one build per atlas
//! at a time.

use std::collections::{BTreeSet, HashSet};

use crate::atlas::Atlas;
use crate::compose::{PageBuffer, SpriteRect};
use crate::mips::{generate_mip_chain, ValidityMask};
use crate::packer::find_best_slot;
use crate::remap::remap_pages;
use crate::settings::ClampedSettings;
use crate::slot::SlotStore;
use crate::sprite::{SpriteBacking, SpriteId, SpriteRegistry};
use crate::texture::{TextureBackend, TextureHandle};
use crate::{AtlasError, BYTES_PER_PIXEL};

/// Width multiplier of the packing sort key; larger than any page dimension
pub const SORT_KEY_WIDTH_FACTOR: u64 = 16384;

/// Build options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildConfig {
    /// Pack a from-scratch layout alongside the incremental one and offer
    /// it when it uses fewer pages
    pub test_for_improvement: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            test_for_improvement: true,
        }
    }
}

/// Decides whether a better from-scratch layout replaces the current one
pub trait ConfirmRepack {
    fn confirm_repack(&mut self, message: &str) -> bool;
}

/// Fixed answer for hosts without a user to ask
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RepackPolicy {
    /// Keep the incremental layout; sprites only move when they must
    #[default]
    KeepIncremental,
    /// Always take the layout with fewer pages
    AlwaysRepack,
}

impl ConfirmRepack for RepackPolicy {
    fn confirm_repack(&mut self, _message: &str) -> bool {
        matches!(self, RepackPolicy::AlwaysRepack)
    }
}

impl<F> ConfirmRepack for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm_repack(&mut self, message: &str) -> bool {
        (*self)(message)
    }
}

/// Sprite left out of a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSprite {
    pub sprite: SpriteId,
    pub error: AtlasError,
}

/// What one build did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    /// Layout was cleared before packing
    pub full_rebuild: bool,
    /// Incremental builds since the last full rebuild
    pub incremental_build_counter: u32,
    /// Sprites that lost their slot
    pub evicted: Vec<SpriteId>,
    /// Sprites holding a slot after packing
    pub packed: usize,
    /// Sprites whose slot was created or resized this build
    pub placed: usize,
    pub skipped: Vec<SkippedSprite>,
    /// Sprites whose backing placement was rewritten or cleared
    pub updated: Vec<SpriteId>,
    pub page_count: usize,
    /// Page count of the from-scratch layout, if one was packed
    pub shadow_page_count: Option<usize>,
    pub improvement_offered: bool,
    pub improvement_accepted: bool,
    /// Textures that no longer back any page; the host may free them
    pub released_textures: Vec<TextureHandle>,
    pub upload_errors: Vec<AtlasError>,
    /// Sprite pixels composited, excluding padding
    pub used_pixels: u64,
    /// Base-level pixels across all pages
    pub total_pixels: u64,
}

impl BuildReport {
    /// Fraction of page area covered by sprites
    pub fn utilization(&self) -> f32 {
        if self.total_pixels == 0 {
            0.0
        } else {
            self.used_pixels as f32 / self.total_pixels as f32
        }
    }

    fn skip(&mut self, sprite: SpriteId, error: AtlasError) {
        tracing::error!("Skipping sprite {}: {}", sprite, error);
        self.skipped.push(SkippedSprite { sprite, error });
    }
}

/// Packing order key: widest first, taller first among equal widths
pub fn sort_key(width: u32, height: u32) -> u64 {
    width as u64 * SORT_KEY_WIDTH_FACTOR + height as u64
}

/// Run one build of `atlas` against the current sprite membership.
///
/// Never fails as a whole: sprites that cannot be packed are logged and
/// listed in the report, and the atlas keeps whatever did fit.
pub fn run_build(
    atlas: &mut Atlas,
    sprites: &mut dyn SpriteRegistry,
    textures: &mut dyn TextureBackend,
    confirm: &mut dyn ConfirmRepack,
    config: &BuildConfig,
) -> BuildReport {
    let settings = atlas.settings.clamped();
    let mut report = BuildReport::default();

    if atlas.settings_changed(&settings) || atlas.rebuild_requested {
        tracing::info!(
            "Full rebuild of {} ({}x{}, padding {})",
            atlas.id(),
            settings.width,
            settings.height,
            settings.padding
        );
        atlas.slots.clear();
        atlas.incremental_build_counter = 0;
        atlas.rebuild_requested = false;
        report.full_rebuild = true;
    } else {
        atlas.incremental_build_counter += 1;
        tracing::debug!("Incremental build {} of {}", atlas.incremental_build_counter, atlas.id());
    }
    atlas.record_built(&settings);
    report.incremental_build_counter = atlas.incremental_build_counter;

    let previous_textures = atlas.generated_textures.clone();
    let members = evict_departed(atlas, &*sprites, &mut report);
    let order = packing_order(atlas, &members, &*sprites, &mut report);

    let mut shadow = config.test_for_improvement.then(SlotStore::new);
    pack_sprites(atlas, &order, &*sprites, &settings, shadow.as_mut(), &mut report);

    if let Some(shadow) = shadow {
        offer_repack(atlas, shadow, confirm, &mut report);
    }

    // Pages left without any sprite are dropped before compaction
    atlas.slots.drop_unoccupied_pages();
    let remap = remap_pages(&mut atlas.slots, &atlas.generated_textures, textures);

    // Sizes must be read before this build's uploads replace them
    let page_dims_changed: Vec<bool> = remap
        .textures
        .iter()
        .zip(&remap.force_dirty)
        .map(|(texture, force_dirty)| {
            *force_dirty || textures.texture_size(*texture) != Some((settings.width, settings.height))
        })
        .collect();

    let composited = composite_pages(atlas, &remap.textures, &*sprites, textures, &settings, &mut report);

    // Point sprites at their new placement
    for slot in atlas.slots.iter() {
        let Some(id) = slot.occupant else {
            continue;
        };
        if !composited.contains(&id) {
            continue;
        }
        let Some(sprite) = sprites.resolve_mut(id) else {
            continue;
        };

        let page = slot.page as usize;
        let backing = SpriteBacking {
            texture: remap.textures[page],
            uv_origin: (slot.x + settings.padding, slot.y + settings.padding),
            dimension: sprite.source_size(),
        };

        if sprite.backing() != Some(backing) || page_dims_changed[page] {
            sprite.set_backing(backing);
            sprite.notify_rebuilt();
            sprite.notify_changed();
            report.updated.push(id);
        }
    }

    // Sprites left without a slot must not keep pointing into this atlas
    let owned: HashSet<TextureHandle> = previous_textures.iter().chain(&remap.textures).copied().collect();
    let unplaced: Vec<SpriteId> = members
        .iter()
        .chain(&report.evicted)
        .copied()
        .filter(|id| atlas.slots.find_sprite(*id).is_none())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    for id in unplaced {
        let Some(sprite) = sprites.resolve_mut(id) else {
            continue;
        };
        if sprite.backing().is_some_and(|b| owned.contains(&b.texture)) {
            tracing::debug!("Cleared stale placement of sprite {}", id);
            sprite.clear_backing();
            sprite.notify_changed();
            report.updated.push(id);
        }
    }

    report.page_count = remap.page_count();
    report.released_textures = remap.released;
    atlas.generated_textures = remap.textures;
    atlas.needs_save = true;

    tracing::info!(
        "Built {}: {} sprites on {} pages ({:.1}% used), {} updated, {} skipped",
        atlas.id(),
        report.packed,
        report.page_count,
        report.utilization() * 100.0,
        report.updated.len(),
        report.skipped.len()
    );

    report
}

/// Clear slots of sprites that no longer belong to the atlas.
///
/// Returns the current membership, each sprite once, in registry order.
fn evict_departed(atlas: &mut Atlas, sprites: &dyn SpriteRegistry, report: &mut BuildReport) -> Vec<SpriteId> {
    let previous = atlas.slots.occupants();

    let mut seen = HashSet::new();
    let members: Vec<SpriteId> = sprites
        .sprites_referencing(atlas.id())
        .into_iter()
        .filter(|id| seen.insert(*id))
        .collect();

    for id in previous {
        if !seen.contains(&id) {
            atlas.slots.remove_occupant_for_sprite(id);
            tracing::debug!("Evicted sprite {} from {}", id, atlas.id());
            report.evicted.push(id);
        }
    }

    if !report.evicted.is_empty() {
        atlas.slots.merge_adjacent_free_slots();
    }

    members
}

/// Resolve members and sort them into packing order.
///
/// A member that cannot be resolved loses its slot, since nothing could be
/// drawn into it.
fn packing_order(
    atlas: &mut Atlas,
    members: &[SpriteId],
    sprites: &dyn SpriteRegistry,
    report: &mut BuildReport,
) -> Vec<(SpriteId, (u32, u32))> {
    let mut order = Vec::with_capacity(members.len());
    for id in members {
        match sprites.resolve(*id) {
            Some(sprite) => order.push((*id, sprite.source_size())),
            None => {
                if atlas.slots.remove_occupant_for_sprite(*id) > 0 {
                    report.evicted.push(*id);
                }
                report.skip(*id, AtlasError::SpriteNotResolved(*id));
            }
        }
    }

    // Descending key, ascending id among equal keys: a total order, so the
    // layout never depends on registry order
    order.sort_by(|(a_id, (aw, ah)), (b_id, (bw, bh))| {
        sort_key(*bw, *bh)
            .cmp(&sort_key(*aw, *ah))
            .then(a_id.cmp(b_id))
    });
    order
}

fn pack_sprites(
    atlas: &mut Atlas,
    order: &[(SpriteId, (u32, u32))],
    sprites: &dyn SpriteRegistry,
    settings: &ClampedSettings,
    mut shadow: Option<&mut SlotStore>,
    report: &mut BuildReport,
) {
    for &(id, (width, height)) in order {
        let has_source = sprites.resolve(id).is_some_and(|s| s.has_source_texture());
        if !has_source {
            report.skip(id, AtlasError::MissingSourceTexture(id));
            continue;
        }

        // Padding alone never earns a slot
        if width == 0 || height == 0 {
            if atlas.slots.remove_occupant_for_sprite(id) > 0 {
                report.evicted.push(id);
            }
            report.skip(id, AtlasError::EmptySprite { sprite: id, width, height });
            continue;
        }

        let (padded_width, padded_height) = settings.padded_size(width, height);
        let placement = find_best_slot(
            &mut atlas.slots,
            id,
            padded_width,
            padded_height,
            settings.width,
            settings.height,
        );
        if placement.evicted {
            report.evicted.push(id);
        }

        if !settings.fits_page(padded_width, padded_height) {
            report.skip(
                id,
                AtlasError::SpriteTooLarge {
                    sprite: id,
                    width: padded_width,
                    height: padded_height,
                    max_width: settings.width,
                    max_height: settings.height,
                },
            );
            continue;
        }

        if placement.slot.is_some() {
            report.packed += 1;
        }
        if placement.changed {
            report.placed += 1;
        }

        if let Some(shadow) = shadow.as_deref_mut() {
            find_best_slot(shadow, id, padded_width, padded_height, settings.width, settings.height);
        }
    }
}

/// Replace the layout with the shadow one if it uses fewer pages and the
/// host agrees
fn offer_repack(atlas: &mut Atlas, shadow: SlotStore, confirm: &mut dyn ConfirmRepack, report: &mut BuildReport) {
    let shadow_pages = shadow.count_distinct_occupied_pages();
    let current_pages = atlas.slots.count_distinct_occupied_pages();
    report.shadow_page_count = Some(shadow_pages);

    if shadow_pages >= current_pages {
        return;
    }

    report.improvement_offered = true;
    let message = format!(
        "{} can be repacked into {} pages instead of {}. Repacking moves most sprites, \
         and every moved sprite will be marked as changed. Repack now?",
        atlas.id(),
        shadow_pages,
        current_pages
    );

    if confirm.confirm_repack(&message) {
        tracing::info!("Repacking {}: {} -> {} pages", atlas.id(), current_pages, shadow_pages);
        atlas.slots = shadow;
        report.improvement_accepted = true;
    } else {
        tracing::info!(
            "Keeping incremental layout of {} ({} pages, {} possible)",
            atlas.id(),
            current_pages,
            shadow_pages
        );
    }
}

/// Composite and upload every page. Returns the sprites that were drawn.
fn composite_pages(
    atlas: &Atlas,
    page_textures: &[TextureHandle],
    sprites: &dyn SpriteRegistry,
    textures: &mut dyn TextureBackend,
    settings: &ClampedSettings,
    report: &mut BuildReport,
) -> HashSet<SpriteId> {
    let mut composited = HashSet::new();
    let padding = settings.padding;

    for (page, texture) in page_textures.iter().enumerate() {
        let mut buffer = PageBuffer::new(settings.width, settings.height, settings.mip_count);
        let mut rects = Vec::new();

        for slot in atlas.slots.iter().filter(|s| s.page == page as u32) {
            let Some(id) = slot.occupant else {
                continue;
            };
            let Some(sprite) = sprites.resolve(id) else {
                continue;
            };
            let Some(pixels) = sprite.read_source_pixels() else {
                continue;
            };

            let (width, height) = sprite.source_size();
            let (padded_width, padded_height) = settings.padded_size(width, height);
            if !slot.can_fit(padded_width, padded_height) {
                tracing::warn!("Sprite {} no longer fits its slot, not drawn", id);
                continue;
            }

            let expected = width as usize * height as usize * BYTES_PER_PIXEL;
            if pixels.len() != expected {
                report.skip(
                    id,
                    AtlasError::PixelDataSize {
                        sprite: id,
                        expected,
                        actual: pixels.len(),
                    },
                );
                continue;
            }

            let rect = SpriteRect::new(slot.x + padding, slot.y + padding, width, height);
            buffer.blit(rect, &pixels);
            buffer.fill_padding(rect, padding, settings.padding_mode);
            rects.push(rect);
            composited.insert(id);
            report.used_pixels += width as u64 * height as u64;
        }

        if settings.mip_count > 1 {
            let mask = ValidityMask::from_rects(settings.width, settings.height, &rects);
            generate_mip_chain(&mut buffer, mask);
        }

        tracing::debug!("Composited page {} of {} with {} sprites", page, atlas.id(), rects.len());
        report.total_pixels += settings.width as u64 * settings.height as u64;

        if let Err(err) = textures.upload(*texture, buffer.into_image()) {
            tracing::error!("Failed to upload page {} of {}: {}", page, atlas.id(), err);
            report.upload_errors.push(err);
        }
    }

    composited
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_key_orders_width_first() {
        assert!(sort_key(200, 50) > sort_key(100, 100));
        assert!(sort_key(100, 100) > sort_key(50, 50));
        assert!(sort_key(100, 101) > sort_key(100, 100));
        assert_eq!(sort_key(200, 50), 200 * 16384 + 50);
    }

    #[test]
    fn test_repack_policy() {
        assert!(!RepackPolicy::KeepIncremental.confirm_repack("repack?"));
        assert!(RepackPolicy::AlwaysRepack.confirm_repack("repack?"));
    }

    #[test]
    fn test_closure_confirm() {
        let mut asked = Vec::new();
        let mut confirm = |message: &str| {
            asked.push(message.to_string());
            true
        };
        assert!(confirm.confirm_repack("fewer pages"));
        assert_eq!(asked, vec!["fewer pages".to_string()]);
    }

    #[test]
    fn test_utilization() {
        let report = BuildReport {
            used_pixels: 64,
            total_pixels: 256,
            ..Default::default()
        };
        assert_eq!(report.utilization(), 0.25);
        assert_eq!(BuildReport::default().utilization(), 0.0);
    }
}

//! Atlas Slot Store
//!
//! Flat, insertion-ordered list of page rectangles. A slot is either free or
//! holds exactly one sprite. Placing a sprite shrinks the slot to the
//! sprite's padded size and splits the remainder guillotine-style into two
//! new free slots. Slots are never removed individually; eviction only
//! clears the occupant.
//!
//! Lookups are linear scans. Atlases hold at most a few hundred sprites and
//! the first-match tie-break in insertion order is part of the layout
//! contract, so there is no spatial index.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::sprite::SpriteId;

/// Index of a slot within its store
pub type SlotIndex = usize;

/// One rectangle on an atlas page, free or occupied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasSlot {
    /// Page this slot lives on
    pub page: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Sprite placed here; `None` for a free slot
    pub occupant: Option<SpriteId>,
}

impl AtlasSlot {
    pub fn is_free(&self) -> bool {
        self.occupant.is_none()
    }

    pub fn can_fit(&self, width: u32, height: u32) -> bool {
        self.width >= width && self.height >= height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Whether two slots on the same page cover a common pixel
    pub fn overlaps(&self, other: &AtlasSlot) -> bool {
        self.page == other.page
            && self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

/// All slots of one atlas
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStore {
    slots: Vec<AtlasSlot>,
}

impl SlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a free slot.
    ///
    /// Returns `None` without touching the store when either side is zero;
    /// guillotine splits at page edges produce such remainders routinely.
    pub fn create_empty_slot(&mut self, page: u32, x: u32, y: u32, width: u32, height: u32) -> Option<SlotIndex> {
        if width == 0 || height == 0 {
            return None;
        }

        self.slots.push(AtlasSlot {
            page,
            x,
            y,
            width,
            height,
            occupant: None,
        });
        Some(self.slots.len() - 1)
    }

    /// Place `sprite` at the top-left of a slot already known to fit it.
    ///
    /// The slot shrinks to exactly `width x height`. The remainder becomes a
    /// bottom strip and a right strip; the axis with less leftover decides
    /// which strip spans the full original extent:
    /// - leftover height <= leftover width: bottom strip is `width` wide, right
    ///   strip is the full original height
    /// - otherwise: bottom strip is the full original width, right strip is
    ///   `height` tall
    pub fn insert_sprite(&mut self, index: SlotIndex, sprite: SpriteId, width: u32, height: u32) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        debug_assert!(slot.can_fit(width, height));

        let original = *slot;
        slot.occupant = Some(sprite);
        slot.width = width;
        slot.height = height;

        let leftover_width = original.width - width;
        let leftover_height = original.height - height;

        if leftover_height <= leftover_width {
            self.create_empty_slot(original.page, original.x, original.y + height, width, leftover_height);
            self.create_empty_slot(original.page, original.x + width, original.y, leftover_width, original.height);
        } else {
            self.create_empty_slot(original.page, original.x, original.y + height, original.width, leftover_height);
            self.create_empty_slot(original.page, original.x + width, original.y, leftover_width, height);
        }
    }

    /// Clear every slot occupied by `sprite`. Returns how many were cleared.
    pub fn remove_occupant_for_sprite(&mut self, sprite: SpriteId) -> usize {
        let mut cleared = 0;
        for slot in &mut self.slots {
            if slot.occupant == Some(sprite) {
                slot.occupant = None;
                cleared += 1;
            }
        }
        cleared
    }

    /// Merge neighbouring free slots after evictions.
    ///
    /// Free slots are currently left as they are; fragments are reclaimed
    /// by the shadow repack instead.
    pub fn merge_adjacent_free_slots(&mut self) {}

    /// Number of distinct page indices used by any slot, free or occupied
    pub fn count_distinct_occupied_pages(&self) -> usize {
        self.slots.iter().map(|s| s.page).collect::<BTreeSet<_>>().len()
    }

    /// Highest page index in use, if any
    pub fn max_page(&self) -> Option<u32> {
        self.slots.iter().map(|s| s.page).max()
    }

    /// Sprites occupying slots, in slot order, each listed once
    pub fn occupants(&self) -> Vec<SpriteId> {
        let mut seen = BTreeSet::new();
        self.slots
            .iter()
            .filter_map(|s| s.occupant)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// First slot holding `sprite`
    pub fn find_sprite(&self, sprite: SpriteId) -> Option<SlotIndex> {
        self.slots.iter().position(|s| s.occupant == Some(sprite))
    }

    /// Drop every slot on a page with no occupant at all
    pub fn drop_unoccupied_pages(&mut self) -> usize {
        let occupied: BTreeSet<u32> = self.slots.iter().filter(|s| !s.is_free()).map(|s| s.page).collect();
        let before = self.slots.len();
        self.slots.retain(|s| occupied.contains(&s.page));
        before - self.slots.len()
    }

    pub fn get(&self, index: SlotIndex) -> Option<&AtlasSlot> {
        self.slots.get(index)
    }

    pub fn get_mut(&mut self, index: SlotIndex) -> Option<&mut AtlasSlot> {
        self.slots.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AtlasSlot> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AtlasSlot> {
        self.slots.iter_mut()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

//! Bin Packer
//!
//! Chooses a slot for one sprite, in strict order:
//! 1. reuse the sprite's existing slot if it still fits (evict it otherwise)
//! 2. best-fit free slot by smallest leftover area, first found on ties
//! 3. a fresh page appended after the highest page in use

use crate::slot::{SlotIndex, SlotStore};
use crate::sprite::SpriteId;

/// Outcome of placing one sprite
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Placement {
    /// Slot the sprite now occupies, `None` if it was not packed
    pub slot: Option<SlotIndex>,
    /// The sprite's placement or stored size changed
    pub changed: bool,
    /// The sprite lost a previous slot that no longer fits it
    pub evicted: bool,
}

/// Place a sprite of padded size `width x height` into `store`.
///
/// `page_width`/`page_height` are the fixed page dimensions. A sprite
/// larger than a page, or with a zero side, still goes through the reuse
/// step so a stale slot is released, but nothing is allocated for it.
pub fn find_best_slot(
    store: &mut SlotStore,
    sprite: SpriteId,
    width: u32,
    height: u32,
    page_width: u32,
    page_height: u32,
) -> Placement {
    let mut placement = Placement::default();
    let fittable = width > 0 && height > 0 && width <= page_width && height <= page_height;

    // Reuse pass
    if let Some(index) = store.find_sprite(sprite) {
        if let Some(slot) = store.get_mut(index) {
            if fittable && slot.can_fit(width, height) {
                placement.slot = Some(index);
                placement.changed = slot.width != width || slot.height != height;
                return placement;
            }

            // Grew out of its slot: release it and pack as new
            slot.occupant = None;
            placement.evicted = true;
        }
    }

    if !fittable {
        return placement;
    }

    // Best-fit pass
    if let Some(index) = best_free_slot(store, width, height) {
        store.insert_sprite(index, sprite, width, height);
        placement.slot = Some(index);
        placement.changed = true;
        return placement;
    }

    // New page pass
    let page = store.max_page().map_or(0, |p| p + 1);
    if let Some(index) = store.create_empty_slot(page, 0, 0, page_width, page_height) {
        store.insert_sprite(index, sprite, width, height);
        placement.slot = Some(index);
        placement.changed = true;
    }

    placement
}

/// Free slot with the smallest leftover area that fits, first one on ties
fn best_free_slot(store: &SlotStore, width: u32, height: u32) -> Option<SlotIndex> {
    let mut best_index = None;
    let mut best_leftover = u64::MAX;

    for (i, slot) in store.iter().enumerate() {
        if !slot.is_free() || !slot.can_fit(width, height) {
            continue;
        }

        let leftover = (slot.width - width) as u64 * (slot.height - height) as u64;
        if best_index.is_none() || leftover < best_leftover {
            best_index = Some(i);
            best_leftover = leftover;
        }
    }

    best_index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(store: &mut SlotStore, id: u64, w: u32, h: u32) -> Placement {
        find_best_slot(store, SpriteId(id), w, h, 256, 256)
    }

    #[test]
    fn test_first_sprite_opens_page() {
        let mut store = SlotStore::new();
        let placement = place(&mut store, 1, 204, 54);
        assert!(placement.changed);

        let slot = store.get(placement.slot.unwrap()).unwrap();
        assert_eq!((slot.page, slot.x, slot.y), (0, 0, 0));
        assert_eq!(slot.occupant, Some(SpriteId(1)));
    }

    #[test]
    fn test_best_fit_picks_smallest_leftover() {
        let mut store = SlotStore::new();
        place(&mut store, 1, 204, 54);
        place(&mut store, 2, 104, 104);
        let c = place(&mut store, 3, 54, 54);

        let slot = store.get(c.slot.unwrap()).unwrap();
        // Below the 104x104 sprite: leftover 50 * 44 beats 98 * 148
        assert_eq!((slot.page, slot.x, slot.y), (0, 0, 158));
        assert_eq!(store.count_distinct_occupied_pages(), 1);
    }

    #[test]
    fn test_ties_go_to_first_slot() {
        let mut store = SlotStore::new();
        store.create_empty_slot(0, 0, 0, 32, 32);
        store.create_empty_slot(0, 32, 0, 32, 32);
        let placement = place(&mut store, 1, 32, 32);
        assert_eq!(placement.slot, Some(0));
    }

    #[test]
    fn test_new_page_after_highest() {
        let mut store = SlotStore::new();
        store.create_empty_slot(2, 0, 0, 8, 8);
        let placement = place(&mut store, 1, 100, 100);
        assert_eq!(store.get(placement.slot.unwrap()).unwrap().page, 3);
    }

    #[test]
    fn test_reuse_in_place() {
        let mut store = SlotStore::new();
        let first = place(&mut store, 1, 64, 64);
        let slots_before = store.len();

        let again = place(&mut store, 1, 64, 64);
        assert_eq!(again.slot, first.slot);
        assert!(!again.changed);
        assert_eq!(store.len(), slots_before);

        // Shrinking keeps the slot but reports a change
        let smaller = place(&mut store, 1, 60, 60);
        assert_eq!(smaller.slot, first.slot);
        assert!(smaller.changed);
    }

    #[test]
    fn test_grown_sprite_is_repacked() {
        let mut store = SlotStore::new();
        let first = place(&mut store, 1, 64, 64);
        let grown = place(&mut store, 1, 100, 100);

        assert!(grown.evicted);
        assert!(grown.changed);
        assert_ne!(grown.slot, first.slot);
        assert!(store.get(first.slot.unwrap()).unwrap().is_free());
        assert_eq!(store.iter().filter(|s| s.occupant == Some(SpriteId(1))).count(), 1);
    }

    #[test]
    fn test_oversized_sprite_only_evicts() {
        let mut store = SlotStore::new();
        let first = place(&mut store, 1, 64, 64);
        let slots_before = store.len();

        let oversized = place(&mut store, 1, 300, 64);
        assert_eq!(oversized.slot, None);
        assert!(oversized.evicted);
        assert_eq!(store.len(), slots_before);
        assert!(store.get(first.slot.unwrap()).unwrap().is_free());
    }

    #[test]
    fn test_empty_sprite_never_gets_a_slot() {
        let mut store = SlotStore::new();
        let empty = place(&mut store, 1, 0, 5);
        assert_eq!(empty, Placement::default());
        assert!(store.is_empty());

        // A sprite that shrank to nothing gives up its slot
        let first = place(&mut store, 2, 32, 32);
        let shrunk = place(&mut store, 2, 32, 0);
        assert_eq!(shrunk.slot, None);
        assert!(shrunk.evicted);
        assert!(store.get(first.slot.unwrap()).unwrap().is_free());
        assert!(store.iter().all(|s| s.area() > 0));
    }
}

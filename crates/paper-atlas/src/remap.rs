//! Dense Page Remapping
//!
//! Packing can leave gaps in page indices (a page whose sprites were all
//! evicted). Pages are renumbered `0..N` in order of first appearance in the
//! slot list, and page textures follow their page to its new index.

use std::collections::HashMap;

use crate::slot::SlotStore;
use crate::texture::{TextureBackend, TextureHandle};

/// Page textures after remapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRemap {
    /// Texture per dense page index
    pub textures: Vec<TextureHandle>,
    /// Pages that had no texture before this build
    pub force_dirty: Vec<bool>,
    /// Previous textures no longer backing any page
    pub released: Vec<TextureHandle>,
}

impl PageRemap {
    pub fn page_count(&self) -> usize {
        self.textures.len()
    }
}

/// Renumber pages densely and carry page textures forward.
///
/// `previous` holds the texture of each page index as of the last build.
/// Pages without one get a freshly allocated texture and are flagged
/// force-dirty.
pub fn remap_pages(store: &mut SlotStore, previous: &[TextureHandle], textures: &mut dyn TextureBackend) -> PageRemap {
    let mut dense: HashMap<u32, u32> = HashMap::new();
    let mut remap = PageRemap::default();

    for slot in store.iter_mut() {
        let old_page = slot.page;
        let new_page = match dense.get(&old_page) {
            Some(index) => *index,
            None => {
                let index = remap.textures.len() as u32;
                match previous.get(old_page as usize) {
                    Some(texture) => {
                        remap.textures.push(*texture);
                        remap.force_dirty.push(false);
                    }
                    None => {
                        remap.textures.push(textures.allocate_texture());
                        remap.force_dirty.push(true);
                    }
                }
                dense.insert(old_page, index);
                index
            }
        };
        slot.page = new_page;
    }

    remap.released = previous
        .iter()
        .enumerate()
        .filter(|(page, _)| !dense.contains_key(&(*page as u32)))
        .map(|(_, texture)| *texture)
        .collect();

    if dense.iter().any(|(old, new)| old != new) {
        tracing::debug!("Remapped {} atlas pages to a dense range", dense.len());
    }

    remap
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sprite::SpriteId;
    use crate::texture::MemoryTextureBackend;

    #[test]
    fn test_sparse_pages_compacted() {
        let mut store = SlotStore::new();
        store.create_empty_slot(3, 0, 0, 8, 8);
        store.create_empty_slot(0, 0, 0, 8, 8);
        store.create_empty_slot(3, 8, 0, 8, 8);

        let mut backend = MemoryTextureBackend::new();
        let previous: Vec<_> = (0..4).map(|_| backend.allocate_texture()).collect();

        let remap = remap_pages(&mut store, &previous, &mut backend);

        let pages: Vec<u32> = store.iter().map(|s| s.page).collect();
        assert_eq!(pages, vec![0, 1, 0]);
        assert_eq!(remap.textures, vec![previous[3], previous[0]]);
        assert_eq!(remap.force_dirty, vec![false, false]);
        assert_eq!(remap.released, vec![previous[1], previous[2]]);
    }

    #[test]
    fn test_new_page_gets_fresh_texture() {
        let mut store = SlotStore::new();
        let a = store.create_empty_slot(0, 0, 0, 8, 8).unwrap();
        store.insert_sprite(a, SpriteId(1), 8, 8);
        store.create_empty_slot(1, 0, 0, 8, 8);

        let mut backend = MemoryTextureBackend::new();
        let previous = vec![backend.allocate_texture()];

        let remap = remap_pages(&mut store, &previous, &mut backend);
        assert_eq!(remap.page_count(), 2);
        assert_eq!(remap.textures[0], previous[0]);
        assert_ne!(remap.textures[1], previous[0]);
        assert_eq!(remap.force_dirty, vec![false, true]);
        assert_eq!(backend.len(), 2);
    }
}

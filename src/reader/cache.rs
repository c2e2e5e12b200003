//! Bounded, durable page image cache with insertion-order eviction

use std::collections::VecDeque;
use std::rc::Rc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::types::{EncodedImage, PageNumber};
use crate::storage::KeyValueStore;

/// Default capacity of the page store
pub const MAX_CACHED_PAGES: usize = 50;

const INDEX_KEY: &str = "pages/index";

fn page_key(page: PageNumber) -> String {
    format!("pages/{page}")
}

/// Scale stored as thousandths for stable comparison
fn scale_millis(scale: f32) -> u32 {
    (scale * 1000.0).round() as u32
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredIndex {
    scale_millis: u32,
    order: Vec<PageNumber>,
}

/// FIFO page cache.
///
/// Entries are evicted strictly in insertion order; reading an entry does
/// not promote it. All images in the store were rendered at the same
/// scale. Storage failures are logged and behave as misses or no-ops.
pub struct PageStore {
    storage: Rc<dyn KeyValueStore>,
    capacity: usize,
    scale_millis: u32,
    order: VecDeque<PageNumber>,
}

impl PageStore {
    /// Restore the store from `storage`. An unreadable index or one written
    /// at a different scale starts the cache over.
    pub fn open(storage: Rc<dyn KeyValueStore>, capacity: usize, scale: f32) -> Self {
        let mut store = Self {
            storage,
            capacity: capacity.max(1),
            scale_millis: scale_millis(scale),
            order: VecDeque::new(),
        };

        match store.load_index() {
            Some(index) if index.scale_millis == store.scale_millis => {
                let mut seen = std::collections::HashSet::new();
                store.order = index
                    .order
                    .into_iter()
                    .filter(|page| seen.insert(*page))
                    .collect();
                while store.order.len() > store.capacity {
                    store.evict_oldest();
                }
                debug!("Restored {} cached pages", store.order.len());
            }
            Some(index) => {
                debug!(
                    "Cached pages were rendered at scale {} (now {}), discarding",
                    index.scale_millis, store.scale_millis
                );
                store.order = index.order.into_iter().collect();
                store.clear();
            }
            None => {}
        }

        store
    }

    fn load_index(&self) -> Option<StoredIndex> {
        match self.storage.get(INDEX_KEY) {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(index) => Some(index),
                Err(e) => {
                    warn!("Page cache index is malformed, resetting: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read page cache index: {e}");
                None
            }
        }
    }

    fn persist_index(&self) {
        let index = StoredIndex {
            scale_millis: self.scale_millis,
            order: self.order.iter().copied().collect(),
        };
        let result = serde_json::to_vec(&index)
            .map_err(crate::error::StorageError::from)
            .and_then(|bytes| self.storage.put(INDEX_KEY, &bytes));
        if let Err(e) = result {
            warn!("Failed to persist page cache index: {e}");
        }
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.order.pop_front() {
            debug!("Evicting cached page {oldest}");
            if let Err(e) = self.storage.remove(&page_key(oldest)) {
                warn!("Failed to remove cached page {oldest}: {e}");
            }
        }
    }

    /// Cached image for `page`, if any. A missing blob drops the entry.
    pub fn get(&mut self, page: PageNumber) -> Option<EncodedImage> {
        if !self.contains(page) {
            return None;
        }

        match self.storage.get(&page_key(page)) {
            Ok(Some(bytes)) => Some(EncodedImage::from_bytes(bytes)),
            Ok(None) => {
                warn!("Cached page {page} vanished from storage");
                self.forget(page);
                None
            }
            Err(e) => {
                warn!("Failed to read cached page {page}: {e}");
                None
            }
        }
    }

    /// Store `image` for `page`. A page already present keeps its place in
    /// the eviction order.
    pub fn put(&mut self, page: PageNumber, image: &EncodedImage) {
        let fresh = !self.contains(page);

        // Nothing is evicted unless the new blob made it to storage
        if let Err(e) = self.storage.put(&page_key(page), image.as_bytes()) {
            warn!("Failed to cache page {page}: {e}");
            if !fresh {
                self.forget(page);
            }
            return;
        }

        if fresh {
            while self.order.len() >= self.capacity {
                self.evict_oldest();
            }
            self.order.push_back(page);
            self.persist_index();
        }
    }

    /// Drop the cached image for `page`
    pub fn invalidate(&mut self, page: PageNumber) {
        if !self.contains(page) {
            return;
        }
        if let Err(e) = self.storage.remove(&page_key(page)) {
            warn!("Failed to remove cached page {page}: {e}");
        }
        self.forget(page);
    }

    fn forget(&mut self, page: PageNumber) {
        self.order.retain(|p| *p != page);
        self.persist_index();
    }

    /// Remove every cached page
    pub fn clear(&mut self) {
        for page in std::mem::take(&mut self.order) {
            if let Err(e) = self.storage.remove(&page_key(page)) {
                warn!("Failed to remove cached page {page}: {e}");
            }
        }
        self.persist_index();
    }

    /// Switch to a new render scale, discarding images at the old one
    pub fn rescale(&mut self, scale: f32) {
        let millis = scale_millis(scale);
        if millis == self.scale_millis {
            return;
        }
        self.scale_millis = millis;
        self.clear();
    }

    /// Whether images rendered at `scale` belong in this store
    #[must_use]
    pub fn accepts_scale(&self, scale: f32) -> bool {
        scale_millis(scale) == self.scale_millis
    }

    #[must_use]
    pub fn contains(&self, page: PageNumber) -> bool {
        self.order.contains(&page)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached pages, oldest first
    pub fn pages(&self) -> impl Iterator<Item = PageNumber> + '_ {
        self.order.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStore, MemoryStore};
    use crate::test_utils::FlakyStore;

    fn page(n: u32) -> PageNumber {
        PageNumber::new(n).unwrap()
    }

    fn image(tag: u8) -> EncodedImage {
        EncodedImage::from_bytes(vec![tag; 8])
    }

    fn memory() -> Rc<MemoryStore> {
        Rc::new(MemoryStore::new())
    }

    #[test]
    fn put_and_get() {
        let mut store = PageStore::open(memory(), 10, 1.0);

        assert!(store.get(page(1)).is_none());
        store.put(page(1), &image(1));

        assert_eq!(store.get(page(1)), Some(image(1)));
        assert!(store.contains(page(1)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn evicts_in_insertion_order_regardless_of_reads() {
        let mut store = PageStore::open(memory(), 3, 1.0);

        store.put(page(1), &image(1));
        store.put(page(2), &image(2));
        store.put(page(3), &image(3));

        // Reading page 1 must not save it
        assert!(store.get(page(1)).is_some());
        assert!(store.get(page(1)).is_some());

        store.put(page(4), &image(4));

        assert!(!store.contains(page(1)));
        assert_eq!(store.pages().collect::<Vec<_>>(), vec![page(2), page(3), page(4)]);
    }

    #[test]
    fn fifty_first_page_evicts_the_first_inserted() {
        let storage = memory();
        let mut store = PageStore::open(storage.clone(), MAX_CACHED_PAGES, 1.0);

        for n in 1..=51 {
            store.put(page(n), &image(n as u8));
        }

        assert_eq!(store.len(), MAX_CACHED_PAGES);
        assert!(!store.contains(page(1)));
        assert!(store.contains(page(2)));
        assert!(!storage.contains_key("pages/1"));
    }

    #[test]
    fn re_put_keeps_original_position() {
        let mut store = PageStore::open(memory(), 2, 1.0);

        store.put(page(1), &image(1));
        store.put(page(2), &image(2));
        store.put(page(1), &image(9));
        store.put(page(3), &image(3));

        assert!(!store.contains(page(1)));
        assert_eq!(store.get(page(2)), Some(image(2)));
        assert_eq!(store.get(page(3)), Some(image(3)));
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Rc::new(FileStore::open(dir.path()).unwrap());

        {
            let mut store = PageStore::open(storage.clone(), 5, 1.5);
            store.put(page(7), &image(7));
            store.put(page(3), &image(3));
        }

        let mut store = PageStore::open(storage, 5, 1.5);
        assert_eq!(store.pages().collect::<Vec<_>>(), vec![page(7), page(3)]);
        assert_eq!(store.get(page(3)), Some(image(3)));
    }

    #[test]
    fn reopen_at_other_scale_discards_everything() {
        let storage = memory();
        {
            let mut store = PageStore::open(storage.clone(), 5, 1.0);
            store.put(page(1), &image(1));
        }

        let store = PageStore::open(storage.clone(), 5, 2.0);
        assert!(store.is_empty());
        assert!(!storage.contains_key("pages/1"));
    }

    #[test]
    fn rescale_and_invalidate() {
        let mut store = PageStore::open(memory(), 5, 1.0);
        store.put(page(1), &image(1));
        store.put(page(2), &image(2));

        store.invalidate(page(1));
        assert_eq!(store.pages().collect::<Vec<_>>(), vec![page(2)]);

        store.rescale(1.0);
        assert_eq!(store.len(), 1);

        store.rescale(1.1);
        assert!(store.is_empty());
        assert!(store.accepts_scale(1.1));
        assert!(!store.accepts_scale(1.0));
    }

    #[test]
    fn storage_failures_degrade_to_misses() {
        let storage = Rc::new(FlakyStore::new());
        let mut store = PageStore::open(storage.clone(), 5, 1.0);

        storage.fail_writes(true);
        store.put(page(1), &image(1));
        assert!(!store.contains(page(1)));

        storage.fail_writes(false);
        store.put(page(1), &image(1));
        storage.fail_reads(true);
        assert_eq!(store.get(page(1)), None);

        storage.fail_reads(false);
        assert_eq!(store.get(page(1)), Some(image(1)));
    }

    #[test]
    fn failed_write_keeps_existing_entries() {
        let storage = Rc::new(FlakyStore::new());
        let mut store = PageStore::open(storage.clone(), 2, 1.0);
        store.put(page(1), &image(1));
        store.put(page(2), &image(2));

        storage.fail_writes(true);
        store.put(page(3), &image(3));
        storage.fail_writes(false);

        assert_eq!(store.pages().collect::<Vec<_>>(), vec![page(1), page(2)]);
        assert_eq!(store.get(page(1)), Some(image(1)));

        let reopened = PageStore::open(storage, 2, 1.0);
        assert_eq!(reopened.pages().collect::<Vec<_>>(), vec![page(1), page(2)]);
    }

    #[test]
    fn malformed_index_resets() {
        let storage = memory();
        storage.put(INDEX_KEY, b"not json").unwrap();

        let store = PageStore::open(storage, 5, 1.0);
        assert!(store.is_empty());
    }
}

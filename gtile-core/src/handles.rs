//! Open dataset handles, shared across requests
//!
//! Handles are keyed by backing path and opened lazily. Each path has its
//! own slot lock, so two requests for the same unopened file open it once
//! while different files open in parallel.

use crate::error::TileResult;
use crate::readers::Reader;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Default)]
struct Slot {
    reader: Mutex<Option<Arc<Reader>>>,
    last_used: Mutex<Option<Instant>>,
}

pub struct HandleCache {
    slots: DashMap<PathBuf, Arc<Slot>>,
    max_open: usize,
}

impl HandleCache {
    pub fn new(max_open: usize) -> Self {
        Self { slots: DashMap::new(), max_open: max_open.max(1) }
    }

    /// Number of open handles
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.reader.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the handle for `path`, opening it with `open` on first use.
    ///
    /// Blocks on the path's slot while another caller is opening it.
    pub fn get_or_open<F>(&self, path: &Path, open: F) -> TileResult<Arc<Reader>>
    where
        F: FnOnce() -> TileResult<Reader>,
    {
        let slot = self.slots.entry(path.to_path_buf()).or_default().clone();

        let reader = {
            let mut guard = slot.reader.lock();
            match guard.as_ref() {
                Some(reader) => reader.clone(),
                None => {
                    let reader = Arc::new(open()?);
                    log::debug!("Opened {} handle for {}", reader.filetype(), path.display());
                    *guard = Some(reader.clone());
                    reader
                }
            }
        };
        *slot.last_used.lock() = Some(Instant::now());

        self.evict_idle(path);
        Ok(reader)
    }

    /// Close least recently used handles nobody holds until under the limit
    fn evict_idle(&self, keep: &Path) {
        let open = self.len();
        if open <= self.max_open {
            return;
        }

        let mut idle: Vec<(Instant, PathBuf)> = self
            .slots
            .iter()
            .filter(|entry| entry.key() != keep)
            .filter_map(|entry| {
                let reader = entry.reader.lock();
                let held = reader.as_ref().map_or(true, |r| Arc::strong_count(r) > 1);
                if held {
                    return None;
                }
                let used = (*entry.last_used.lock())?;
                Some((used, entry.key().clone()))
            })
            .collect();
        idle.sort();

        for (_, path) in idle.into_iter().take(open - self.max_open) {
            if let Some((_, slot)) = self.slots.remove(&path) {
                log::debug!("Evicting idle handle for {}", path.display());
                slot.reader.lock().take();
            }
        }
    }

    /// Drop every handle
    pub fn clear(&self) {
        let count = self.len();
        self.slots.clear();
        log::debug!("Closed {} dataset handles", count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::MemoryContainer;
    use crate::readers::reader_from_container;
    use crate::types::FileType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn open_hitile() -> TileResult<Reader> {
        let mut c = MemoryContainer::new();
        c.set_attr("meta", "tile-size", 4i64);
        c.set_attr("meta", "max-zoom", 0i64);
        c.set_attr("meta", "max-length", 4i64);
        c.add_floats("values_0", vec![1.0; 4]);
        reader_from_container(FileType::Hitile, Box::new(c))
    }

    #[test]
    fn test_opens_each_path_once() {
        let cache = HandleCache::new(4);
        let opens = AtomicUsize::new(0);
        let counted = || {
            opens.fetch_add(1, Ordering::SeqCst);
            open_hitile()
        };
        let a = cache.get_or_open(Path::new("/a"), counted).unwrap();
        let b = cache.get_or_open(Path::new("/a"), counted).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_open_is_retried() {
        let cache = HandleCache::new(4);
        let failed = cache.get_or_open(Path::new("/x"), || Err(crate::error::TileError::corrupt("boom")));
        assert!(failed.is_err());
        assert!(cache.is_empty());
        assert!(cache.get_or_open(Path::new("/x"), open_hitile).is_ok());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_idle_handles_only() {
        let cache = HandleCache::new(2);
        let held = cache.get_or_open(Path::new("/held"), open_hitile).unwrap();
        drop(cache.get_or_open(Path::new("/idle"), open_hitile).unwrap());
        drop(cache.get_or_open(Path::new("/new"), open_hitile).unwrap());
        assert_eq!(cache.len(), 2);
        let again = cache.get_or_open(Path::new("/held"), open_hitile).unwrap();
        assert!(Arc::ptr_eq(&held, &again));

        cache.clear();
        assert!(cache.is_empty());
    }
}

//! The memoization engine.
//!
//! `MemoCache::get_or_compute` is the Rust shape of `memoize(f, keyFn)`: a missing or dirty
//! entry re-invokes `f`, records every dependency tag touched (including ones touched
//! transitively by other `MemoCache`s invoked during the call, via [`DependencyTracker`]
//! composition), and subscribes the entry to all of them. `keyFn` returning "no key" is modeled
//! as the caller passing `None` for the key, which bypasses caching entirely.

use crate::dependency::{DependencyTag, DependencyTracker};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

struct Entry<V> {
    value: V,
    dirty: Rc<Cell<bool>>,
}

/// A memoized cache of `K -> V`, backed by a shared [`DependencyTracker`].
///
/// Entries are never evicted: the cache grows until explicitly cleared, same as the store
/// itself. `dirty` only flips a flag, it never removes the stored value, so a later
/// recomputation with the same key can still observe the previous value if needed (e.g. for
/// diagnostics).
pub struct MemoCache<K, V> {
    tracker: Rc<DependencyTracker>,
    entries: RefCell<HashMap<K, Entry<V>>>,
}

impl<K, V> MemoCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(tracker: Rc<DependencyTracker>) -> Self {
        MemoCache {
            tracker,
            entries: RefCell::new(HashMap::new()),
        }
    }

    /// Looks up `key` (if any); on a clean hit returns the cached value without running
    /// `compute`. On a miss, a dirty entry, or `key.is_none()` ("no-key" bypass), runs `compute`
    /// inside a fresh dependency frame and stores/refreshes the entry.
    pub fn get_or_compute(&self, key: Option<K>, compute: impl FnOnce() -> V) -> V {
        let Some(key) = key else {
            return compute();
        };
        if let Some(entry) = self.entries.borrow().get(&key) {
            if !entry.dirty.get() {
                return entry.value.clone();
            }
        }
        let frame = self.tracker.push_frame();
        let value = compute();
        let tags = frame.finish();
        let dirty = Rc::new(Cell::new(false));
        for tag in &tags {
            self.tracker.subscribe(tag.clone(), &dirty);
        }
        self.entries
            .borrow_mut()
            .insert(key, Entry { value: value.clone(), dirty });
        value
    }

    /// Marks the entry for `key` dirty, if one exists. The next `get_or_compute` call with an
    /// equal key will re-run `compute`.
    pub fn dirty(&self, key: &K) {
        if let Some(entry) = self.entries.borrow().get(key) {
            entry.dirty.set(true);
        }
    }

    /// Directly marks a dependency tag dirty through this cache's tracker — used when a caller
    /// (e.g. [`crate::store::RootStore::set`]) knows the tag without going through a specific
    /// memoized key.
    pub fn dirty_tag(&self, tag: &DependencyTag) {
        self.tracker.dirty(tag);
    }

    pub fn tracker(&self) -> &Rc<DependencyTracker> {
        &self.tracker
    }
}

//! The normalized store.

use crate::dependency::{DependencyTag, DependencyTracker};
use crate::id::StoreKey;
use crate::record::StoreRecord;
use indexmap::IndexMap;
use std::rc::Rc;

/// Shared read/write surface implemented by both [`RootStore`] and
/// [`crate::layer::LayerNode`], so the writer and reader can operate against "whatever the
/// current optimistic top is" without caring which.
pub trait Store {
    /// Fetches a record without registering a dependency. Used internally by `toObject`-style
    /// merges and by layer chain traversal, where recording a dependency on every ancestor touch
    /// would be both wrong (the caller, not the store, owns dependency semantics there) and
    /// wasteful.
    fn get_raw(&self, key: &StoreKey) -> Option<Rc<StoreRecord>>;

    fn set(&self, key: StoreKey, record: StoreRecord);

    fn delete(&self, key: &StoreKey);

    /// The dependency tracker this store's reads/writes register against.
    fn tracker(&self) -> &Rc<DependencyTracker>;

    /// Flattens this store (and, for layers, everything beneath it) into a plain mapping,
    /// children winning over ancestors on key collision.
    fn to_object(&self) -> IndexMap<StoreKey, StoreRecord>;

    /// Fetches a record and registers a dependency on it with the current memoization frame, if
    /// any.
    fn get(&self, key: &StoreKey) -> Option<Rc<StoreRecord>> {
        self.tracker().record(DependencyTag::Record(key.clone()));
        self.get_raw(key)
    }
}

/// The root store: owns the base data and the dependency tracker shared by every read that
/// isn't going through an optimistic layer.
pub struct RootStore {
    data: std::cell::RefCell<IndexMap<StoreKey, Rc<StoreRecord>>>,
    tracker: Rc<DependencyTracker>,
    /// Bumped on every `clear`/`replace`, so callers that want to key a cache on "which store
    /// generation did this read see" have a cheap, comparable value instead of needing to diff
    /// the whole map.
    identity: std::cell::Cell<u64>,
}

impl Default for RootStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RootStore {
    pub fn new() -> Self {
        RootStore {
            data: Default::default(),
            tracker: DependencyTracker::new(),
            identity: std::cell::Cell::new(0),
        }
    }

    pub fn identity(&self) -> u64 {
        self.identity.get()
    }

    /// Removes every mapping and dirties every tag that any of them could have been stored
    /// under. Whether to broadcast on clear is decided at the [`crate::cache::Cache`] layer;
    /// `Store::clear` itself only clears data and dirties dependents, it never broadcasts on its
    /// own.
    pub fn clear(&self) {
        let removed: Vec<StoreKey> = {
            let mut data = self.data.borrow_mut();
            let keys = data.keys().cloned().collect();
            data.clear();
            keys
        };
        for key in removed {
            self.dirty_record(&key);
        }
        self.identity.set(self.identity.get() + 1);
    }

    /// Makes this store's contents equal `mapping`, via the minimal sequence of deletes and sets.
    pub fn replace(&self, mapping: IndexMap<StoreKey, StoreRecord>) {
        let existing_keys: Vec<StoreKey> = self.data.borrow().keys().cloned().collect();
        for key in &existing_keys {
            if !mapping.contains_key(key) {
                self.delete(key);
            }
        }
        for (key, record) in mapping {
            self.set(key, record);
        }
        self.identity.set(self.identity.get() + 1);
    }

    fn dirty_record(&self, key: &StoreKey) {
        self.tracker.dirty(&DependencyTag::Record(key.clone()));
        if let Some(record) = self.data.borrow().get(key) {
            for field_key in record.fields.keys() {
                self.tracker
                    .dirty(&DependencyTag::Field(key.clone(), field_key.clone()));
            }
        }
    }
}

impl Store for RootStore {
    fn get_raw(&self, key: &StoreKey) -> Option<Rc<StoreRecord>> {
        self.data.borrow().get(key).cloned()
    }

    /// A no-op when `record` is structurally identical to what's already stored; Rust values
    /// don't carry the same notion of reference identity source objects do, so this approximates
    /// via value equality (documented in DESIGN.md). Otherwise dirties every field whose value
    /// changed, plus the record tag itself when the record was newly created or its typename
    /// changed, so whole-record dependents (registered by plain `get`) observe exactly those
    /// transitions and nothing more.
    fn set(&self, key: StoreKey, record: StoreRecord) {
        let mut data = self.data.borrow_mut();
        let (changed_fields, record_level_dirty): (Vec<_>, bool) = match data.get(&key) {
            Some(existing) => {
                if existing.as_ref() == &record {
                    return;
                }
                let changed = record
                    .fields
                    .iter()
                    .filter(|(field_key, value)| existing.get(field_key) != Some(*value))
                    .map(|(field_key, _)| field_key.clone())
                    .collect();
                (changed, existing.typename != record.typename)
            }
            None => (record.fields.keys().cloned().collect(), true),
        };
        data.insert(key.clone(), Rc::new(record));
        drop(data);
        for field_key in changed_fields {
            self.tracker.dirty(&DependencyTag::Field(key.clone(), field_key));
        }
        if record_level_dirty {
            self.tracker.dirty(&DependencyTag::Record(key));
        }
    }

    fn delete(&self, key: &StoreKey) {
        if self.data.borrow_mut().shift_remove(key).is_some() {
            self.dirty_record(key);
        }
    }

    fn tracker(&self) -> &Rc<DependencyTracker> {
        &self.tracker
    }

    fn to_object(&self) -> IndexMap<StoreKey, StoreRecord> {
        self.data
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.as_ref().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StoreFieldKey;
    use crate::value::StoreValue;

    fn record(field: &str, value: i64) -> StoreRecord {
        let mut r = StoreRecord::new(Some("A".into()));
        r.set(StoreFieldKey::new(field.into()), StoreValue::Scalar(value.into()));
        r
    }

    #[test]
    fn set_is_noop_for_structurally_identical_record() {
        let store = RootStore::new();
        let key = StoreKey::from("A:1");
        let tag = DependencyTag::Field(key.clone(), StoreFieldKey::new("v".into()));
        store.set(key.clone(), record("v", 1));
        let flag = Rc::new(std::cell::Cell::new(false));
        store.tracker.subscribe(tag.clone(), &flag);
        store.set(key, record("v", 1));
        assert!(!flag.get(), "identical record must not dirty subscribers");
    }

    #[test]
    fn set_dirties_only_changed_fields() {
        let store = RootStore::new();
        let key = StoreKey::from("A:1");
        store.set(key.clone(), record("v", 1));

        let changed_tag = DependencyTag::Field(key.clone(), StoreFieldKey::new("v".into()));
        let changed_flag = Rc::new(std::cell::Cell::new(false));
        store.tracker.subscribe(changed_tag, &changed_flag);

        store.set(key, record("v", 2));
        assert!(changed_flag.get());
    }

    #[test]
    fn get_registers_record_level_dependency() {
        let store = RootStore::new();
        let key = StoreKey::from("A:1");
        store.set(key.clone(), record("v", 1));
        let frame = store.tracker().push_frame();
        store.get(&key);
        let tags = frame.finish();
        assert!(tags.contains(&DependencyTag::Record(key)));
    }

    #[test]
    fn delete_dirties_the_id() {
        let store = RootStore::new();
        let key = StoreKey::from("A:1");
        store.set(key.clone(), record("v", 1));
        let tag = DependencyTag::Record(key.clone());
        let flag = Rc::new(std::cell::Cell::new(false));
        store.tracker.subscribe(tag, &flag);
        store.delete(&key);
        assert!(flag.get());
        assert!(store.get_raw(&key).is_none());
    }

    #[test]
    fn replace_is_minimal_delete_and_set_sequence() {
        let store = RootStore::new();
        store.set(StoreKey::from("A:1"), record("v", 1));
        store.set(StoreKey::from("A:2"), record("v", 2));

        let mut next = IndexMap::new();
        next.insert(StoreKey::from("A:2"), record("v", 2)); // unchanged
        next.insert(StoreKey::from("A:3"), record("v", 3)); // new

        let unchanged_tag = DependencyTag::Record(StoreKey::from("A:2"));
        let unchanged_flag = Rc::new(std::cell::Cell::new(false));
        store.tracker.subscribe(unchanged_tag, &unchanged_flag);

        store.replace(next);

        assert!(store.get_raw(&StoreKey::from("A:1")).is_none());
        assert!(store.get_raw(&StoreKey::from("A:3")).is_some());
        assert!(!unchanged_flag.get(), "A:2 was not mutated by replace and should stay clean");
    }
}

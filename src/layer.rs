//! The optimistic layer stack.

use crate::dependency::{DependencyTag, DependencyTracker};
use crate::id::StoreKey;
use crate::record::StoreRecord;
use crate::store::{RootStore, Store};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Either the terminal root store or another optimistic layer. Cheap to clone (an `Rc` bump);
/// this is what the writer/reader operate against when `optimistic: true` reads are requested.
#[derive(Clone)]
pub enum StoreHandle {
    Root(Rc<RootStore>),
    Layer(Rc<LayerNode>),
}

impl StoreHandle {
    fn get_raw(&self, key: &StoreKey) -> Option<Rc<StoreRecord>> {
        match self {
            StoreHandle::Root(root) => root.get_raw(key),
            StoreHandle::Layer(layer) => layer.get_raw(key),
        }
    }

    fn to_object(&self) -> IndexMap<StoreKey, StoreRecord> {
        match self {
            StoreHandle::Root(root) => root.to_object(),
            StoreHandle::Layer(layer) => layer.to_object(),
        }
    }
}

/// Replays the writes an optimistic mutation performs into a freshly (re)created layer. Invoked
/// once synchronously by `add_layer`, and again by `remove_layer` whenever a layer needs to be
/// rebuilt atop a new parent. A closure is the natural Rust shape here since no cross-process
/// replay is ever required.
pub type Replay = Rc<dyn Fn(&LayerNode)>;

pub struct LayerNode {
    pub id: String,
    parent: StoreHandle,
    delta: RefCell<IndexMap<StoreKey, Rc<StoreRecord>>>,
    /// Shared by every layer created from a given root: all layers created from a given root
    /// share a single layer-level dependency tracker.
    tracker: Rc<DependencyTracker>,
    replay: Replay,
}

impl LayerNode {
    fn new(id: String, parent: StoreHandle, tracker: Rc<DependencyTracker>, replay: Replay) -> Self {
        LayerNode {
            id,
            parent,
            delta: RefCell::new(IndexMap::new()),
            tracker,
            replay,
        }
    }

    fn get_raw(&self, key: &StoreKey) -> Option<Rc<StoreRecord>> {
        self.delta
            .borrow()
            .get(key)
            .cloned()
            .or_else(|| self.parent.get_raw(key))
    }

    fn to_object(&self) -> IndexMap<StoreKey, StoreRecord> {
        let mut base = self.parent.to_object();
        for (key, record) in self.delta.borrow().iter() {
            base.insert(key.clone(), record.as_ref().clone());
        }
        base
    }

    fn dirty_all_delta_entries(&self) {
        for (key, record) in self.delta.borrow().iter() {
            self.tracker.dirty(&DependencyTag::Record(key.clone()));
            for field_key in record.fields.keys() {
                self.tracker
                    .dirty(&DependencyTag::Field(key.clone(), field_key.clone()));
            }
        }
    }
}

impl Store for LayerNode {
    fn get_raw(&self, key: &StoreKey) -> Option<Rc<StoreRecord>> {
        LayerNode::get_raw(self, key)
    }

    fn set(&self, key: StoreKey, record: StoreRecord) {
        let mut delta = self.delta.borrow_mut();
        let (changed_fields, record_level_dirty): (Vec<_>, bool) = match delta.get(&key) {
            Some(existing) if existing.as_ref() == &record => return,
            Some(existing) => {
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
        delta.insert(key.clone(), Rc::new(record));
        drop(delta);
        for field_key in changed_fields {
            self.tracker.dirty(&DependencyTag::Field(key.clone(), field_key));
        }
        if record_level_dirty {
            self.tracker.dirty(&DependencyTag::Record(key));
        }
    }

    fn delete(&self, key: &StoreKey) {
        if self.delta.borrow_mut().shift_remove(key).is_some() {
            self.tracker.dirty(&DependencyTag::Record(key.clone()));
        }
    }

    fn tracker(&self) -> &Rc<DependencyTracker> {
        &self.tracker
    }

    fn to_object(&self) -> IndexMap<StoreKey, StoreRecord> {
        LayerNode::to_object(self)
    }
}

/// Manages the chain of optimistic layers atop a root store.
pub struct LayerStack {
    root: Rc<RootStore>,
    /// Shared by every layer; distinct from `root`'s own tracker.
    layer_tracker: Rc<DependencyTracker>,
    top: RefCell<StoreHandle>,
}

impl LayerStack {
    pub fn new(root: Rc<RootStore>) -> Self {
        let top = StoreHandle::Root(Rc::clone(&root));
        LayerStack {
            root,
            layer_tracker: DependencyTracker::new(),
            top: RefCell::new(top),
        }
    }

    pub fn layer_tracker(&self) -> &Rc<DependencyTracker> {
        &self.layer_tracker
    }

    /// The current optimistic top, or the root itself if no layers are active.
    pub fn current(&self) -> StoreHandle {
        self.top.borrow().clone()
    }

    pub fn has_layers(&self) -> bool {
        matches!(&*self.top.borrow(), StoreHandle::Layer(_))
    }

    /// Pushes a new layer with the given `id` on top of the current stack and synchronously
    /// replays the optimistic mutation into it.
    pub fn add_layer(&self, id: impl Into<String>, replay: Replay) {
        let parent = self.current();
        let layer = Rc::new(LayerNode::new(id.into(), parent, Rc::clone(&self.layer_tracker), Rc::clone(&replay)));
        (replay)(&layer);
        *self.top.borrow_mut() = StoreHandle::Layer(layer);
    }

    /// Removes every layer with the given `id` (there may be more than one), re-deriving any
    /// layer stacked above a removed one.
    pub fn remove_layer(&self, id: &str) {
        let new_top = Self::remove_from(self.current(), id).0;
        *self.top.borrow_mut() = new_top;
    }

    fn remove_from(handle: StoreHandle, id: &str) -> (StoreHandle, bool) {
        match handle {
            StoreHandle::Root(root) => (StoreHandle::Root(root), false),
            StoreHandle::Layer(layer) => {
                let (new_parent, parent_changed) = Self::remove_from(layer.parent.clone(), id);
                if layer.id == id {
                    layer.dirty_all_delta_entries();
                    (new_parent, true)
                } else if !parent_changed {
                    (StoreHandle::Layer(layer), false)
                } else {
                    let rebuilt = Rc::new(LayerNode::new(
                        layer.id.clone(),
                        new_parent,
                        Rc::clone(&layer.tracker),
                        Rc::clone(&layer.replay),
                    ));
                    (layer.replay)(&rebuilt);
                    (StoreHandle::Layer(rebuilt), true)
                }
            }
        }
    }

    /// Drops every optimistic layer, returning the stack to root-only state (used by `Cache::reset`
    /// and `Cache::restore`: a freshly cleared/replaced root invalidates any delta built on the old
    /// base, so the layers above it cannot be meaningfully kept).
    pub fn reset_to_root(&self) {
        *self.top.borrow_mut() = StoreHandle::Root(Rc::clone(&self.root));
    }

    pub fn extract(&self, optimistic: bool) -> IndexMap<StoreKey, StoreRecord> {
        if optimistic {
            self.current().to_object()
        } else {
            self.root.to_object()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StoreFieldKey;
    use crate::value::StoreValue;

    fn write_field(store: &dyn Store, key: &str, field: &str, value: i64) {
        let mut record = store
            .get_raw(&StoreKey::from(key))
            .map(|r| r.as_ref().clone())
            .unwrap_or_else(|| StoreRecord::new(Some("X".into())));
        record.set(StoreFieldKey::new(field.into()), StoreValue::Scalar(value.into()));
        store.set(StoreKey::from(key), record);
    }

    fn v(record: &StoreRecord, field: &str) -> i64 {
        match record.get(&StoreFieldKey::new(field.into())) {
            Some(StoreValue::Scalar(v)) => v.as_i64().unwrap(),
            other => panic!("expected scalar, got {other:?}"),
        }
    }

    #[test]
    fn s3_optimistic_stack_add_and_remove_bottom_layer() {
        let root = Rc::new(RootStore::new());
        write_field(&*root, "X", "v", 1);
        let stack = LayerStack::new(Rc::clone(&root));

        stack.add_layer("opt1", Rc::new(|layer: &LayerNode| write_field(layer, "X", "v", 2)));
        stack.add_layer("opt2", Rc::new(|layer: &LayerNode| write_field(layer, "X", "v", 3)));

        stack.remove_layer("opt1");
        let optimistic = stack.extract(true);
        assert_eq!(v(&optimistic[&StoreKey::from("X")], "v"), 3);
        let real = stack.extract(false);
        assert_eq!(v(&real[&StoreKey::from("X")], "v"), 1);

        stack.remove_layer("opt2");
        let optimistic_after = stack.extract(true);
        assert_eq!(v(&optimistic_after[&StoreKey::from("X")], "v"), 1);
        assert!(!stack.has_layers());
    }

    #[test]
    fn s6_reparenting_reruns_replay_for_layers_above_a_removed_one() {
        let root = Rc::new(RootStore::new());
        let stack = LayerStack::new(Rc::clone(&root));

        stack.add_layer("a", Rc::new(|layer: &LayerNode| write_field(layer, "X", "v", 1)));
        stack.add_layer("b", Rc::new(|layer: &LayerNode| write_field(layer, "Y", "v", 1)));
        stack.add_layer("a", Rc::new(|layer: &LayerNode| write_field(layer, "X", "v", 99)));

        stack.remove_layer("a");

        let optimistic = stack.extract(true);
        assert!(!optimistic.contains_key(&StoreKey::from("X")));
        assert_eq!(v(&optimistic[&StoreKey::from("Y")], "v"), 1);
    }

    #[test]
    fn invariant_6_add_then_remove_restores_exact_state() {
        let root = Rc::new(RootStore::new());
        write_field(&*root, "X", "v", 1);
        let stack = LayerStack::new(Rc::clone(&root));
        let before = stack.extract(true);

        stack.add_layer("i", Rc::new(|layer: &LayerNode| write_field(layer, "X", "v", 2)));
        stack.remove_layer("i");

        let after = stack.extract(true);
        assert_eq!(before, after);
    }

    #[test]
    fn commutativity_under_removal_in_either_order() {
        let root = Rc::new(RootStore::new());
        let stack = LayerStack::new(Rc::clone(&root));
        stack.add_layer("a", Rc::new(|layer: &LayerNode| write_field(layer, "X", "v", 1)));
        stack.add_layer("b", Rc::new(|layer: &LayerNode| write_field(layer, "Y", "v", 2)));
        stack.remove_layer("b");
        stack.remove_layer("a");
        assert!(!stack.has_layers());
        assert_eq!(stack.extract(true), stack.extract(false));
    }
}

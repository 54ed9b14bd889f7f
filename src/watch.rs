//! The watch / broadcast engine.

use crate::ast::Document;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::event::{Event, EventKind, EventListener};
use crate::id::StoreKey;
use crate::reader::{DiffResult, Reader, ReadMemo, ResultValue};
use crate::store::Store;
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::panic::AssertUnwindSafe;
use std::rc::Rc;

pub type WatchId = u64;

pub struct Watch {
    pub id: WatchId,
    pub document: Rc<Document>,
    pub variables: serde_json::Value,
    pub optimistic: bool,
    pub root_id: StoreKey,
    previous: RefCell<Option<ResultValue>>,
    callback: RefCell<Box<dyn FnMut(DiffResult)>>,
}

impl Watch {
    pub fn new(
        id: WatchId,
        document: Rc<Document>,
        variables: serde_json::Value,
        optimistic: bool,
        root_id: StoreKey,
        callback: Box<dyn FnMut(DiffResult)>,
    ) -> Self {
        Watch {
            id,
            document,
            variables,
            optimistic,
            root_id,
            previous: RefCell::new(None),
            callback: RefCell::new(callback),
        }
    }
}

/// Owns the live watch set and the `performTransaction` broadcast-suppression depth counter.
#[derive(Default)]
pub struct WatchRegistry {
    watches: RefCell<IndexMap<WatchId, Rc<Watch>>>,
    next_id: Cell<WatchId>,
    depth: Cell<u32>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        WatchRegistry::default()
    }

    pub fn register(&self, build: impl FnOnce(WatchId) -> Watch) -> WatchId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let watch = Rc::new(build(id));
        self.watches.borrow_mut().insert(id, watch);
        id
    }

    pub fn remove(&self, id: WatchId) {
        self.watches.borrow_mut().shift_remove(&id);
    }

    pub fn get(&self, id: WatchId) -> Option<Rc<Watch>> {
        self.watches.borrow().get(&id).cloned()
    }

    /// A point-in-time copy of the watch set, so that a watch registered mid-broadcast does not
    /// receive that broadcast.
    pub fn snapshot(&self) -> Vec<Rc<Watch>> {
        self.watches.borrow().values().cloned().collect()
    }

    pub fn enter_transaction(&self) {
        self.depth.set(self.depth.get() + 1);
    }

    /// Returns `true` when this call closed the outermost transaction. Nested transactions do
    /// not re-enable broadcasting until the outermost completes.
    pub fn exit_transaction(&self) -> bool {
        let depth = self.depth.get().saturating_sub(1);
        self.depth.set(depth);
        depth == 0
    }

    pub fn is_suppressed(&self) -> bool {
        self.depth.get() > 0
    }
}

/// Diffs `watch` against `store` and invokes its callback iff the result actually changed.
///
/// Referential-equality recovery is delegated entirely to `memo` (when caching is enabled): a
/// read whose dependencies stayed clean returns the exact same `Rc` it returned last time, so
/// comparing the new diff's result to the watch's previously delivered result via
/// [`ResultValue`]'s `Rc::ptr_eq`-based `PartialEq` is both the change-detection test and, for
/// unaffected watches, effectively free (the underlying per-record reads are cache hits). This
/// also means layer removal's dependency dirtying (`crate::layer::LayerStack::remove_layer`)
/// already forces a fresh broadcast for affected optimistic watches on its own, so there's no
/// need for a separate per-watch dirty hint after an optimistic broadcast.
pub fn maybe_broadcast(
    watch: &Watch,
    store: &dyn Store,
    config: &CacheConfig,
    memo: Option<&ReadMemo>,
    listener: Option<&dyn EventListener>,
) -> Result<()> {
    let reader = Reader::new(store, config, memo).with_listener(listener);
    let diff = reader.diff(&watch.document, &watch.variables, &watch.root_id, None, true)?;

    let changed = match (&*watch.previous.borrow(), &diff.result) {
        (None, _) => true,
        (Some(_), None) => true,
        (Some(previous), Some(next)) => previous != next,
    };
    if !changed {
        return Ok(());
    }
    *watch.previous.borrow_mut() = diff.result.clone();

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
        (watch.callback.borrow_mut())(diff);
    }));
    if let Err(payload) = outcome {
        let description = panic_message(&payload);
        crate::event::report(listener, Event::new(EventKind::WatchCallbackPanicked { description }));
    }
    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::root_query_key;
    use crate::store::RootStore;
    use crate::writer::Writer;
    use graphql_parser::parse_query;
    use std::cell::RefCell as StdRefCell;

    fn doc(text: &str) -> Document {
        parse_query::<String>(text).unwrap().into_static()
    }

    #[test]
    fn s4_only_the_watch_depending_on_the_changed_field_fires() {
        let store = RootStore::new();
        let config = CacheConfig::default();
        let writer = Writer::new(&store, &config, None);
        writer
            .write(&doc("{ a b }"), &serde_json::json!({}), &root_query_key(), &serde_json::json!({"a": 1, "b": 1}))
            .unwrap();

        let memo = ReadMemo::new(Rc::clone(store.tracker()));
        let fired_a = Rc::new(StdRefCell::new(0));
        let fired_b = Rc::new(StdRefCell::new(0));

        let watch_a = Watch::new(0, Rc::new(doc("{ a }")), serde_json::json!({}), false, root_query_key(), {
            let fired_a = Rc::clone(&fired_a);
            Box::new(move |_diff| *fired_a.borrow_mut() += 1)
        });
        let watch_b = Watch::new(1, Rc::new(doc("{ b }")), serde_json::json!({}), false, root_query_key(), {
            let fired_b = Rc::clone(&fired_b);
            Box::new(move |_diff| *fired_b.borrow_mut() += 1)
        });

        maybe_broadcast(&watch_a, &store, &config, Some(&memo), None).unwrap();
        maybe_broadcast(&watch_b, &store, &config, Some(&memo), None).unwrap();
        assert_eq!(*fired_a.borrow(), 1);
        assert_eq!(*fired_b.borrow(), 1);

        writer
            .write(&doc("{ b }"), &serde_json::json!({}), &root_query_key(), &serde_json::json!({"b": 2}))
            .unwrap();

        maybe_broadcast(&watch_a, &store, &config, Some(&memo), None).unwrap();
        maybe_broadcast(&watch_b, &store, &config, Some(&memo), None).unwrap();
        assert_eq!(*fired_a.borrow(), 1, "unrelated watch must not re-fire");
        assert_eq!(*fired_b.borrow(), 2);
    }

    #[test]
    fn panicking_callback_is_isolated() {
        let store = RootStore::new();
        let config = CacheConfig::default();
        let writer = Writer::new(&store, &config, None);
        writer.write(&doc("{ a }"), &serde_json::json!({}), &root_query_key(), &serde_json::json!({"a": 1})).unwrap();

        let watch = Watch::new(0, Rc::new(doc("{ a }")), serde_json::json!({}), false, root_query_key(), Box::new(|_| panic!("boom")));
        let result = maybe_broadcast(&watch, &store, &config, None, None);
        assert!(result.is_ok(), "a callback panic must not propagate as an Err");
    }

    #[test]
    fn transaction_depth_tracks_outermost_boundary() {
        let registry = WatchRegistry::new();
        registry.enter_transaction();
        registry.enter_transaction();
        assert!(!registry.exit_transaction());
        assert!(registry.is_suppressed());
        assert!(registry.exit_transaction());
        assert!(!registry.is_suppressed());
    }
}

//! The public cache surface: a single `Cache` type wiring the store, the optimistic layer stack,
//! the reader/writer, and the watch registry together behind one `!Send + !Sync` handle.

use crate::ast::{self, Document, FragmentDefinition};
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::event::EventListener;
use crate::extract;
use crate::fragment;
use crate::id::StoreKey;
use crate::layer::{LayerNode, LayerStack, Replay, StoreHandle};
use crate::reader::{DiffResult, ReadMemo, Reader, ResultValue};
use crate::store::{RootStore, Store};
use crate::watch::{maybe_broadcast, Watch, WatchId, WatchRegistry};
use crate::writer::Writer;
use std::rc::Rc;

struct Inner {
    root: Rc<RootStore>,
    layers: LayerStack,
    config: CacheConfig,
    listener: Option<Rc<dyn EventListener>>,
    watches: WatchRegistry,
    root_memo: ReadMemo,
    layer_memo: ReadMemo,
}

/// A normalized, reactive, in-memory GraphQL result cache.
///
/// Cheap to clone (an `Rc` bump) — every clone shares the same underlying store, layer stack,
/// and watch registry.
#[derive(Clone)]
pub struct Cache(Rc<Inner>);

impl Default for Cache {
    fn default() -> Self {
        Cache::new()
    }
}

impl Cache {
    pub fn new() -> Self {
        Cache::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Cache::build(config, None)
    }

    pub fn with_config_and_listener(config: CacheConfig, listener: Rc<dyn EventListener>) -> Self {
        Cache::build(config, Some(listener))
    }

    fn build(config: CacheConfig, listener: Option<Rc<dyn EventListener>>) -> Self {
        let root = Rc::new(RootStore::new());
        let layers = LayerStack::new(Rc::clone(&root));
        let root_memo = ReadMemo::new(Rc::clone(root.tracker()));
        let layer_memo = ReadMemo::new(Rc::clone(layers.layer_tracker()));
        Cache(Rc::new(Inner {
            root,
            layers,
            config,
            listener,
            watches: WatchRegistry::new(),
            root_memo,
            layer_memo,
        }))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.0.config
    }

    /// Dispatches `f` against whichever store `optimistic` selects, paired with the `ReadMemo`
    /// tied to that store's tracker (root reads and layer reads are memoized independently —
    /// see `reader::ReadMemo`'s doc comment).
    fn with_store<R>(&self, optimistic: bool, f: impl FnOnce(&dyn Store, &ReadMemo) -> R) -> R {
        let handle = if optimistic { self.0.layers.current() } else { StoreHandle::Root(Rc::clone(&self.0.root)) };
        match handle {
            StoreHandle::Root(root) => f(root.as_ref(), &self.0.root_memo),
            StoreHandle::Layer(layer) => f(layer.as_ref(), &self.0.layer_memo),
        }
    }

    /// Runs `f` against `document`, first rewriting it to request `__typename` everywhere when
    /// `CacheConfig::with_add_typename` is set.
    fn with_transformed<R>(&self, document: &Document, f: impl FnOnce(&Document) -> R) -> R {
        if self.0.config.add_typename {
            f(&ast::inject_typename(document))
        } else {
            f(document)
        }
    }

    /// Reads a query's current value, or `None` if its root entity isn't in the store at all.
    pub fn read(
        &self,
        document: &Document,
        variables: &serde_json::Value,
        root_id: &StoreKey,
        optimistic: bool,
        return_partial_data: bool,
    ) -> Result<Option<ResultValue>> {
        Ok(self.diff(document, variables, root_id, optimistic, return_partial_data)?.result)
    }

    /// Reads a query's current value together with its completeness and missing-field report.
    pub fn diff(
        &self,
        document: &Document,
        variables: &serde_json::Value,
        root_id: &StoreKey,
        optimistic: bool,
        return_partial_data: bool,
    ) -> Result<DiffResult> {
        self.with_transformed(document, |document| {
            self.with_store(optimistic, |store, memo| {
                Reader::new(store, &self.0.config, Some(memo))
                    .with_listener(self.0.listener.as_deref())
                    .diff(document, variables, root_id, None, return_partial_data)
            })
        })
    }

    /// Normalizes `result` and merges it into the root store. Optimistic writes go through
    /// [`Cache::record_optimistic_transaction`] instead — a plain `write` never targets a layer,
    /// since layers hold only mutation-scoped deltas.
    pub fn write(&self, document: &Document, variables: &serde_json::Value, root_id: &StoreKey, result: &serde_json::Value) -> Result<()> {
        self.with_transformed(document, |document| {
            Writer::new(self.0.root.as_ref(), &self.0.config, self.0.listener.as_deref()).write(document, variables, root_id, result)
        })?;
        self.broadcast_all();
        Ok(())
    }

    /// Reads a standalone fragment rooted at `id`.
    pub fn read_fragment(
        &self,
        fragment_defs: Vec<FragmentDefinition>,
        fragment_name: Option<&str>,
        variables: &serde_json::Value,
        id: &StoreKey,
        optimistic: bool,
        return_partial_data: bool,
    ) -> Result<Option<ResultValue>> {
        let document = fragment::build_document(fragment_defs, fragment_name)?;
        self.read(&document, variables, id, optimistic, return_partial_data)
    }

    /// Writes a standalone fragment's result into the record at `id`.
    pub fn write_fragment(
        &self,
        fragment_defs: Vec<FragmentDefinition>,
        fragment_name: Option<&str>,
        variables: &serde_json::Value,
        id: &StoreKey,
        result: &serde_json::Value,
    ) -> Result<()> {
        let document = fragment::build_document(fragment_defs, fragment_name)?;
        self.write(&document, variables, id, result)
    }

    /// Registers a watch that re-diffs on every broadcast and invokes `callback` when its result
    /// actually changes. The first diff always fires, delivering the watch's
    /// initial value. Drop the returned [`WatchHandle`] (or call [`WatchHandle::dispose`]) to stop
    /// watching.
    pub fn watch(
        &self,
        document: Rc<Document>,
        variables: serde_json::Value,
        root_id: StoreKey,
        optimistic: bool,
        callback: Box<dyn FnMut(DiffResult)>,
    ) -> WatchHandle {
        let id = self.0.watches.register(|id| Watch::new(id, document, variables, optimistic, root_id, callback));
        if let Some(watch) = self.0.watches.get(id) {
            self.broadcast_one(&watch);
        }
        WatchHandle { inner: Rc::clone(&self.0), id }
    }

    fn broadcast_one(&self, watch: &Watch) {
        let outcome = self.with_store(watch.optimistic, |store, memo| {
            maybe_broadcast(watch, store, &self.0.config, Some(memo), self.0.listener.as_deref())
        });
        if let Err(err) = outcome {
            tracing::error!(target: "normalized_cache", "watch {} failed during broadcast: {err}", watch.id);
        }
    }

    /// Re-diffs every registered watch and delivers callbacks for the ones whose result changed
    /// Invoked after every write, after every optimistic add/remove, and after reset. A no-op
    /// while a [`Cache::perform_transaction`] is still open.
    fn broadcast_all(&self) {
        if self.0.watches.is_suppressed() {
            return;
        }
        for watch in self.0.watches.snapshot() {
            self.broadcast_one(&watch);
        }
    }

    /// Batches any number of writes/optimistic operations performed by `update` into a single
    /// broadcast pass, run once `update` returns. Nested calls coalesce into the outermost
    /// transaction's broadcast.
    pub fn perform_transaction(&self, update: impl FnOnce(&Cache)) {
        self.0.watches.enter_transaction();
        update(self);
        if self.0.watches.exit_transaction() {
            self.broadcast_all();
        }
    }

    /// Pushes a new optimistic layer identified by `id` and synchronously replays `update` into
    /// it. `update` is retained and may be
    /// re-invoked later, against a freshly (re)created layer, whenever [`Cache::remove_optimistic`]
    /// removes a layer stacked below this one and `id`'s layer must be re-derived atop the new
    /// parent — so it must be safe to run more than once.
    ///
    /// A write performed by `update` that returns an `Err` is logged and otherwise ignored rather
    /// than propagated: `Replay`'s signature (`Fn(&LayerNode)`, no `Result`) can't carry a
    /// `Result` back out of a re-parenting replay, so both the first invocation and any later
    /// replay share this same fallback.
    pub fn record_optimistic_transaction(&self, update: impl Fn(&OptimisticWrite) -> Result<()> + 'static, id: impl Into<String>) {
        let config = self.0.config.clone();
        let listener = self.0.listener.clone();
        let replay: Replay = Rc::new(move |layer: &LayerNode| {
            let write = OptimisticWrite { store: layer, config: &config, listener: listener.as_deref() };
            if let Err(err) = update(&write) {
                tracing::error!(
                    target: "normalized_cache",
                    "optimistic transaction `{}` failed during replay: {err}",
                    layer.id,
                );
            }
        });
        self.0.layers.add_layer(id, replay);
        self.broadcast_all();
    }

    /// Removes every optimistic layer registered under `id`, re-deriving any layer stacked above
    /// it.
    pub fn remove_optimistic(&self, id: &str) {
        self.0.layers.remove_layer(id);
        self.broadcast_all();
    }

    /// Clears the root store and drops every optimistic layer, then broadcasts.
    pub fn reset(&self) {
        self.0.root.clear();
        self.0.layers.reset_to_root();
        self.broadcast_all();
    }

    /// Flattens the cache into a JSON-serializable snapshot.
    pub fn extract(&self, optimistic: bool) -> serde_json::Value {
        extract::extract(&self.0.layers.extract(optimistic))
    }

    /// Replaces the root store's contents with a previously `extract`ed snapshot, dropping every
    /// optimistic layer. Broadcasts afterward, same as `reset`.
    pub fn restore(&self, wire: &serde_json::Value) -> Result<()> {
        let mapping = extract::restore(wire)?;
        self.0.root.replace(mapping);
        self.0.layers.reset_to_root();
        self.broadcast_all();
        Ok(())
    }

    /// Always fails: eviction is reserved but unsupported.
    pub fn evict(&self) -> Result<()> {
        Err(Error::eviction_unsupported())
    }
}

/// The write surface handed to a [`Cache::record_optimistic_transaction`] closure: a `Writer`
/// scoped to that optimistic layer, so user code can only ever write into its own layer's delta,
/// never the root or a sibling layer.
pub struct OptimisticWrite<'a> {
    store: &'a dyn Store,
    config: &'a CacheConfig,
    listener: Option<&'a dyn EventListener>,
}

impl OptimisticWrite<'_> {
    pub fn write(&self, document: &Document, variables: &serde_json::Value, root_id: &StoreKey, result: &serde_json::Value) -> Result<()> {
        Writer::new(self.store, self.config, self.listener).write(document, variables, root_id, result)
    }
}

/// Returned by [`Cache::watch`]; drop or call [`WatchHandle::dispose`] to stop watching.
pub struct WatchHandle {
    inner: Rc<Inner>,
    id: WatchId,
}

impl WatchHandle {
    pub fn dispose(self) {
        self.inner.watches.remove(self.id);
    }

    pub fn id(&self) -> WatchId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphql_parser::parse_query;
    use std::cell::RefCell;

    fn doc(text: &str) -> Document {
        parse_query::<String>(text).unwrap().into_static()
    }

    fn root_id() -> StoreKey {
        crate::id::root_query_key()
    }

    #[test]
    fn write_then_read_round_trips() {
        let cache = Cache::new();
        let document = doc("{ author { id __typename name } }");
        let result = serde_json::json!({"author": {"id": "1", "__typename": "A", "name": "X"}});
        cache.write(&document, &serde_json::json!({}), &root_id(), &result).unwrap();

        let read = cache.read(&document, &serde_json::json!({}), &root_id(), false, false).unwrap();
        assert_eq!(read.unwrap().to_json(), result);
    }

    #[test]
    fn s3_optimistic_write_is_visible_only_when_requested() {
        let cache = Cache::new();
        let document = doc("{ a }");
        cache.write(&document, &serde_json::json!({}), &root_id(), &serde_json::json!({"a": 1})).unwrap();

        cache.record_optimistic_transaction(
            |write| write.write(&doc("{ a }"), &serde_json::json!({}), &crate::id::root_query_key(), &serde_json::json!({"a": 2})),
            "opt1",
        );

        let optimistic = cache.read(&document, &serde_json::json!({}), &root_id(), true, false).unwrap();
        assert_eq!(optimistic.unwrap().to_json(), serde_json::json!({"a": 2}));

        let real = cache.read(&document, &serde_json::json!({}), &root_id(), false, false).unwrap();
        assert_eq!(real.unwrap().to_json(), serde_json::json!({"a": 1}));

        cache.remove_optimistic("opt1");
        let after_removal = cache.read(&document, &serde_json::json!({}), &root_id(), true, false).unwrap();
        assert_eq!(after_removal.unwrap().to_json(), serde_json::json!({"a": 1}));
    }

    #[test]
    fn watch_fires_on_initial_registration_and_on_relevant_writes() {
        let cache = Cache::new();
        let document = doc("{ a }");
        cache.write(&document, &serde_json::json!({}), &root_id(), &serde_json::json!({"a": 1})).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let handle = cache.watch(
            Rc::new(document.clone()),
            serde_json::json!({}),
            root_id(),
            false,
            Box::new(move |diff| seen_clone.borrow_mut().push(diff.result.map(|r| r.to_json()))),
        );
        assert_eq!(seen.borrow().len(), 1);

        cache.write(&document, &serde_json::json!({}), &root_id(), &serde_json::json!({"a": 2})).unwrap();
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(seen.borrow()[1], Some(serde_json::json!({"a": 2})));

        handle.dispose();
        cache.write(&document, &serde_json::json!({}), &root_id(), &serde_json::json!({"a": 3})).unwrap();
        assert_eq!(seen.borrow().len(), 2, "disposed watch must not fire again");
    }

    #[test]
    fn perform_transaction_coalesces_broadcasts() {
        let cache = Cache::new();
        let document = doc("{ a b }");
        cache
            .write(&document, &serde_json::json!({}), &root_id(), &serde_json::json!({"a": 1, "b": 1}))
            .unwrap();

        let fired = Rc::new(RefCell::new(0));
        let fired_clone = Rc::clone(&fired);
        let handle = cache.watch(
            Rc::new(document.clone()),
            serde_json::json!({}),
            root_id(),
            false,
            Box::new(move |_diff| *fired_clone.borrow_mut() += 1),
        );
        assert_eq!(*fired.borrow(), 1);

        cache.perform_transaction(|cache| {
            cache.write(&doc("{ a }"), &serde_json::json!({}), &root_id(), &serde_json::json!({"a": 2})).unwrap();
            cache.write(&doc("{ b }"), &serde_json::json!({}), &root_id(), &serde_json::json!({"b": 2})).unwrap();
        });
        assert_eq!(*fired.borrow(), 2, "two writes inside one transaction must coalesce into one broadcast");

        handle.dispose();
    }

    #[test]
    fn invariant_2_extract_and_restore_round_trip_through_a_fresh_cache() {
        let cache = Cache::new();
        let document = doc("{ author { id __typename name } }");
        let result = serde_json::json!({"author": {"id": "1", "__typename": "A", "name": "X"}});
        cache.write(&document, &serde_json::json!({}), &root_id(), &result).unwrap();

        let wire = cache.extract(false);

        let restored_cache = Cache::new();
        restored_cache.restore(&wire).unwrap();
        let read = restored_cache.read(&document, &serde_json::json!({}), &root_id(), false, false).unwrap();
        assert_eq!(read.unwrap().to_json(), result);
    }

    #[test]
    fn reset_clears_data_and_optimistic_layers() {
        let cache = Cache::new();
        let document = doc("{ a }");
        cache.write(&document, &serde_json::json!({}), &root_id(), &serde_json::json!({"a": 1})).unwrap();
        cache.record_optimistic_transaction(
            |write| write.write(&doc("{ a }"), &serde_json::json!({}), &crate::id::root_query_key(), &serde_json::json!({"a": 2})),
            "opt",
        );

        cache.reset();

        let optimistic = cache.read(&document, &serde_json::json!({}), &root_id(), true, true).unwrap();
        assert!(optimistic.is_none());
    }

    #[test]
    fn evict_always_fails() {
        let cache = Cache::new();
        assert!(cache.evict().is_err());
    }
}

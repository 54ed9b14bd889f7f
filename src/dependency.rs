//! Dependency recording and push-based invalidation.
//!
//! The active-frame stack is a re-entrant, single-threaded stack of "what is currently being
//! computed", used so that a nested computation's dependency reads are attributed to whichever
//! computation is innermost, and then folded into its caller when it finishes. This tracker is
//! *push*-based rather than validated lazily against revision stamps: `dirty` walks a reverse
//! index and flips a flag on every subscriber immediately.

use crate::id::StoreKey;
use crate::record::StoreFieldKey;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Identifies "field X of record Y" or just "record Y" for invalidation purposes.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum DependencyTag {
    Record(StoreKey),
    Field(StoreKey, StoreFieldKey),
    /// A reserved tag with no corresponding store entity, used for sentinel dependencies such as
    /// "the optimistic layer stack changed shape" (`watch.rs`).
    Sentinel(&'static str),
}

type DirtyFlag = Rc<Cell<bool>>;

/// Owns the active-frame stack and the reverse (tag -> subscriber) index for one store's
/// dependency universe. The root store and the optimistic layer stack each have their own
/// tracker instance.
#[derive(Default)]
pub struct DependencyTracker {
    frames: RefCell<Vec<std::collections::HashSet<DependencyTag>>>,
    subscribers: RefCell<HashMap<DependencyTag, Vec<Weak<Cell<bool>>>>>,
}

impl DependencyTracker {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Starts recording a new, innermost computation frame. When a memoized function runs inside
    /// another, its dependency set is unioned into the caller's automatically when the returned
    /// guard is finished or dropped.
    pub fn push_frame(&self) -> FrameGuard<'_> {
        self.frames.borrow_mut().push(Default::default());
        FrameGuard {
            tracker: self,
            finished: false,
        }
    }

    /// Records that the computation currently on top of the frame stack consulted `tag`. A
    /// no-op if no frame is active (e.g. reads performed outside of any memoized computation).
    pub fn record(&self, tag: DependencyTag) {
        if let Some(top) = self.frames.borrow_mut().last_mut() {
            top.insert(tag);
        }
    }

    /// Registers `flag` to be set when `tag` is next dirtied. Subscriptions are one-shot: once a
    /// tag is dirtied its subscriber list is cleared, since a recomputed entry re-subscribes to
    /// whatever tags it touches the next time it runs.
    pub fn subscribe(&self, tag: DependencyTag, flag: &DirtyFlag) {
        self.subscribers
            .borrow_mut()
            .entry(tag)
            .or_default()
            .push(Rc::downgrade(flag));
    }

    /// Marks every current subscriber of `tag` dirty. Called by [`crate::store::Store::set`]/
    /// `delete`/`clear`/`replace`, and directly by [`crate::layer::LayerStack::remove_layer`] for
    /// the records an optimistic layer had overridden.
    pub fn dirty(&self, tag: &DependencyTag) {
        if let Some(subscribers) = self.subscribers.borrow_mut().remove(tag) {
            for weak in subscribers {
                if let Some(flag) = weak.upgrade() {
                    flag.set(true);
                }
            }
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self, tag: &DependencyTag) -> usize {
        self.subscribers
            .borrow()
            .get(tag)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

/// RAII handle for a frame pushed by [`DependencyTracker::push_frame`].
pub struct FrameGuard<'a> {
    tracker: &'a DependencyTracker,
    finished: bool,
}

impl FrameGuard<'_> {
    /// Pops this frame, unions its tags into the new top frame (if any), and returns the set of
    /// tags this computation touched.
    pub fn finish(mut self) -> std::collections::HashSet<DependencyTag> {
        self.finished = true;
        self.pop()
    }

    fn pop(&self) -> std::collections::HashSet<DependencyTag> {
        let mut frames = self.tracker.frames.borrow_mut();
        let popped = frames.pop().expect("frame stack underflow");
        if let Some(parent) = frames.last_mut() {
            parent.extend(popped.iter().cloned());
        }
        popped
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.pop();
        }
    }
}

/// A named dependency with no cached value — owns subscriptions to one or more tags so that
/// unrelated computations can cheaply depend on "has this sentinel fired" without recomputing
/// anything themselves.
pub struct Disposable {
    tag: DependencyTag,
    dirty: DirtyFlag,
}

impl Disposable {
    pub fn new(tag: DependencyTag) -> Self {
        Disposable {
            tag,
            dirty: Rc::new(Cell::new(false)),
        }
    }

    /// Subscribes the currently active frame's owner to this sentinel by recording its tag, and
    /// also arms `tracker` so a future [`Self::invalidate`] call will flip our own flag.
    pub fn touch(&self, tracker: &DependencyTracker) {
        tracker.record(self.tag.clone());
        tracker.subscribe(self.tag.clone(), &self.dirty);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn reset(&self) {
        self.dirty.set(false);
    }

    pub fn invalidate(&self, tracker: &DependencyTracker) {
        tracker.dirty(&self.tag);
    }
}

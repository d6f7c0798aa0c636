//! Cell Implementation
//!
//! A Cell is the unit of dependency tracking: one observable memory location
//! with a version counter and a set of subscribing reactions.
//!
//! # How Cells Work
//!
//! 1. Reading a cell inside a running reaction attaches that reaction as a
//!    subscriber (and records the cell among the reaction's dependencies).
//!
//! 2. Writing a cell bumps its version. The write is committed before any
//!    subscriber hears about it.
//!
//! 3. Notification enqueues every live, non-destroyed subscriber on the
//!    scheduler. Nothing runs synchronously inside a write.
//!
//! Every committed write bumps the version, even when the new value equals
//! the old one. Stores built on top of cells never compare-and-skip.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use crate::reactive::{scheduler, ReactionId, ReactionInner, ReactiveContext};

/// Unique identifier for a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

impl CellId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// The type-erased part of a cell that reactions hold on to.
pub(crate) struct CellCore {
    id: CellId,
    version: AtomicU64,
    subscribers: Mutex<IndexMap<ReactionId, Weak<ReactionInner>>>,
}

impl CellCore {
    fn new() -> Self {
        Self {
            id: CellId::next(),
            version: AtomicU64::new(0),
            subscribers: Mutex::new(IndexMap::new()),
        }
    }

    pub(crate) fn id(&self) -> CellId {
        self.id
    }

    /// Attach the running reaction, if there is one.
    pub(crate) fn track(self: &Arc<Self>) {
        if let Some(reaction) = ReactiveContext::current() {
            reaction.attach(self);
        }
    }

    pub(crate) fn subscribe(&self, id: ReactionId, reaction: Weak<ReactionInner>) {
        self.subscribers.lock().insert(id, reaction);
    }

    pub(crate) fn unsubscribe(&self, id: ReactionId) {
        self.subscribers.lock().shift_remove(&id);
    }

    fn bump(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Enqueue every live subscriber on the scheduler.
    pub(crate) fn notify(&self) {
        let due: Vec<Arc<ReactionInner>> = {
            let mut subscribers = self.subscribers.lock();
            subscribers.retain(|_, weak| weak.strong_count() > 0);
            subscribers.values().filter_map(Weak::upgrade).collect()
        };

        for reaction in due {
            if !reaction.is_inert() {
                scheduler::schedule_inner(reaction);
            }
        }
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

/// A single observable memory location holding a `T`.
///
/// Cloning a cell yields another handle to the same location.
pub struct Cell<T> {
    core: Arc<CellCore>,
    value: Arc<RwLock<T>>,
}

impl<T: Clone> Cell<T> {
    /// Create a new cell holding `value`, at version 0.
    pub fn new(value: T) -> Self {
        Self {
            core: Arc::new(CellCore::new()),
            value: Arc::new(RwLock::new(value)),
        }
    }

    /// The cell's unique id.
    pub fn id(&self) -> CellId {
        self.core.id
    }

    /// How many committed writes this cell has seen.
    pub fn version(&self) -> u64 {
        self.core.version.load(Ordering::SeqCst)
    }

    /// Read the value, subscribing the running reaction.
    pub fn get(&self) -> T {
        self.core.track();
        self.value.read().clone()
    }

    /// Borrow the value, subscribing the running reaction.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.core.track();
        f(&self.value.read())
    }

    /// Read the value without subscribing anybody.
    pub fn peek(&self) -> T {
        self.value.read().clone()
    }

    /// Subscribe the running reaction without reading.
    pub fn track(&self) {
        self.core.track();
    }

    /// Commit a new value and notify subscribers.
    pub fn set(&self, value: T) {
        self.write(value);
        self.notify();
    }

    /// Commit a change computed from the current value.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.value.write());
        self.core.bump();
        self.notify();
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.core.subscriber_count()
    }

    /// Commit without notifying. Stores use this to apply every cell of a
    /// patch before anyone is told about it.
    pub(crate) fn write(&self, value: T) {
        *self.value.write() = value;
        let version = self.core.bump();
        tracing::trace!(cell = self.core.id.0, version, "cell write");
    }

    pub(crate) fn notify(&self) {
        self.core.notify();
    }
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            value: Arc::clone(&self.value),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.core.id.0)
            .field("version", &self.core.version.load(Ordering::SeqCst))
            .field("value", &*self.value.read())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

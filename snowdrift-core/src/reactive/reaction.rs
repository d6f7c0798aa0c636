//! Reaction Implementation
//!
//! A Reaction is a re-runnable tracked computation.
//!
//! # How Reactions Work
//!
//! 1. Each run first detaches the reaction from every cell it read last time
//!    (stale-dependency pruning), then runs the computation inside a fresh
//!    [`ReactiveContext`] frame. Every cell read during the run attaches the
//!    reaction again, so dependencies can change from one run to the next.
//!
//! 2. When a dependency is written, the reaction is enqueued on the
//!    scheduler and re-runs when the batch flushes.
//!
//! 3. Destroying a reaction detaches it and marks it inert. Notifications
//!    that race with disposal are ignored, and a reaction destroyed in the
//!    middle of its own run stops attaching to anything it still reads.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::scheduler;
use crate::error::Result;
use crate::store::CellCore;

type Computation = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// Unique identifier for a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReactionId(u64);

impl ReactionId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ReactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) struct ReactionInner {
    id: ReactionId,
    label: Option<String>,
    computation: Computation,
    dependencies: Mutex<SmallVec<[Arc<CellCore>; 4]>>,
    inert: AtomicBool,
    running: AtomicBool,
    run_count: AtomicUsize,
}

impl ReactionInner {
    pub(crate) fn id(&self) -> ReactionId {
        self.id
    }

    pub(crate) fn is_inert(&self) -> bool {
        self.inert.load(Ordering::SeqCst)
    }

    /// Record `cell` as a dependency of this reaction.
    pub(crate) fn attach(self: &Arc<Self>, cell: &Arc<CellCore>) {
        if self.is_inert() {
            return;
        }
        let mut dependencies = self.dependencies.lock();
        if dependencies.iter().any(|dep| dep.id() == cell.id()) {
            return;
        }
        cell.subscribe(self.id, Arc::downgrade(self));
        dependencies.push(Arc::clone(cell));
    }

    fn detach_all(&self) {
        let dependencies = std::mem::take(&mut *self.dependencies.lock());
        for cell in dependencies {
            cell.unsubscribe(self.id);
        }
    }

    pub(crate) fn run(self: &Arc<Self>) -> Result<()> {
        if self.is_inert() {
            return Ok(());
        }
        if self.running.swap(true, Ordering::SeqCst) {
            // Asked to run from inside its own computation: go again after.
            scheduler::schedule_inner(Arc::clone(self));
            return Ok(());
        }
        scheduler::unschedule(self.id);

        self.detach_all();
        let result = {
            let _running = RunningGuard(&self.running);
            let _ctx = ReactiveContext::enter(Arc::clone(self));
            (self.computation)()
        };

        self.run_count.fetch_add(1, Ordering::SeqCst);
        if self.is_inert() {
            self.detach_all();
        }
        result
    }
}

/// Clears the running flag even when the computation unwinds.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A tracked computation with dynamic dependencies.
///
/// # Example
///
/// ```rust,ignore
/// let count = Cell::new(0);
/// let reader = count.clone();
///
/// let reaction = Reaction::track(move || {
///     println!("count is {}", reader.get());
///     Ok(())
/// })?;
///
/// count.set(5);
/// scheduler::flush()?; // prints "count is 5"
/// ```
#[derive(Clone)]
pub struct Reaction {
    inner: Arc<ReactionInner>,
}

impl Reaction {
    /// Create a reaction without running it.
    pub fn new_lazy<F>(computation: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        Self::build(None, Box::new(computation))
    }

    /// Create a labelled reaction without running it. The label shows up in
    /// traces.
    pub fn labelled<F>(label: impl Into<String>, computation: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        Self::build(Some(label.into()), Box::new(computation))
    }

    /// Create a reaction and run it once to establish its dependencies.
    pub fn track<F>(computation: F) -> Result<Self>
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        let reaction = Self::new_lazy(computation);
        reaction.run()?;
        Ok(reaction)
    }

    fn build(label: Option<String>, computation: Computation) -> Self {
        Self {
            inner: Arc::new(ReactionInner {
                id: ReactionId::next(),
                label,
                computation,
                dependencies: Mutex::new(SmallVec::new()),
                inert: AtomicBool::new(false),
                running: AtomicBool::new(false),
                run_count: AtomicUsize::new(0),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ReactionInner>) -> Self {
        Self { inner }
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<ReactionInner> {
        &self.inner
    }

    /// The reaction's unique id.
    pub fn id(&self) -> ReactionId {
        self.inner.id
    }

    /// The label given at construction, if any.
    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    /// Run the computation now, re-collecting dependencies.
    ///
    /// A pending scheduled run of this reaction is cancelled, so the same
    /// batch does not run it twice.
    pub fn run(&self) -> Result<()> {
        self.inner.run()
    }

    /// Enqueue the reaction for the next flush.
    pub fn schedule(&self) {
        if !self.inner.is_inert() {
            scheduler::schedule_inner(Arc::clone(&self.inner));
        }
    }

    /// Detach from every cell and stop reacting. Idempotent.
    pub fn destroy(&self) {
        if self.inner.inert.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::trace!(reaction = %self.inner.id, "reaction destroyed");
        self.inner.detach_all();
        scheduler::unschedule(self.inner.id);
    }

    /// Whether [`destroy`](Self::destroy) has been called.
    pub fn is_destroyed(&self) -> bool {
        self.inner.is_inert()
    }

    /// Whether the computation is executing right now.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// How many times the computation has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// How many cells the last run read.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.lock().len()
    }
}

impl PartialEq for Reaction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Reaction {}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

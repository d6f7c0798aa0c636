//! Update Scheduler
//!
//! The scheduler coalesces synchronous mutations into one deferred batch.
//!
//! # Algorithm
//!
//! 1. `schedule` appends a reaction to a FIFO queue keyed by reaction id. A
//!    reaction already in the queue keeps its original position, so it runs
//!    once per batch however many of its dependencies changed.
//!
//! 2. The first addition since the last flush arms the batch. The host ends
//!    its turn by calling [`flush`] (or awaiting [`tick`]); with
//!    `auto_flush` configured the flush is spawned on the current-thread
//!    tokio runtime instead. Without one the batch stays armed until the
//!    host flushes it.
//!
//! 3. `flush` pops reactions front to back and runs them. Reactions
//!    scheduled while flushing join the same batch, and the queue keeps
//!    draining until empty. `next_tick` callbacks run once the queue is
//!    empty; anything they schedule is drained too.
//!
//! A failing reaction does not stop the batch: failures are handed to the
//! error hook and returned together as a [`FlushError`]. A reaction that
//! re-runs more than `max_batch_reruns` times in one batch is dropped and
//! reported as [`Error::ReactionLoop`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::runtime::RuntimeFlavor;

use super::reaction::{Reaction, ReactionId, ReactionInner};
use crate::config::RuntimeConfig;
use crate::error::{Error, FlushError, ReactionFailure};

type TickCallback = Box<dyn FnOnce()>;
type ErrorHook = Rc<dyn Fn(&ReactionFailure)>;

#[derive(Default)]
struct SchedulerState {
    queue: IndexMap<ReactionId, Arc<ReactionInner>>,
    ticks: Vec<TickCallback>,
    armed: bool,
    flushing: bool,
    batches: u64,
    error_hook: Option<ErrorHook>,
}

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

/// Enqueue `reaction` for the next flush.
pub fn schedule(reaction: &Reaction) {
    reaction.schedule();
}

pub(crate) fn schedule_inner(reaction: Arc<ReactionInner>) {
    let id = reaction.id();
    let arm = SCHEDULER.with(|s| {
        let mut s = s.borrow_mut();
        if s.queue.contains_key(&id) {
            return false;
        }
        s.queue.insert(id, reaction);
        tracing::trace!(reaction = %id, pending = s.queue.len(), "reaction scheduled");
        arm(&mut s)
    });
    if arm {
        spawn_flush();
    }
}

pub(crate) fn unschedule(id: ReactionId) {
    SCHEDULER.with(|s| {
        s.borrow_mut().queue.shift_remove(&id);
    });
}

/// Whether the reaction is waiting in the queue.
pub fn is_scheduled(id: ReactionId) -> bool {
    SCHEDULER.with(|s| s.borrow().queue.contains_key(&id))
}

/// Number of reactions waiting for the next flush.
pub fn pending() -> usize {
    SCHEDULER.with(|s| s.borrow().queue.len())
}

/// Whether a flush is armed and has not happened yet.
pub fn is_armed() -> bool {
    SCHEDULER.with(|s| s.borrow().armed)
}

/// Number of batches flushed on this thread so far.
pub fn batches() -> u64 {
    SCHEDULER.with(|s| s.borrow().batches)
}

/// Run `callback` once the pending batch has fully flushed.
pub fn next_tick(callback: impl FnOnce() + 'static) {
    let arm = SCHEDULER.with(|s| {
        let mut s = s.borrow_mut();
        s.ticks.push(Box::new(callback));
        arm(&mut s)
    });
    if arm {
        spawn_flush();
    }
}

/// Replace the hook that receives each reaction failure during a flush.
///
/// The default hook logs the failure with `tracing::error!`.
pub fn set_error_hook(hook: impl Fn(&ReactionFailure) + 'static) {
    SCHEDULER.with(|s| s.borrow_mut().error_hook = Some(Rc::new(hook)));
}

/// Restore the default logging error hook.
pub fn clear_error_hook() {
    SCHEDULER.with(|s| s.borrow_mut().error_hook = None);
}

/// Flush the pending batch. The awaitable form of end-of-turn.
pub async fn tick() -> Result<(), FlushError> {
    flush()
}

/// Drain the queue and the tick callbacks until both are empty.
///
/// Calling `flush` from inside a running flush is a no-op: the outer flush
/// already drains whatever gets scheduled.
pub fn flush() -> Result<(), FlushError> {
    let already = SCHEDULER.with(|s| std::mem::replace(&mut s.borrow_mut().flushing, true));
    if already {
        return Ok(());
    }
    let guard = FlushGuard;

    let max_reruns = RuntimeConfig::with(|c| c.max_batch_reruns.max(1));
    let mut runs: HashMap<ReactionId, usize> = HashMap::new();
    let mut failures = Vec::new();
    let mut executed = 0usize;

    loop {
        let next = SCHEDULER.with(|s| s.borrow_mut().queue.shift_remove_index(0));
        if let Some((id, reaction)) = next {
            let count = runs.entry(id).or_insert(0);
            *count += 1;
            if *count > max_reruns {
                tracing::warn!(reaction = %id, runs = *count, "reaction loop detected, dropping");
                report(&mut failures, ReactionFailure {
                    reaction: id,
                    error: Error::ReactionLoop { reaction: id, runs: *count },
                });
                continue;
            }
            executed += 1;
            if let Err(error) = reaction.run() {
                report(&mut failures, ReactionFailure { reaction: id, error });
            }
            continue;
        }

        let ticks = SCHEDULER.with(|s| std::mem::take(&mut s.borrow_mut().ticks));
        if ticks.is_empty() {
            break;
        }
        for tick in ticks {
            tick();
        }
    }

    drop(guard);
    let batch = SCHEDULER.with(|s| {
        let mut s = s.borrow_mut();
        s.batches += 1;
        s.batches
    });
    tracing::debug!(batch, executed, failed = failures.len(), "flushed batch");

    if failures.is_empty() {
        Ok(())
    } else {
        Err(FlushError { failures })
    }
}

fn arm(s: &mut SchedulerState) -> bool {
    if s.armed || s.flushing {
        return false;
    }
    s.armed = true;
    true
}

/// Ends a flush, also when a reaction or tick callback unwinds.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        SCHEDULER.with(|s| {
            let mut s = s.borrow_mut();
            s.flushing = false;
            s.armed = false;
        });
    }
}

fn spawn_flush() {
    if !RuntimeConfig::with(|c| c.auto_flush) {
        return;
    }
    // The queue is thread-local, so the flush must run on this thread.
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::CurrentThread => {
            handle.spawn(async {
                // Failures were already delivered to the error hook.
                let _ = flush();
            });
        }
        Ok(_) => {
            tracing::warn!("auto_flush needs a current-thread runtime, batch left for an explicit flush");
        }
        Err(_) => {
            tracing::warn!("auto_flush outside a tokio runtime, batch left for an explicit flush");
        }
    }
}

fn report(failures: &mut Vec<ReactionFailure>, failure: ReactionFailure) {
    let hook = SCHEDULER.with(|s| s.borrow().error_hook.clone());
    match hook {
        Some(hook) => hook(&failure),
        None => tracing::error!(reaction = %failure.reaction, error = %failure.error, "reaction failed"),
    }
    failures.push(failure);
}

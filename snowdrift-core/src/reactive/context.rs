//! Reactive Context
//!
//! The reactive context tracks which reaction is currently running, so that a
//! cell read can subscribe that reaction.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Running a reaction pushes a frame
//! for it; the guard returned by [`ReactiveContext::enter`] pops it again when
//! dropped, even if the computation panics. Nested reactions therefore only
//! ever see their own frame, and the outer reaction's frame is restored as
//! soon as the inner one finishes.
//!
//! [`untracked`] pushes an empty frame: reads inside it subscribe nobody.

use std::cell::RefCell;
use std::sync::Arc;

use super::reaction::{ReactionId, ReactionInner};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// The running reaction, or `None` for an untracked frame.
    reaction: Option<Arc<ReactionInner>>,
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    reaction_id: Option<ReactionId>,
}

impl ReactiveContext {
    /// Enter a tracking frame for `reaction`.
    pub(crate) fn enter(reaction: Arc<ReactionInner>) -> Self {
        let reaction_id = Some(reaction.id());
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                reaction: Some(reaction),
            });
        });
        Self { reaction_id }
    }

    /// Enter a frame in which reads are not tracked.
    pub fn enter_untracked() -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(ContextEntry { reaction: None }));
        Self { reaction_id: None }
    }

    /// Check whether reads would currently be tracked.
    pub fn is_active() -> bool {
        Self::current_reaction().is_some()
    }

    /// The id of the reaction that a read would subscribe, if any.
    pub fn current_reaction() -> Option<ReactionId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.reaction.as_ref().map(|r| r.id()))
        })
    }

    /// How many frames are on this thread's stack.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }

    pub(crate) fn current() -> Option<Arc<ReactionInner>> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.reaction.clone()))
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.reaction.as_ref().map(|r| r.id()),
                    self.reaction_id,
                    "ReactiveContext mismatch"
                );
            }
        });
    }
}

/// Run `f` without subscribing the current reaction to anything it reads.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::enter_untracked();
    f()
}

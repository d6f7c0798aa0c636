//! Reactive Primitives
//!
//! This module implements the reaction graph and the update scheduler.
//!
//! # Concepts
//!
//! ## Reactions
//!
//! A Reaction is a computation that remembers which cells it read. When any
//! of those cells is written, the reaction is scheduled to run again, and
//! each run re-collects its dependencies from scratch.
//!
//! ## Context
//!
//! Reads find the running reaction through a thread-local stack of frames
//! (see [`ReactiveContext`]). Frames nest, so a reaction may run inner
//! reactions without capturing what they read.
//!
//! ## Scheduler
//!
//! Writes never run reactions synchronously. They enqueue them on a
//! per-thread FIFO queue that is drained at the end of the current turn,
//! once per reaction per batch.

mod context;
mod reaction;
pub mod scheduler;
mod when;

pub use context::{untracked, ReactiveContext};
pub(crate) use reaction::ReactionInner;
pub use reaction::{Reaction, ReactionId};
pub use scheduler::{flush, next_tick, tick};
pub use when::{when, When};

//! Error types shared by every layer of the runtime.
//!
//! Configuration errors (unknown or duplicate component tags) and store misuse
//! fail synchronously at the call site. Computation errors raised inside a
//! reaction are collected by the scheduler and surfaced through
//! [`FlushError`] instead of aborting the whole batch.

use std::fmt;

use crate::reactive::ReactionId;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure the runtime can report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `create_component` was called with a tag nobody registered.
    #[error("component `{0}` is not registered")]
    UnregisteredTag(String),

    /// A factory already exists for this tag.
    #[error("component `{0}` is already registered")]
    DuplicateRegistration(String),

    /// The store was destroyed and refuses further writes.
    #[error("store {0} has been destroyed")]
    StoreDestroyed(u64),

    /// A patch had the wrong shape for the store it was applied to.
    #[error("malformed patch: {0}")]
    MalformedPatch(String),

    /// A loop evaluation produced the same key twice.
    #[error("duplicate key `{key}` in loop over `{source_expr}`")]
    DuplicateKey {
        /// The offending key, stringified.
        key: String,
        /// Description of the loop source expression.
        source_expr: String,
    },

    /// A reaction kept rescheduling itself within a single batch.
    #[error("reaction {reaction} re-ran {runs} times in one batch")]
    ReactionLoop {
        /// The runaway reaction.
        reaction: ReactionId,
        /// How many runs were attempted before it was dropped.
        runs: usize,
    },

    /// An expression could not be evaluated against its scope.
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// An event handler reported a failure.
    #[error("event handler failed: {0}")]
    Handler(String),

    /// Runtime configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// One reaction that failed during a flush.
#[derive(Debug)]
pub struct ReactionFailure {
    /// The reaction whose computation failed.
    pub reaction: ReactionId,
    /// What went wrong.
    pub error: Error,
}

impl fmt::Display for ReactionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reaction {}: {}", self.reaction, self.error)
    }
}

/// Aggregated failures of a single flush.
///
/// Independent reactions in the same batch still ran; this only reports the
/// ones that did not complete.
#[derive(Debug, thiserror::Error)]
#[error("{} reaction(s) failed during flush", failures.len())]
pub struct FlushError {
    /// Failures in the order they happened.
    pub failures: Vec<ReactionFailure>,
}

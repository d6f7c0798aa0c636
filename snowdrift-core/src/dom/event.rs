//! DOM events.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::Node;

/// A registered event callback.
pub type Listener = Arc<dyn Fn(&mut Event) + Send + Sync>;

/// Identifies one `add_event_listener` registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// An event travelling up the tree.
pub struct Event {
    kind: String,
    target: Node,
    current_target: Node,
    stopped: bool,
    default_prevented: bool,
}

impl Event {
    pub(crate) fn new(kind: &str, target: Node) -> Self {
        Self {
            kind: kind.to_string(),
            current_target: target.clone(),
            target,
            stopped: false,
            default_prevented: false,
        }
    }

    /// The event type, e.g. `"click"`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The node the event was dispatched at.
    pub fn target(&self) -> &Node {
        &self.target
    }

    /// The node whose listeners are running.
    pub fn current_target(&self) -> &Node {
        &self.current_target
    }

    pub(crate) fn set_current_target(&mut self, node: Node) {
        self.current_target = node;
    }

    /// Stop bubbling after the current node.
    pub fn stop_propagation(&mut self) {
        self.stopped = true;
    }

    /// Whether bubbling was stopped.
    pub fn propagation_stopped(&self) -> bool {
        self.stopped
    }

    /// Flag the default action as cancelled.
    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    /// Whether [`prevent_default`](Self::prevent_default) was called.
    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("stopped", &self.stopped)
            .finish()
    }
}

//! Host DOM
//!
//! A small, thread-safe in-memory document model that the renderer drives.
//! It follows the semantics the renderer relies on from a browser DOM:
//! inserting a node that already has a parent moves it, events bubble from
//! the target to the root, and listeners are registered per node.

mod event;
mod node;

pub use event::{Event, Listener, ListenerId};
pub use node::{Node, NodeId, NodeKind};

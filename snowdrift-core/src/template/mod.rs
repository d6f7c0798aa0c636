//! Templates
//!
//! The typed output of the template compiler: a tree of immutable
//! [`StaticNode`]s, the [`Expr`]essions they evaluate, and the [`Scope`]
//! those expressions are evaluated in. A template is built once and shared
//! by every component rendered from it.

mod expr;
mod node;
mod scope;

pub use expr::{display, Compute, Expr, Path, Resolved};
pub use node::{
    component, each, element, interp, text, Binding, ComponentBuilder, ComponentNode, ElementBuilder,
    ElementNode, EventContext, Handler, LoopBuilder, LoopNode, NodeKind, StaticNode, Template,
};
pub use scope::{Local, Scope};

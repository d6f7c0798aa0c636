//! Components
//!
//! A [`Component`] pairs one state store with one template and owns the DOM
//! rendered from it, its named refs, its delegated event handlers and the
//! child components its placeholders created. Destroying a component
//! destroys its children.
//!
//! Child components are looked up by tag in the process-wide [`registry`].
//! [`Schema`] and [`Facade`] declare observable properties on plain objects.

mod facade;
mod instance;
pub mod registry;

pub use facade::{Facade, FacadeId, Schema, SchemaBuilder};
pub(crate) use instance::WeakComponent;
pub use instance::{Component, ComponentId, Status};
pub use registry::{create_component, register_factory, register_template, Factory};

pub use crate::render::Ref;

//! Snowdrift Core
//!
//! This crate provides the core runtime for the Snowdrift reactive UI
//! framework. It implements:
//!
//! - Observable stores (scalars, records, ordered collections)
//! - Reactions with dynamic dependency tracking
//! - A batched, deduplicated update scheduler
//! - Components rendering static node trees to a live DOM, with keyed list
//!   reconciliation, refs and event delegation
//!
//! Templates arrive already compiled into [`template::StaticNode`] trees; this
//! crate never parses template text.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `store`: Cells and the three store kinds built from them
//! - `reactive`: Reactions, the tracking context and the scheduler
//! - `template`: Static nodes, expressions and scopes
//! - `dom`: The in-memory host DOM the renderer drives
//! - `component`: Component instances, the registry and property schemas
//! - `config`: Per-thread runtime settings
//!
//! # Example
//!
//! ```rust,ignore
//! use snowdrift_core::component::Component;
//! use snowdrift_core::store::Scalar;
//! use snowdrift_core::template::{element, interp};
//!
//! // A store and a component reading it
//! let state = Scalar::new(json!({ "count": 0 }));
//! let counter = Component::new(element("p").child(interp("count")), state.clone());
//! counter.append_to(&body);
//!
//! // Writes are batched until the end of the turn
//! state.set(json!({ "count": 1 }))?;
//! snowdrift_core::reactive::tick().await?;
//! // body now holds <p>1</p>
//! ```

pub mod component;
pub mod config;
pub mod dom;
mod error;
pub mod reactive;
mod render;
pub mod store;
pub mod template;

pub use component::{Component, Ref};
pub use config::RuntimeConfig;
pub use error::{Error, FlushError, ReactionFailure, Result};
pub use reactive::{flush, next_tick, tick, Reaction};
pub use store::{observable, Collection, Observable, Record, Scalar};

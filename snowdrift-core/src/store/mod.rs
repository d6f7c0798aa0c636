//! Observable Stores
//!
//! Stores wrap plain values so that reads and writes go through cells.
//!
//! # Store kinds
//!
//! - [`Scalar`]: one cell holding any value.
//! - [`Record`]: one cell per key plus a shape cell that changes when keys
//!   are added or removed. Keys keep insertion order.
//! - [`Collection`]: items with stable identities plus a shape cell for
//!   insertions, removals and reordering.
//!
//! [`observable`] picks the kind from the value, the way the template layer
//! expects state to be shaped: objects become records, arrays become
//! collections, anything else a scalar. Nested objects and arrays are
//! converted recursively, so a loop can iterate `item.children` with stable
//! identities.
//!
//! Every committed write bumps the cells it touches; stores never skip a
//! write because the value is unchanged.

mod cell;
mod collection;
mod record;
mod scalar;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde_json::Value;

pub use cell::{Cell, CellId};
pub(crate) use cell::CellCore;
pub use collection::{Collection, Item, ItemId};
pub use record::Record;
pub use scalar::Scalar;

use crate::error::{Error, Result};

/// Unique identifier for a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(u64);

impl StoreId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Bookkeeping shared by every store kind.
#[derive(Debug)]
pub(crate) struct StoreCore {
    id: StoreId,
    version: AtomicU64,
    destroyed: AtomicBool,
}

impl StoreCore {
    pub(crate) fn new() -> Self {
        Self {
            id: StoreId::next(),
            version: AtomicU64::new(0),
            destroyed: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> StoreId {
        self.id
    }

    pub(crate) fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::StoreDestroyed(self.id.0));
        }
        Ok(())
    }

    pub(crate) fn commit(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Mark destroyed. Returns `false` if it already was.
    pub(crate) fn mark_destroyed(&self) -> bool {
        !self.destroyed.swap(true, Ordering::SeqCst)
    }
}

/// What a record field or collection item holds.
#[derive(Debug, Clone)]
pub enum Slot {
    /// A plain value.
    Value(Value),
    /// A nested store.
    Store(Observable),
}

impl Slot {
    /// Wrap `value`, turning objects and arrays into nested stores.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(_) | Value::Array(_) => Slot::Store(observable(value)),
            other => Slot::Value(other),
        }
    }

    /// Tracked deep snapshot.
    pub fn to_value(&self) -> Value {
        match self {
            Slot::Value(value) => value.clone(),
            Slot::Store(store) => store.to_value(),
        }
    }

    pub(crate) fn destroy(&self) {
        if let Slot::Store(store) = self {
            store.destroy();
        }
    }
}

/// Any of the three store kinds.
#[derive(Debug, Clone)]
pub enum Observable {
    /// A single value.
    Scalar(Scalar),
    /// A keyed record.
    Record(Record),
    /// An ordered collection.
    Collection(Collection),
}

/// Wrap `value` in the store kind that matches its shape.
pub fn observable(value: Value) -> Observable {
    match value {
        Value::Object(map) => Observable::Record(Record::new(map)),
        Value::Array(items) => Observable::Collection(Collection::new(items)),
        other => Observable::Scalar(Scalar::new(other)),
    }
}

impl Observable {
    fn core(&self) -> &StoreCore {
        match self {
            Observable::Scalar(s) => s.core(),
            Observable::Record(r) => r.core(),
            Observable::Collection(c) => c.core(),
        }
    }

    /// The store's unique id.
    pub fn id(&self) -> StoreId {
        self.core().id()
    }

    /// Number of committed `set` calls.
    pub fn version(&self) -> u64 {
        self.core().version()
    }

    /// Whether the store refuses writes.
    pub fn is_destroyed(&self) -> bool {
        self.core().is_destroyed()
    }

    /// Tracked deep snapshot of the whole store.
    pub fn to_value(&self) -> Value {
        match self {
            Observable::Scalar(s) => s.get(),
            Observable::Record(r) => r.to_value(),
            Observable::Collection(c) => c.to_value(),
        }
    }

    /// Apply `patch`: scalars are replaced, records merge an object,
    /// collections replace their items with an array.
    ///
    /// A record keeps every key the patch does not name, so a whole object
    /// is merged too. Use [`replace`](Self::replace) to drop the other keys.
    pub fn set(&self, patch: Value) -> Result<()> {
        match self {
            Observable::Scalar(s) => s.set(patch),
            Observable::Record(r) => r.merge(patch),
            Observable::Collection(c) => c.set(patch),
        }
    }

    /// Make the store hold exactly `value`. Records drop keys missing from
    /// it; scalars and collections behave as in [`set`](Self::set).
    pub fn replace(&self, value: Value) -> Result<()> {
        match self {
            Observable::Record(r) => r.replace(value),
            _ => self.set(value),
        }
    }

    /// Destroy the store and every store nested in it. Idempotent.
    pub fn destroy(&self) {
        match self {
            Observable::Scalar(s) => s.destroy(),
            Observable::Record(r) => r.destroy(),
            Observable::Collection(c) => c.destroy(),
        }
    }

    /// Whether `patch` can be forwarded into this store by a parent write.
    pub(crate) fn accepts(&self, patch: &Value) -> bool {
        match self {
            Observable::Scalar(_) => false,
            Observable::Record(_) => patch.is_object(),
            Observable::Collection(_) => patch.is_array(),
        }
    }

    /// Whether both handles point at the same store.
    pub fn same(&self, other: &Observable) -> bool {
        self.id() == other.id()
    }

    /// The record, if this is one.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Observable::Record(r) => Some(r),
            _ => None,
        }
    }

    /// The collection, if this is one.
    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Observable::Collection(c) => Some(c),
            _ => None,
        }
    }

    /// The scalar, if this is one.
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Observable::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Scalar> for Observable {
    fn from(store: Scalar) -> Self {
        Observable::Scalar(store)
    }
}

impl From<Record> for Observable {
    fn from(store: Record) -> Self {
        Observable::Record(store)
    }
}

impl From<Collection> for Observable {
    fn from(store: Collection) -> Self {
        Observable::Collection(store)
    }
}

impl From<Value> for Observable {
    fn from(value: Value) -> Self {
        observable(value)
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store#{}", self.0)
    }
}

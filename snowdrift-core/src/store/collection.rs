//! Ordered collection with stable item identities.
//!
//! Each item gets an [`ItemId`] when it enters the collection and keeps it
//! across reorders. The item's value lives in its own store, so writing an
//! item's fields wakes only the readers of that item. Structural changes
//! (add, insert, remove, reorder, replace) commit the shape cell.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use super::{observable, Cell, Observable, StoreCore, StoreId};
use crate::error::{Error, Result};

/// Stable identity of a collection item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// One entry of a collection.
#[derive(Debug, Clone)]
pub struct Item {
    id: ItemId,
    value: Observable,
}

impl Item {
    fn new(value: Value) -> Self {
        Self {
            id: ItemId::next(),
            value: observable(value),
        }
    }

    /// The item's identity.
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// The store holding the item's value.
    pub fn value(&self) -> &Observable {
        &self.value
    }
}

struct CollectionInner {
    core: StoreCore,
    items: RwLock<Vec<Item>>,
    shape: Cell<()>,
}

/// An ordered list of stores.
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

impl Collection {
    /// Create a collection, giving each value a fresh identity.
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                core: StoreCore::new(),
                items: RwLock::new(values.into_iter().map(Item::new).collect()),
                shape: Cell::new(()),
            }),
        }
    }

    pub(crate) fn core(&self) -> &StoreCore {
        &self.inner.core
    }

    /// The store's unique id.
    pub fn id(&self) -> StoreId {
        self.inner.core.id()
    }

    /// Number of committed writes.
    pub fn version(&self) -> u64 {
        self.inner.core.version()
    }

    /// Tracked length.
    pub fn len(&self) -> usize {
        self.inner.shape.track();
        self.inner.items.read().len()
    }

    /// Tracked emptiness check.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked snapshot of the items in order.
    pub fn items(&self) -> Vec<Item> {
        self.inner.shape.track();
        self.inner.items.read().clone()
    }

    /// Tracked positional read.
    pub fn get(&self, index: usize) -> Option<Item> {
        self.inner.shape.track();
        self.inner.items.read().get(index).cloned()
    }

    /// Tracked lookup by identity.
    pub fn find(&self, id: ItemId) -> Option<Item> {
        self.inner.shape.track();
        self.inner.items.read().iter().find(|item| item.id == id).cloned()
    }

    /// Tracked position of an item.
    pub fn position(&self, id: ItemId) -> Option<usize> {
        self.inner.shape.track();
        self.inner.items.read().iter().position(|item| item.id == id)
    }

    /// Tracked deep snapshot.
    pub fn to_value(&self) -> Value {
        Value::Array(self.items().iter().map(|item| item.value.to_value()).collect())
    }

    /// Append one value.
    pub fn add(&self, value: Value) -> Result<ItemId> {
        self.inner.core.ensure_live()?;
        let item = Item::new(value);
        let id = item.id;
        self.inner.items.write().push(item);
        self.commit_shape();
        Ok(id)
    }

    /// Append several values as one write.
    pub fn add_all(&self, values: Vec<Value>) -> Result<Vec<ItemId>> {
        self.inner.core.ensure_live()?;
        let items: Vec<Item> = values.into_iter().map(Item::new).collect();
        let ids = items.iter().map(|item| item.id).collect();
        self.inner.items.write().extend(items);
        self.commit_shape();
        Ok(ids)
    }

    /// Insert a value at `index`.
    pub fn insert(&self, index: usize, value: Value) -> Result<ItemId> {
        self.inner.core.ensure_live()?;
        let len = self.inner.items.read().len();
        if index > len {
            return Err(Error::MalformedPatch(format!(
                "insert index {index} out of bounds for length {len}"
            )));
        }
        let item = Item::new(value);
        let id = item.id;
        self.inner.items.write().insert(index, item);
        self.commit_shape();
        Ok(id)
    }

    /// Remove an item by identity. Returns whether it was present.
    pub fn remove(&self, id: ItemId) -> Result<bool> {
        self.inner.core.ensure_live()?;
        let removed = {
            let mut items = self.inner.items.write();
            items
                .iter()
                .position(|item| item.id == id)
                .map(|index| items.remove(index))
        };
        match removed {
            Some(item) => {
                item.value.destroy();
                self.commit_shape();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Put the items in the order given by `order`, which must name every
    /// current item exactly once.
    pub fn reorder(&self, order: &[ItemId]) -> Result<()> {
        self.inner.core.ensure_live()?;
        {
            let mut items = self.inner.items.write();
            let unique: HashSet<ItemId> = order.iter().copied().collect();
            let complete = unique.len() == order.len()
                && order.len() == items.len()
                && items.iter().all(|item| unique.contains(&item.id));
            if !complete {
                return Err(Error::MalformedPatch(
                    "reorder must name every item exactly once".into(),
                ));
            }
            let mut reordered = Vec::with_capacity(items.len());
            for id in order {
                if let Some(index) = items.iter().position(|item| item.id == *id) {
                    reordered.push(items.swap_remove(index));
                }
            }
            *items = reordered;
        }
        self.commit_shape();
        Ok(())
    }

    /// Replace every item. New values get new identities.
    pub fn replace(&self, values: Vec<Value>) -> Result<()> {
        self.inner.core.ensure_live()?;
        let fresh = values.into_iter().map(Item::new).collect();
        let old = std::mem::replace(&mut *self.inner.items.write(), fresh);
        for item in old {
            item.value.destroy();
        }
        self.commit_shape();
        Ok(())
    }

    /// Apply `patch` to the store of one item.
    pub fn update(&self, id: ItemId, patch: Value) -> Result<()> {
        self.inner.core.ensure_live()?;
        let item = self.inner.items.read().iter().find(|item| item.id == id).cloned();
        let Some(item) = item else {
            return Err(Error::MalformedPatch(format!("no {id} in collection")));
        };
        item.value.set(patch)?;
        self.inner.core.commit();
        Ok(())
    }

    /// Remove every item.
    pub fn clear(&self) -> Result<()> {
        self.replace(Vec::new())
    }

    /// Whole-collection write used by [`Observable::set`].
    pub(crate) fn set(&self, patch: Value) -> Result<()> {
        match patch {
            Value::Array(values) => self.replace(values),
            other => Err(Error::MalformedPatch(format!("expected an array, got {other}"))),
        }
    }

    /// Refuse further writes and destroy every item. Idempotent.
    pub fn destroy(&self) {
        if !self.inner.core.mark_destroyed() {
            return;
        }
        for item in self.inner.items.read().iter() {
            item.value.destroy();
        }
    }

    /// Whether the collection was destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.inner.core.is_destroyed()
    }

    fn commit_shape(&self) {
        self.inner.shape.set(());
        self.inner.core.commit();
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("id", &self.inner.core.id())
            .field("version", &self.inner.core.version())
            .field("len", &self.inner.items.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{scheduler, Reaction};
    use serde_json::json;

    fn ids(collection: &Collection) -> Vec<ItemId> {
        collection.items().iter().map(Item::id).collect()
    }

    #[test]
    fn reorder_keeps_identities() {
        let c = Collection::new(vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]);
        let before = ids(&c);

        c.reorder(&[before[2], before[0], before[1]]).unwrap();
        assert_eq!(ids(&c), vec![before[2], before[0], before[1]]);
        assert_eq!(c.to_value(), json!([{"id": 3}, {"id": 1}, {"id": 2}]));
    }

    #[test]
    fn reorder_rejects_incomplete_orders() {
        let c = Collection::new(vec![json!(1), json!(2)]);
        let before = ids(&c);
        assert!(matches!(c.reorder(&[before[0]]), Err(Error::MalformedPatch(_))));
        assert!(matches!(c.reorder(&[before[0], before[0]]), Err(Error::MalformedPatch(_))));
        assert_eq!(c.version(), 0);
    }

    #[test]
    fn structural_changes_wake_shape_readers() {
        let c = Collection::new(vec![json!("a")]);
        let reader = c.clone();
        let reaction = Reaction::track(move || {
            reader.len();
            Ok(())
        })
        .unwrap();

        c.add(json!("b")).unwrap();
        assert!(scheduler::is_scheduled(reaction.id()));
        scheduler::flush().unwrap();
        assert_eq!(reaction.run_count(), 2);
    }

    #[test]
    fn item_writes_do_not_touch_shape() {
        let c = Collection::new(vec![json!({"name": "a"})]);
        let reader = c.clone();
        let shape_reader = Reaction::track(move || {
            reader.len();
            Ok(())
        })
        .unwrap();

        let id = c.get(0).unwrap().id();
        c.update(id, json!({"name": "z"})).unwrap();
        assert!(!scheduler::is_scheduled(shape_reader.id()));
        assert_eq!(c.to_value(), json!([{"name": "z"}]));
    }

    #[test]
    fn remove_by_identity_destroys_the_item() {
        let c = Collection::new(vec![json!({"n": 1}), json!({"n": 2})]);
        let first = c.get(0).unwrap();

        assert!(c.remove(first.id()).unwrap());
        assert!(first.value().is_destroyed());
        assert!(!c.remove(first.id()).unwrap());
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn replace_issues_new_identities() {
        let c = Collection::new(vec![json!(1)]);
        let before = ids(&c);
        c.replace(vec![json!(1)]).unwrap();
        assert_ne!(ids(&c), before);
    }

    #[test]
    fn destroyed_collection_rejects_writes() {
        let c = Collection::new(vec![]);
        c.destroy();
        assert!(matches!(c.add(json!(1)), Err(Error::StoreDestroyed(_))));
    }
}

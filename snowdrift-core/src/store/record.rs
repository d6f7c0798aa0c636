//! Keyed store with one cell per key.
//!
//! Reading a key subscribes to that key's cell only. Reading a key that does
//! not exist subscribes to the shape cell, so the reader hears about the key
//! being added later. Enumerating keys subscribes to the shape cell.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::{Cell, Collection, Observable, Slot, StoreCore, StoreId};
use crate::error::{Error, Result};

struct RecordInner {
    core: StoreCore,
    fields: RwLock<IndexMap<String, Cell<Slot>>>,
    shape: Cell<()>,
}

/// A keyed store preserving insertion order.
#[derive(Clone)]
pub struct Record {
    inner: Arc<RecordInner>,
}

/// One planned change of a write, computed before anything is applied.
enum Step {
    Forward(Observable, Value),
    Overwrite(Cell<Slot>, Slot),
    Insert(String, Slot),
}

impl Record {
    /// Create a record from an object's entries.
    pub fn new(entries: Map<String, Value>) -> Self {
        let fields = entries
            .into_iter()
            .map(|(key, value)| (key, Cell::new(Slot::from_value(value))))
            .collect();
        Self {
            inner: Arc::new(RecordInner {
                core: StoreCore::new(),
                fields: RwLock::new(fields),
                shape: Cell::new(()),
            }),
        }
    }

    /// Create a record from a JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::new(map)),
            other => Err(Error::MalformedPatch(format!("expected an object, got {other}"))),
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

    fn field(&self, key: &str) -> Option<Cell<Slot>> {
        self.inner.fields.read().get(key).cloned()
    }

    /// Tracked read of one key. `None` means the key is absent.
    pub fn get(&self, key: &str) -> Option<Slot> {
        match self.field(key) {
            Some(cell) => Some(cell.get()),
            None => {
                self.inner.shape.track();
                None
            }
        }
    }

    /// Tracked deep snapshot of one key.
    pub fn value(&self, key: &str) -> Option<Value> {
        self.get(key).map(|slot| slot.to_value())
    }

    /// The nested record stored under `key`.
    pub fn record(&self, key: &str) -> Option<Record> {
        match self.get(key) {
            Some(Slot::Store(Observable::Record(record))) => Some(record),
            _ => None,
        }
    }

    /// The nested collection stored under `key`.
    pub fn collection(&self, key: &str) -> Option<Collection> {
        match self.get(key) {
            Some(Slot::Store(Observable::Collection(collection))) => Some(collection),
            _ => None,
        }
    }

    /// Tracked check for a key.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.shape.track();
        self.inner.fields.read().contains_key(key)
    }

    /// Tracked list of keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.shape.track();
        self.inner.fields.read().keys().cloned().collect()
    }

    /// Tracked number of keys.
    pub fn len(&self) -> usize {
        self.inner.shape.track();
        self.inner.fields.read().len()
    }

    /// Tracked emptiness check.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked deep snapshot of the whole record.
    pub fn to_value(&self) -> Value {
        self.inner.shape.track();
        let fields: Vec<(String, Cell<Slot>)> = self
            .inner
            .fields
            .read()
            .iter()
            .map(|(key, cell)| (key.clone(), cell.clone()))
            .collect();
        let map = fields
            .into_iter()
            .map(|(key, cell)| (key, cell.get().to_value()))
            .collect();
        Value::Object(map)
    }

    /// Write one key. Objects and arrays written over a nested record or
    /// collection are forwarded into it.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Result<()> {
        let mut map = Map::new();
        map.insert(key.into(), value);
        self.merge(Value::Object(map))
    }

    /// Write every key of `patch`, leaving other keys alone.
    pub fn merge(&self, patch: Value) -> Result<()> {
        self.inner.core.ensure_live()?;
        let entries = match patch {
            Value::Object(entries) => entries,
            other => return Err(Error::MalformedPatch(format!("expected an object, got {other}"))),
        };
        let steps = self.plan(entries)?;
        self.apply(steps, Vec::new());
        Ok(())
    }

    /// Make the record hold exactly the keys of `value`.
    pub fn replace(&self, value: Value) -> Result<()> {
        self.inner.core.ensure_live()?;
        let entries = match value {
            Value::Object(entries) => entries,
            other => return Err(Error::MalformedPatch(format!("expected an object, got {other}"))),
        };
        let removed: Vec<String> = self
            .inner
            .fields
            .read()
            .keys()
            .filter(|key| !entries.contains_key(*key))
            .cloned()
            .collect();
        let steps = self.plan(entries)?;
        self.apply(steps, removed);
        Ok(())
    }

    /// Remove a key, returning its last value.
    pub fn remove(&self, key: &str) -> Result<Option<Value>> {
        self.inner.core.ensure_live()?;
        let removed = self.inner.fields.write().shift_remove(key);
        let Some(cell) = removed else {
            return Ok(None);
        };
        let slot = cell.peek();
        let value = crate::reactive::untracked(|| slot.to_value());
        slot.destroy();
        cell.notify();
        self.inner.shape.set(());
        self.inner.core.commit();
        Ok(Some(value))
    }

    /// Refuse further writes and destroy nested stores. Idempotent.
    pub fn destroy(&self) {
        if !self.inner.core.mark_destroyed() {
            return;
        }
        let cells: Vec<Cell<Slot>> = self.inner.fields.read().values().cloned().collect();
        for cell in cells {
            cell.peek().destroy();
        }
    }

    /// Whether the record was destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.inner.core.is_destroyed()
    }

    fn plan(&self, entries: Map<String, Value>) -> Result<Vec<Step>> {
        let fields = self.inner.fields.read();
        let mut steps = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match fields.get(&key) {
                Some(cell) => match cell.peek() {
                    Slot::Store(nested) if nested.accepts(&value) => {
                        if nested.is_destroyed() {
                            return Err(Error::StoreDestroyed(nested.id().raw()));
                        }
                        steps.push(Step::Forward(nested, value));
                    }
                    _ => steps.push(Step::Overwrite(cell.clone(), Slot::from_value(value))),
                },
                None => steps.push(Step::Insert(key, Slot::from_value(value))),
            }
        }
        Ok(steps)
    }

    fn apply(&self, steps: Vec<Step>, removed: Vec<String>) {
        let mut shape_changed = false;
        let mut touched = Vec::new();

        for step in steps {
            match step {
                Step::Forward(nested, value) => {
                    // Accepted shapes were checked while planning.
                    if let Err(err) = nested.set(value) {
                        tracing::warn!(error = %err, "nested store rejected forwarded write");
                    }
                }
                Step::Overwrite(cell, slot) => {
                    cell.peek().destroy();
                    cell.write(slot);
                    touched.push(cell);
                }
                Step::Insert(key, slot) => {
                    self.inner.fields.write().insert(key, Cell::new(slot));
                    shape_changed = true;
                }
            }
        }

        for key in removed {
            if let Some(cell) = self.inner.fields.write().shift_remove(&key) {
                cell.peek().destroy();
                touched.push(cell);
                shape_changed = true;
            }
        }

        for cell in touched {
            cell.notify();
        }
        if shape_changed {
            self.inner.shape.set(());
        }
        self.inner.core.commit();
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.inner.core.id())
            .field("version", &self.inner.core.version())
            .field("keys", &self.inner.fields.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{scheduler, Reaction};
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    fn watch(record: &Record, key: &'static str) -> Reaction {
        let record = record.clone();
        Reaction::track(move || {
            record.get(key);
            Ok(())
        })
        .unwrap()
    }

    #[test]
    fn absent_key_reads_as_none() {
        let r = record(json!({ "a": 1 }));
        assert!(r.get("missing").is_none());
        assert_eq!(r.value("a"), Some(json!(1)));
    }

    #[test]
    fn writing_one_key_only_wakes_its_readers() {
        let r = record(json!({ "a": 1, "b": 2 }));
        let on_a = watch(&r, "a");
        let on_b = watch(&r, "b");

        r.set("a", json!(10)).unwrap();
        assert!(scheduler::is_scheduled(on_a.id()));
        assert!(!scheduler::is_scheduled(on_b.id()));
        scheduler::flush().unwrap();
    }

    #[test]
    fn adding_a_key_wakes_readers_of_the_absent_key() {
        let r = record(json!({}));
        let on_c = watch(&r, "c");

        r.set("c", json!(true)).unwrap();
        assert!(scheduler::is_scheduled(on_c.id()));
        scheduler::flush().unwrap();
        assert_eq!(on_c.run_count(), 2);
    }

    #[test]
    fn merge_bumps_version_once() {
        let r = record(json!({ "a": 1 }));
        r.merge(json!({ "a": 2, "b": 3 })).unwrap();
        assert_eq!(r.version(), 1);
        assert_eq!(r.keys(), vec!["a", "b"]);
    }

    #[test]
    fn malformed_patch_changes_nothing() {
        let r = record(json!({ "a": 1 }));
        assert!(matches!(r.merge(json!([1])), Err(Error::MalformedPatch(_))));
        assert_eq!(r.version(), 0);
        assert_eq!(r.to_value(), json!({ "a": 1 }));
    }

    #[test]
    fn replace_removes_missing_keys() {
        let r = record(json!({ "a": 1, "b": 2 }));
        let keys = {
            let r = r.clone();
            Reaction::track(move || {
                r.keys();
                Ok(())
            })
            .unwrap()
        };

        r.replace(json!({ "b": 5 })).unwrap();
        assert_eq!(r.to_value(), json!({ "b": 5 }));
        assert!(scheduler::is_scheduled(keys.id()));
        scheduler::flush().unwrap();
    }

    #[test]
    fn overwriting_existing_key_leaves_shape_alone() {
        let r = record(json!({ "a": 1 }));
        let keys = {
            let r = r.clone();
            Reaction::track(move || {
                r.keys();
                Ok(())
            })
            .unwrap()
        };

        r.set("a", json!(2)).unwrap();
        assert!(!scheduler::is_scheduled(keys.id()));
    }

    #[test]
    fn objects_are_forwarded_into_nested_records() {
        let r = record(json!({ "data": { "name": 1, "keep": true } }));
        let nested = r.record("data").unwrap();

        r.set("data", json!({ "name": 2 })).unwrap();
        assert!(r.record("data").unwrap().same_store(&nested));
        assert_eq!(nested.to_value(), json!({ "name": 2, "keep": true }));
    }

    #[test]
    fn remove_returns_last_value() {
        let r = record(json!({ "a": [1, 2] }));
        let list = r.collection("a").unwrap();
        assert_eq!(r.remove("a").unwrap(), Some(json!([1, 2])));
        assert!(list.is_destroyed());
        assert_eq!(r.remove("a").unwrap(), None);
    }
}

#[cfg(test)]
impl Record {
    fn same_store(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

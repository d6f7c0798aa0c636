//! Single-cell store.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::{Cell, StoreCore, StoreId};
use crate::error::Result;

/// A store holding one value in one cell.
#[derive(Clone)]
pub struct Scalar {
    core: Arc<StoreCore>,
    cell: Cell<Value>,
}

impl Scalar {
    /// Create a scalar store.
    pub fn new(value: Value) -> Self {
        Self {
            core: Arc::new(StoreCore::new()),
            cell: Cell::new(value),
        }
    }

    pub(crate) fn core(&self) -> &StoreCore {
        &self.core
    }

    /// The store's unique id.
    pub fn id(&self) -> StoreId {
        self.core.id()
    }

    /// Tracked read.
    pub fn get(&self) -> Value {
        self.cell.get()
    }

    /// Tracked borrow.
    pub fn with<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        self.cell.with(f)
    }

    /// Replace the value.
    pub fn set(&self, value: Value) -> Result<()> {
        self.core.ensure_live()?;
        self.cell.set(value);
        self.core.commit();
        Ok(())
    }

    /// Modify the value in place.
    pub fn update(&self, f: impl FnOnce(&mut Value)) -> Result<()> {
        self.core.ensure_live()?;
        self.cell.update(f);
        self.core.commit();
        Ok(())
    }

    /// Number of committed writes.
    pub fn version(&self) -> u64 {
        self.core.version()
    }

    /// Refuse further writes. Idempotent.
    pub fn destroy(&self) {
        self.core.mark_destroyed();
    }

    /// Whether the store was destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.core.is_destroyed()
    }

    /// The underlying cell.
    pub fn cell(&self) -> &Cell<Value> {
        &self.cell
    }
}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scalar")
            .field("id", &self.core.id())
            .field("version", &self.core.version())
            .field("value", &self.cell.peek())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use serde_json::json;

    #[test]
    fn set_bumps_version_by_one() {
        let store = Scalar::new(json!({ "count": 0 }));
        store.set(json!({ "count": 1 })).unwrap();
        assert_eq!(store.version(), 1);
        assert_eq!(store.cell().version(), 1);
        assert_eq!(store.get(), json!({ "count": 1 }));
    }

    #[test]
    fn destroyed_scalar_rejects_writes() {
        let store = Scalar::new(json!(1));
        store.destroy();
        assert!(matches!(store.set(json!(2)), Err(Error::StoreDestroyed(_))));
        assert_eq!(store.get(), json!(1));
    }
}

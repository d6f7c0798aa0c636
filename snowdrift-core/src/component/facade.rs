//! Property schemas.
//!
//! A [`Schema`] declares the observable properties of a kind of object once,
//! at definition time. Each [`Facade`] made from it is a thin handle: the
//! record backing its properties is only built the first time a property is
//! touched, and lives in a process-wide table keyed by the facade's id until
//! the facade is dropped.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use serde_json::{Map, Value};

use super::Component;
use crate::error::Result;
use crate::store::Record;
use crate::template::Template;

type Derive = Arc<dyn Fn(&Map<String, Value>) -> Value + Send + Sync>;

#[derive(Clone)]
enum Initial {
    Value(Value),
    Derived(Derive),
}

#[derive(Clone)]
struct Property {
    name: String,
    initial: Initial,
}

/// Unique identifier for a facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FacadeId(u64);

impl FacadeId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

fn backing() -> &'static DashMap<FacadeId, Record> {
    static TABLE: OnceLock<DashMap<FacadeId, Record>> = OnceLock::new();
    TABLE.get_or_init(DashMap::new)
}

/// Declared observable properties.
#[derive(Clone)]
pub struct Schema {
    properties: Arc<[Property]>,
}

/// Builder for [`Schema`].
#[derive(Default)]
pub struct SchemaBuilder {
    properties: Vec<Property>,
}

impl SchemaBuilder {
    /// A property with a default value.
    pub fn property(mut self, name: &str, default: Value) -> Self {
        self.properties.push(Property {
            name: name.to_string(),
            initial: Initial::Value(default),
        });
        self
    }

    /// A property initialized from the properties declared before it.
    pub fn derived<F>(mut self, name: &str, initializer: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Value + Send + Sync + 'static,
    {
        self.properties.push(Property {
            name: name.to_string(),
            initial: Initial::Derived(Arc::new(initializer)),
        });
        self
    }

    /// Finish.
    pub fn build(self) -> Schema {
        Schema {
            properties: self.properties.into(),
        }
    }
}

impl Schema {
    /// Start declaring properties.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Property names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.properties.iter().map(|p| p.name.as_str()).collect()
    }

    /// A new, not yet materialized instance.
    pub fn instance(&self) -> Facade {
        Facade {
            id: FacadeId::next(),
            schema: self.clone(),
        }
    }

    fn initial_values(&self) -> Map<String, Value> {
        let mut values = Map::new();
        for property in self.properties.iter() {
            let value = match &property.initial {
                Initial::Value(value) => value.clone(),
                Initial::Derived(derive) => derive(&values),
            };
            values.insert(property.name.clone(), value);
        }
        values
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema").field("properties", &self.names()).finish()
    }
}

/// One object whose declared properties are observable.
pub struct Facade {
    id: FacadeId,
    schema: Schema,
}

impl Facade {
    /// The facade's id.
    pub fn id(&self) -> FacadeId {
        self.id
    }

    /// Whether the backing record has been built.
    pub fn is_materialized(&self) -> bool {
        backing().contains_key(&self.id)
    }

    /// The backing record, built on first use.
    pub fn store(&self) -> Record {
        if let Some(record) = backing().get(&self.id) {
            return record.value().clone();
        }
        let values = self.schema.initial_values();
        tracing::trace!(facade = self.id.0, "materializing backing record");
        backing()
            .entry(self.id)
            .or_insert_with(|| Record::new(values))
            .value()
            .clone()
    }

    /// Tracked read of a property.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.store().value(name)
    }

    /// Write a property.
    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        self.store().set(name, value)
    }

    /// A component rendering `template` over this facade's properties.
    pub fn component(&self, template: impl Into<Template>) -> Component {
        Component::new(template, self.store())
    }
}

impl Drop for Facade {
    fn drop(&mut self) {
        backing().remove(&self.id);
    }
}

impl fmt::Debug for Facade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Facade")
            .field("id", &self.id)
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::builder()
            .property("first", json!("Ada"))
            .property("last", json!("Lovelace"))
            .derived("full", |values| {
                json!(format!(
                    "{} {}",
                    values["first"].as_str().unwrap_or_default(),
                    values["last"].as_str().unwrap_or_default()
                ))
            })
            .build()
    }

    #[test]
    fn records_are_materialized_lazily() {
        let facade = schema().instance();
        assert!(!facade.is_materialized());

        assert_eq!(facade.get("full"), Some(json!("Ada Lovelace")));
        assert!(facade.is_materialized());
    }

    #[test]
    fn instances_do_not_share_state() {
        let schema = schema();
        let (a, b) = (schema.instance(), schema.instance());
        a.set("first", json!("Grace")).unwrap();
        assert_eq!(a.get("first"), Some(json!("Grace")));
        assert_eq!(b.get("first"), Some(json!("Ada")));
    }

    #[test]
    fn dropping_the_facade_frees_its_record() {
        let facade = schema().instance();
        let id = facade.id();
        facade.store();
        drop(facade);
        assert!(!backing().contains_key(&id));
    }
}

//! Component registry.
//!
//! A process-wide map from tag to factory. It starts empty, only grows
//! through explicit registration, and is cleared only by
//! [`reset_registry`].

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::Component;
use crate::error::{Error, Result};
use crate::store::observable;
use crate::template::Template;

/// Builds a component from its props.
pub type Factory = Arc<dyn Fn(Value) -> Result<Component> + Send + Sync>;

fn registry() -> &'static RwLock<HashMap<String, Factory>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, Factory>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register a factory for `tag`.
pub fn register_factory<F>(tag: &str, factory: F) -> Result<()>
where
    F: Fn(Value) -> Result<Component> + Send + Sync + 'static,
{
    let mut registry = registry().write();
    if registry.contains_key(tag) {
        return Err(Error::DuplicateRegistration(tag.to_string()));
    }
    registry.insert(tag.to_string(), Arc::new(factory));
    tracing::debug!(tag, "component registered");
    Ok(())
}

/// Register a tag whose instances render `template` over a record built
/// from their props.
pub fn register_template(tag: &str, template: impl Into<Template>) -> Result<()> {
    let template = template.into();
    register_factory(tag, move |props| {
        let props = match props {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        Ok(Component::new(template.clone(), observable(props)))
    })
}

/// Instantiate the component registered under `tag`.
pub fn create_component(tag: &str, props: Value) -> Result<Component> {
    let factory = registry()
        .read()
        .get(tag)
        .cloned()
        .ok_or_else(|| Error::UnregisteredTag(tag.to_string()))?;
    factory(props)
}

/// Whether a factory exists for `tag`.
pub fn is_registered(tag: &str) -> bool {
    registry().read().contains_key(tag)
}

/// Every registered tag, sorted.
pub fn registered_tags() -> Vec<String> {
    let mut tags: Vec<String> = registry().read().keys().cloned().collect();
    tags.sort();
    tags
}

/// Forget every registration. Meant for tests.
pub fn reset_registry() {
    registry().write().clear();
    tracing::debug!("component registry reset");
}

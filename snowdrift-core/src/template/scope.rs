//! Data context for expression evaluation.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::expr::Resolved;
use crate::store::Observable;

/// A name bound by a loop.
#[derive(Debug, Clone)]
pub enum Local {
    /// The item is a store; reads through it are tracked.
    Store(Observable),
    /// A plain value, such as a position.
    Value(Value),
}

impl From<Local> for Resolved {
    fn from(local: Local) -> Self {
        match local {
            Local::Store(store) => Resolved::Store(store),
            Local::Value(value) => Resolved::Value(value),
        }
    }
}

struct Frame {
    name: String,
    local: Local,
    parent: Option<Arc<Frame>>,
}

/// Loop locals layered over the component state.
///
/// Scopes are persistent: [`with_local`](Scope::with_local) returns a new
/// scope sharing the existing chain, so every loop item can hold its own
/// scope without copying its ancestors.
#[derive(Clone)]
pub struct Scope {
    state: Observable,
    locals: Option<Arc<Frame>>,
}

impl Scope {
    /// A scope with no locals.
    pub fn new(state: Observable) -> Self {
        Self { state, locals: None }
    }

    /// The component state at the bottom of the chain.
    pub fn state(&self) -> &Observable {
        &self.state
    }

    /// Bind `name` on top of this scope.
    pub fn with_local(&self, name: impl Into<String>, local: Local) -> Self {
        Self {
            state: self.state.clone(),
            locals: Some(Arc::new(Frame {
                name: name.into(),
                local,
                parent: self.locals.clone(),
            })),
        }
    }

    /// Whether both scopes are the same chain over the same state.
    pub fn same(&self, other: &Scope) -> bool {
        let locals = match (&self.locals, &other.locals) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        locals && self.state.same(&other.state)
    }

    /// The innermost local called `name`.
    pub fn local(&self, name: &str) -> Option<&Local> {
        let mut frame = self.locals.as_deref();
        while let Some(current) = frame {
            if current.name == name {
                return Some(&current.local);
            }
            frame = current.parent.as_deref();
        }
        None
    }

    /// Resolve a root name: locals first, then a field of the state.
    /// Unknown names resolve to `null`.
    pub fn lookup(&self, name: &str) -> Resolved {
        if let Some(local) = self.local(name) {
            return local.clone().into();
        }
        Resolved::Store(self.state.clone()).field(name)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        let mut frame = self.locals.as_deref();
        while let Some(current) = frame {
            names.push(current.name.as_str());
            frame = current.parent.as_deref();
        }
        f.debug_struct("Scope")
            .field("state", &self.state.id())
            .field("locals", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::observable;
    use serde_json::json;

    #[test]
    fn locals_shadow_state_fields() {
        let scope = Scope::new(observable(json!({ "item": "state", "other": 1 })));
        let inner = scope.with_local("item", Local::Value(json!("local")));

        assert_eq!(inner.lookup("item").into_value(), json!("local"));
        assert_eq!(inner.lookup("other").into_value(), json!(1));
        assert_eq!(scope.lookup("item").into_value(), json!("state"));
    }

    #[test]
    fn unknown_names_are_null() {
        let scope = Scope::new(observable(json!({})));
        assert_eq!(scope.lookup("nope").into_value(), Value::Null);
    }

    #[test]
    fn scalar_state_is_indexed_by_field() {
        let scope = Scope::new(observable(json!({ "count": 3 })));
        assert_eq!(scope.lookup("count").into_value(), json!(3));

        let scalar = Scope::new(crate::store::Scalar::new(json!({ "count": 4 })).into());
        assert_eq!(scalar.lookup("count").into_value(), json!(4));
    }
}

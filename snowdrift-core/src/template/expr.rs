//! Compiled expressions.
//!
//! Expressions arrive already compiled: a literal, a dotted path such as
//! `item.name` or `list.0`, or a closure over the scope. Evaluating a path
//! walks stores for as long as it can, so every read along the way is
//! tracked by the running reaction.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::scope::Scope;
use crate::error::Result;
use crate::store::{Observable, Slot};

/// A compiled closure over the scope.
pub type Compute = Arc<dyn Fn(&Scope) -> Result<Value> + Send + Sync>;

/// The result of evaluating an expression.
#[derive(Debug, Clone)]
pub enum Resolved {
    /// A store. Loops iterate collections with their item identities.
    Store(Observable),
    /// A plain value.
    Value(Value),
}

impl Resolved {
    /// Step into `name`. Missing fields give `null`.
    pub fn field(self, name: &str) -> Resolved {
        match self {
            Resolved::Store(Observable::Record(record)) => match record.get(name) {
                Some(Slot::Store(store)) => Resolved::Store(store),
                Some(Slot::Value(value)) => Resolved::Value(value),
                None => Resolved::Value(Value::Null),
            },
            Resolved::Store(Observable::Collection(collection)) => {
                if name == "length" {
                    return Resolved::Value(Value::from(collection.len()));
                }
                match name.parse::<usize>().ok().and_then(|index| collection.get(index)) {
                    Some(item) => Resolved::Store(item.value().clone()),
                    None => Resolved::Value(Value::Null),
                }
            }
            Resolved::Store(Observable::Scalar(scalar)) => {
                Resolved::Value(scalar.with(|value| index(value, name)))
            }
            Resolved::Value(value) => Resolved::Value(index(&value, name)),
        }
    }

    /// Tracked deep snapshot.
    pub fn into_value(self) -> Value {
        match self {
            Resolved::Store(store) => store.to_value(),
            Resolved::Value(value) => value,
        }
    }

    /// Text shown for an interpolation.
    pub fn to_text(self) -> String {
        display(&self.into_value())
    }
}

fn index(value: &Value, name: &str) -> Value {
    match value {
        Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
        Value::Array(items) if name == "length" => Value::from(items.len()),
        Value::Array(items) => name
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Render a value as text: `null` is empty and strings are unquoted.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// A dotted path from a root name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    root: String,
    segments: Vec<String>,
}

impl Path {
    /// Split `text` on dots. The first segment is the root name.
    pub fn parse(text: &str) -> Self {
        let mut parts = text.split('.').map(str::trim).map(str::to_string);
        let root = parts.next().unwrap_or_default();
        Self {
            root,
            segments: parts.collect(),
        }
    }

    /// The root name.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Segments after the root.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)?;
        for segment in &self.segments {
            write!(f, ".{segment}")?;
        }
        Ok(())
    }
}

/// A compiled expression.
#[derive(Clone)]
pub enum Expr {
    /// A constant.
    Literal(Value),
    /// A path through the scope.
    Path(Path),
    /// Arbitrary code over the scope.
    Compute(Compute),
}

impl Expr {
    /// A constant expression.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// A path expression such as `item.name`.
    pub fn path(text: &str) -> Self {
        Expr::Path(Path::parse(text))
    }

    /// A closure expression.
    pub fn compute<F>(f: F) -> Self
    where
        F: Fn(&Scope) -> Result<Value> + Send + Sync + 'static,
    {
        Expr::Compute(Arc::new(f))
    }

    /// Evaluate, keeping stores as stores.
    pub fn eval(&self, scope: &Scope) -> Result<Resolved> {
        match self {
            Expr::Literal(value) => Ok(Resolved::Value(value.clone())),
            Expr::Path(path) => Ok(path
                .segments
                .iter()
                .fold(scope.lookup(&path.root), |resolved, segment| resolved.field(segment))),
            Expr::Compute(f) => f(scope).map(Resolved::Value),
        }
    }

    /// Evaluate to a plain value.
    pub fn value(&self, scope: &Scope) -> Result<Value> {
        self.eval(scope).map(Resolved::into_value)
    }

    /// Evaluate to display text.
    pub fn text(&self, scope: &Scope) -> Result<String> {
        self.eval(scope).map(Resolved::to_text)
    }
}

impl From<&str> for Expr {
    fn from(path: &str) -> Self {
        Expr::path(path)
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Path(path) => write!(f, "{path}"),
            Expr::Compute(_) => f.write_str("<computed>"),
        }
    }
}

//! Keyed list reconciliation.
//!
//! # Algorithm
//!
//! 1. Evaluate the loop source (a tracked read for the enclosing reaction)
//!    and compute one key per entry: the key expression if there is one,
//!    otherwise the item identity for collections, otherwise the position.
//!    Duplicate keys fail before anything is touched.
//!
//! 2. Destroy items whose key is gone.
//!
//! 3. Walk the entries in order. A surviving item whose position, item or
//!    enclosing scope changed gets a new frame and re-runs its reaction, so
//!    index-dependent text follows the move. A new key builds a fresh item
//!    in a detached fragment.
//!
//! 4. Walk the items backwards from the anchor comment and move only the
//!    nodes that are not already directly before the cursor. Kept items keep
//!    their DOM nodes.
//!
//! Each item body is rendered by its own reaction, which re-runs on its own
//! when something only the body reads changes.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;

use super::{build_all, patch_all, LiveNode, Position};
use crate::component::{Component, WeakComponent};
use crate::dom::Node;
use crate::error::{Error, Result};
use crate::reactive::Reaction;
use crate::store::{ItemId, Observable};
use crate::template::{Local, LoopNode, Resolved, Scope, StaticNode};

/// Identity of one loop iteration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) enum LoopKey {
    Item(ItemId),
    Value(String),
    Index(usize),
}

impl fmt::Display for LoopKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopKey::Item(id) => write!(f, "{id}"),
            LoopKey::Value(value) => f.write_str(value),
            LoopKey::Index(index) => write!(f, "{index}"),
        }
    }
}

struct Entry {
    key: LoopKey,
    local: Local,
}

struct ItemFrame {
    outer: Scope,
    scope: Scope,
    index: usize,
    local: Local,
}

#[derive(Default)]
struct ItemBody {
    children: Vec<LiveNode>,
    built: bool,
}

impl ItemBody {
    fn render(&mut self, nodes: &[StaticNode], scope: &Scope, owner: &Component) -> Result<()> {
        if self.built {
            return patch_all(&mut self.children, scope, owner);
        }
        let staging = Node::fragment();
        self.children = build_all(nodes, scope, owner, &Position::append(&staging))?;
        self.built = true;
        Ok(())
    }
}

struct LoopItem {
    frame: Arc<Mutex<ItemFrame>>,
    body: Arc<Mutex<ItemBody>>,
    reaction: Reaction,
}

impl LoopItem {
    fn create(
        nodes: Arc<[StaticNode]>,
        outer: &Scope,
        scope: Scope,
        index: usize,
        local: Local,
        owner: &Component,
    ) -> Result<Self> {
        let frame = Arc::new(Mutex::new(ItemFrame {
            outer: outer.clone(),
            scope,
            index,
            local,
        }));
        let body = Arc::new(Mutex::new(ItemBody::default()));
        let reaction = Reaction::labelled(
            format!("{} item", owner.id()),
            render_item(owner.downgrade(), frame.clone(), body.clone(), nodes),
        );

        let item = Self { frame, body, reaction };
        match item.reaction.run() {
            Ok(()) => Ok(item),
            Err(error) => {
                item.destroy(owner);
                Err(error)
            }
        }
    }

    /// Point the item at a new frame if anything it was rendered with
    /// changed, and re-render it.
    fn rebind(&self, outer: &Scope, scope: Scope, index: usize, local: Local) -> Result<()> {
        let changed = {
            let mut frame = self.frame.lock();
            let changed =
                frame.index != index || !same_local(&frame.local, &local) || !frame.outer.same(outer);
            if changed {
                *frame = ItemFrame {
                    outer: outer.clone(),
                    scope,
                    index,
                    local,
                };
            }
            changed
        };
        if changed {
            self.reaction.run()
        } else {
            Ok(())
        }
    }

    fn dom_nodes(&self, out: &mut Vec<Node>) {
        for child in &self.body.lock().children {
            child.dom_nodes(out);
        }
    }

    fn destroy(self, owner: &Component) {
        self.reaction.destroy();
        let children = std::mem::take(&mut self.body.lock().children);
        for child in children {
            child.destroy(owner);
        }
    }
}

fn render_item(
    owner: WeakComponent,
    frame: Arc<Mutex<ItemFrame>>,
    body: Arc<Mutex<ItemBody>>,
    nodes: Arc<[StaticNode]>,
) -> impl Fn() -> Result<()> + Send + Sync + 'static {
    move || {
        let Some(owner) = owner.upgrade() else {
            return Ok(());
        };
        if owner.is_destroyed() {
            return Ok(());
        }
        let scope = frame.lock().scope.clone();

        let outermost = owner.begin_render();
        let result = body.lock().render(&nodes, &scope, &owner);
        owner.end_render();

        if outermost && result.is_ok() {
            owner.refresh_bindings();
        }
        result
    }
}

/// A rendered loop directive.
pub(super) struct LoopBlock {
    anchor: Node,
    body: Arc<[StaticNode]>,
    items: IndexMap<LoopKey, LoopItem>,
}

impl LoopBlock {
    pub(super) fn build(each: &LoopNode, scope: &Scope, owner: &Component, at: &Position) -> Result<Self> {
        let anchor = Node::comment("");
        at.insert(&anchor);

        let mut block = Self {
            anchor,
            body: each.body.clone().into(),
            items: IndexMap::new(),
        };
        if let Err(error) = block.reconcile(each, scope, owner) {
            block.destroy(owner);
            return Err(error);
        }
        Ok(block)
    }

    pub(super) fn reconcile(&mut self, each: &LoopNode, scope: &Scope, owner: &Component) -> Result<()> {
        let entries = entries(each, scope)?;

        let mut previous = std::mem::take(&mut self.items);
        let gone: Vec<LoopKey> = {
            let wanted: HashSet<&LoopKey> = entries.iter().map(|entry| &entry.key).collect();
            previous.keys().filter(|key| !wanted.contains(key)).cloned().collect()
        };
        for key in gone {
            if let Some(item) = previous.swap_remove(&key) {
                item.destroy(owner);
            }
        }

        let mut next = IndexMap::with_capacity(entries.len());
        let mut outcome = Ok(());
        for (index, entry) in entries.into_iter().enumerate() {
            let item_scope = item_scope(each, scope, &entry.local, index);
            let result = match previous.swap_remove(&entry.key) {
                Some(item) => {
                    let result = item.rebind(scope, item_scope, index, entry.local);
                    next.insert(entry.key, item);
                    result
                }
                None => LoopItem::create(self.body.clone(), scope, item_scope, index, entry.local, owner)
                    .map(|item| {
                        next.insert(entry.key, item);
                    }),
            };
            if let Err(error) = result {
                outcome = Err(error);
                break;
            }
        }

        next.extend(previous);
        self.items = next;
        self.place();
        outcome
    }

    /// Move item nodes into document order in front of the anchor.
    fn place(&self) {
        let Some(parent) = self.anchor.parent() else {
            return;
        };
        let mut cursor = self.anchor.clone();
        let mut nodes = Vec::new();
        for item in self.items.values().rev() {
            nodes.clear();
            item.dom_nodes(&mut nodes);
            for node in nodes.iter().rev() {
                if node.next_sibling().as_ref() != Some(&cursor) {
                    parent.insert_before(node, Some(&cursor));
                }
                cursor = node.clone();
            }
        }
    }

    /// Visit the live children of every item in order.
    pub(super) fn for_each_child(&self, mut f: impl FnMut(&LiveNode)) {
        for item in self.items.values() {
            for child in &item.body.lock().children {
                f(child);
            }
        }
    }

    pub(super) fn dom_nodes(&self, out: &mut Vec<Node>) {
        for item in self.items.values() {
            item.dom_nodes(out);
        }
        out.push(self.anchor.clone());
    }

    pub(super) fn destroy(self, owner: &Component) {
        for (_, item) in self.items {
            item.destroy(owner);
        }
        self.anchor.detach();
    }
}

fn item_scope(each: &LoopNode, outer: &Scope, local: &Local, index: usize) -> Scope {
    let scope = outer.with_local(each.item.clone(), local.clone());
    match &each.index {
        Some(name) => scope.with_local(name.clone(), Local::Value(Value::from(index))),
        None => scope,
    }
}

fn same_local(a: &Local, b: &Local) -> bool {
    match (a, b) {
        (Local::Store(a), Local::Store(b)) => a.same(b),
        (Local::Value(a), Local::Value(b)) => a == b,
        _ => false,
    }
}

/// Evaluate the loop source into keyed entries.
fn entries(each: &LoopNode, scope: &Scope) -> Result<Vec<Entry>> {
    let mut entries: Vec<Entry> = match each.source.eval(scope)? {
        Resolved::Store(Observable::Collection(collection)) => collection
            .items()
            .into_iter()
            .map(|item| Entry {
                key: LoopKey::Item(item.id()),
                local: Local::Store(item.value().clone()),
            })
            .collect(),
        Resolved::Store(Observable::Scalar(scalar)) => positional(scalar.get(), each)?,
        Resolved::Store(Observable::Record(_)) => {
            return Err(Error::Evaluation(format!(
                "loop source `{}` is a record, not a list",
                each.source
            )))
        }
        Resolved::Value(value) => positional(value, each)?,
    };

    if let Some(key) = &each.key {
        for (index, entry) in entries.iter_mut().enumerate() {
            let value = key.value(&item_scope(each, scope, &entry.local, index))?;
            entry.key = LoopKey::Value(value.to_string());
        }
    }

    let mut seen = HashSet::with_capacity(entries.len());
    for entry in &entries {
        if !seen.insert(&entry.key) {
            return Err(Error::DuplicateKey {
                key: entry.key.to_string(),
                source_expr: each.source.to_string(),
            });
        }
    }
    Ok(entries)
}

fn positional(value: Value, each: &LoopNode) -> Result<Vec<Entry>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(values) => Ok(values
            .into_iter()
            .enumerate()
            .map(|(index, value)| Entry {
                key: LoopKey::Index(index),
                local: Local::Value(value),
            })
            .collect()),
        other => Err(Error::Evaluation(format!(
            "loop source `{}` is not a list: {other}",
            each.source
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::observable;
    use crate::template::{each, interp, NodeKind};
    use serde_json::json;

    fn loop_node(node: StaticNode) -> LoopNode {
        match node.kind() {
            NodeKind::Loop(each) => each.clone(),
            _ => panic!("expected a loop"),
        }
    }

    #[test]
    fn collections_key_by_identity() {
        let scope = Scope::new(observable(json!({ "list": ["a", "b"] })));
        let each = loop_node(each("list", "item").child(interp("item")).build());

        let keys: Vec<LoopKey> = entries(&each, &scope).unwrap().into_iter().map(|e| e.key).collect();
        assert!(keys.iter().all(|key| matches!(key, LoopKey::Item(_))));
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn plain_arrays_key_by_position() {
        let scope = Scope::new(observable(json!({})));
        let each = loop_node(each(Value::from(vec!["x", "y"]), "item").build());

        let keys: Vec<LoopKey> = entries(&each, &scope).unwrap().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec![LoopKey::Index(0), LoopKey::Index(1)]);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let scope = Scope::new(observable(json!({ "list": [{ "id": 1 }, { "id": 1 }] })));
        let each = loop_node(each("list", "item").key("item.id").build());

        match entries(&each, &scope) {
            Err(Error::DuplicateKey { key, source_expr }) => {
                assert_eq!(key, "1");
                assert_eq!(source_expr, "list");
            }
            other => panic!("expected a duplicate key error, got {:?}", other.map(|e| e.len())),
        }
    }

    #[test]
    fn missing_source_is_empty_and_records_are_rejected() {
        let scope = Scope::new(observable(json!({ "meta": { "a": 1 } })));
        assert!(entries(&loop_node(each("missing", "item").build()), &scope).unwrap().is_empty());
        assert!(matches!(
            entries(&loop_node(each("meta", "item").build()), &scope),
            Err(Error::Evaluation(_))
        ));
    }
}

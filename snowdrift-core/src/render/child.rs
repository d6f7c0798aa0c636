//! Child component placeholders.

use serde_json::{Map, Value};

use super::Position;
use crate::component::{registry, Component};
use crate::dom::Node;
use crate::error::Result;
use crate::template::{ComponentNode, Scope};

/// A child component grafted in front of an anchor comment.
pub(super) struct ComponentSlot {
    anchor: Node,
    child: Component,
    props: Value,
}

impl ComponentSlot {
    pub(super) fn build(
        placeholder: &ComponentNode,
        scope: &Scope,
        owner: &Component,
        at: &Position,
    ) -> Result<Self> {
        let props = props(placeholder, scope)?;
        let child = registry::create_component(&placeholder.tag, props.clone())?;
        if let Err(error) = child.render() {
            child.destroy();
            return Err(error);
        }

        for node in child.root_nodes() {
            at.insert(&node);
        }
        let anchor = Node::comment("");
        at.insert(&anchor);

        child.rehome_bindings();
        owner.adopt(&child);
        tracing::trace!(parent = %owner.id(), child = %child.id(), tag = %placeholder.tag, "child component mounted");
        Ok(Self { anchor, child, props })
    }

    /// Pass new props through to the child when they changed.
    pub(super) fn update(&mut self, placeholder: &ComponentNode, scope: &Scope) -> Result<()> {
        let props = props(placeholder, scope)?;
        if props != self.props {
            self.child.set(props.clone())?;
            self.props = props;
        }
        Ok(())
    }

    pub(super) fn child(&self) -> &Component {
        &self.child
    }

    pub(super) fn dom_nodes(&self, out: &mut Vec<Node>) {
        out.extend(self.child.root_nodes());
        out.push(self.anchor.clone());
    }

    pub(super) fn destroy(self, owner: &Component) {
        owner.disown(self.child.id());
        self.child.destroy();
        self.anchor.detach();
    }
}

fn props(placeholder: &ComponentNode, scope: &Scope) -> Result<Value> {
    let mut map = Map::new();
    for (name, expr) in &placeholder.props {
        map.insert(name.clone(), expr.value(scope)?);
    }
    Ok(Value::Object(map))
}

//! Renderer
//!
//! Turns static nodes into live nodes that own real DOM, and patches them in
//! place on later passes.
//!
//! # Live tree
//!
//! Every [`StaticNode`] rendered for a component gets a [`LiveNode`] holding
//! the DOM it produced:
//!
//! - Text is materialized once and never revisited.
//! - Interpolations remember their last text and only write the DOM when it
//!   changes.
//! - Elements keep their bound attributes and delegated event slots.
//! - Loops keep one item per key, each with its own reaction, so writing an
//!   item's data re-renders that item alone (see `list`).
//! - Component placeholders own a child component whose root nodes are
//!   grafted before an anchor comment.
//!
//! Reads made while building or patching are tracked by whichever reaction is
//! running: the component's render reaction at the top level, an item's
//! reaction inside a loop body.

mod child;
mod delegate;
mod list;
mod refs;

use std::collections::HashMap;

use serde_json::Value;

use crate::component::Component;
use crate::dom::Node;
use crate::error::Result;
use crate::template::{display, Binding, ElementNode, NodeKind, Scope, StaticNode};

use child::ComponentSlot;
pub(crate) use delegate::{Delegation, SlotId};
use list::LoopBlock;
pub use refs::Ref;
pub(crate) use refs::collect_refs;

/// Where new DOM goes.
#[derive(Debug, Clone)]
pub(crate) struct Position {
    parent: Node,
    before: Option<Node>,
}

impl Position {
    /// At the end of `parent`.
    pub(crate) fn append(parent: &Node) -> Self {
        Self {
            parent: parent.clone(),
            before: None,
        }
    }

    fn insert(&self, node: &Node) {
        self.parent.insert_before(node, self.before.as_ref());
    }
}

/// The runtime counterpart of a static node.
pub(crate) struct LiveNode {
    node: StaticNode,
    kind: LiveKind,
}

enum LiveKind {
    Text(Node),
    Interpolation { dom: Node, last: String },
    Element(LiveElement),
    Loop(LoopBlock),
    Component(ComponentSlot),
}

struct LiveElement {
    dom: Node,
    children: Vec<LiveNode>,
    attrs: HashMap<String, Option<String>>,
    slots: Vec<SlotId>,
}

/// Build `node` and insert its DOM at `at`.
pub(crate) fn build(node: &StaticNode, scope: &Scope, owner: &Component, at: &Position) -> Result<LiveNode> {
    let kind = match node.kind() {
        NodeKind::Text(content) => {
            let dom = Node::text(content);
            at.insert(&dom);
            LiveKind::Text(dom)
        }
        NodeKind::Interpolation(expr) => {
            let last = expr.text(scope)?;
            let dom = Node::text(&last);
            at.insert(&dom);
            LiveKind::Interpolation { dom, last }
        }
        NodeKind::Element(element) => LiveKind::Element(LiveElement::build(element, scope, owner, at)?),
        NodeKind::Loop(each) => LiveKind::Loop(LoopBlock::build(each, scope, owner, at)?),
        NodeKind::Component(placeholder) => {
            LiveKind::Component(ComponentSlot::build(placeholder, scope, owner, at)?)
        }
    };
    Ok(LiveNode {
        node: node.clone(),
        kind,
    })
}

/// Build siblings in order. On failure, whatever was already built is torn
/// down again so no half-built DOM stays attached.
pub(crate) fn build_all(
    nodes: &[StaticNode],
    scope: &Scope,
    owner: &Component,
    at: &Position,
) -> Result<Vec<LiveNode>> {
    let mut built = Vec::with_capacity(nodes.len());
    for node in nodes {
        match build(node, scope, owner, at) {
            Ok(live) => built.push(live),
            Err(error) => {
                for live in built {
                    live.destroy(owner);
                }
                return Err(error);
            }
        }
    }
    Ok(built)
}

/// Patch siblings in order.
pub(crate) fn patch_all(live: &mut [LiveNode], scope: &Scope, owner: &Component) -> Result<()> {
    for node in live {
        node.patch(scope, owner)?;
    }
    Ok(())
}

/// Every DOM node owned by `live`, in document order.
pub(crate) fn dom_nodes(live: &[LiveNode]) -> Vec<Node> {
    let mut out = Vec::new();
    for node in live {
        node.dom_nodes(&mut out);
    }
    out
}

/// The node that carries delegated listeners: the lone root element, or
/// else the parent the root nodes share.
pub(crate) fn delegation_target(live: &[LiveNode]) -> Option<Node> {
    if let [only] = live {
        if let LiveKind::Element(element) = &only.kind {
            return Some(element.dom.clone());
        }
    }
    dom_nodes(live).iter().find_map(Node::parent)
}

impl LiveNode {
    /// Bring the DOM up to date with `scope`.
    pub(crate) fn patch(&mut self, scope: &Scope, owner: &Component) -> Result<()> {
        match (&mut self.kind, self.node.kind()) {
            (LiveKind::Interpolation { dom, last }, NodeKind::Interpolation(expr)) => {
                let text = expr.text(scope)?;
                if *last != text {
                    dom.set_text(&text);
                    *last = text;
                }
                Ok(())
            }
            (LiveKind::Element(live), NodeKind::Element(element)) => live.patch(element, scope, owner),
            (LiveKind::Loop(block), NodeKind::Loop(each)) => block.reconcile(each, scope, owner),
            (LiveKind::Component(slot), NodeKind::Component(placeholder)) => slot.update(placeholder, scope),
            _ => Ok(()),
        }
    }

    /// Tear down reactions, delegated slots and child components, and
    /// detach the DOM.
    pub(crate) fn destroy(self, owner: &Component) {
        match self.kind {
            LiveKind::Text(dom) | LiveKind::Interpolation { dom, .. } => dom.detach(),
            LiveKind::Element(live) => {
                owner.delegation().release_all(&live.slots);
                for child in live.children {
                    child.destroy(owner);
                }
                live.dom.detach();
            }
            LiveKind::Loop(block) => block.destroy(owner),
            LiveKind::Component(slot) => slot.destroy(owner),
        }
    }

    pub(crate) fn dom_nodes(&self, out: &mut Vec<Node>) {
        match &self.kind {
            LiveKind::Text(dom) | LiveKind::Interpolation { dom, .. } => out.push(dom.clone()),
            LiveKind::Element(live) => out.push(live.dom.clone()),
            LiveKind::Loop(block) => block.dom_nodes(out),
            LiveKind::Component(slot) => slot.dom_nodes(out),
        }
    }
}

impl LiveElement {
    fn build(element: &ElementNode, scope: &Scope, owner: &Component, at: &Position) -> Result<Self> {
        let dom = Node::element(&element.tag);
        for (name, value) in &element.attrs {
            dom.set_attribute(name, value);
        }

        let mut attrs = HashMap::new();
        for binding in &element.bindings {
            if let Binding::Attr { name, expr } = binding {
                let value = attribute_text(&expr.value(scope)?);
                apply_attribute(&dom, name, value.as_deref());
                attrs.insert(name.clone(), value);
            }
        }

        let slots = {
            let mut delegation = owner.delegation();
            element
                .bindings
                .iter()
                .filter_map(|binding| match binding {
                    Binding::Event { event, handler } => {
                        let slot = delegation.bind(event, handler.clone(), scope.clone());
                        dom.set_attribute(&delegation.attribute(event), &slot.to_string());
                        Some(slot)
                    }
                    _ => None,
                })
                .collect::<Vec<_>>()
        };

        let children = match build_all(&element.children, scope, owner, &Position::append(&dom)) {
            Ok(children) => children,
            Err(error) => {
                owner.delegation().release_all(&slots);
                return Err(error);
            }
        };
        at.insert(&dom);

        Ok(Self {
            dom,
            children,
            attrs,
            slots,
        })
    }

    fn patch(&mut self, element: &ElementNode, scope: &Scope, owner: &Component) -> Result<()> {
        for binding in &element.bindings {
            if let Binding::Attr { name, expr } = binding {
                let value = attribute_text(&expr.value(scope)?);
                if self.attrs.get(name) != Some(&value) {
                    apply_attribute(&self.dom, name, value.as_deref());
                    self.attrs.insert(name.clone(), value);
                }
            }
        }

        if !self.slots.is_empty() {
            let mut delegation = owner.delegation();
            let handlers = element.bindings.iter().filter_map(|binding| match binding {
                Binding::Event { handler, .. } => Some(handler),
                _ => None,
            });
            for (slot, handler) in self.slots.iter().zip(handlers) {
                delegation.rebind(*slot, handler.clone(), scope.clone());
            }
        }

        patch_all(&mut self.children, scope, owner)
    }
}

/// `null` and `false` remove the attribute, `true` sets it empty.
fn attribute_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some(String::new()),
        other => Some(display(other)),
    }
}

fn apply_attribute(dom: &Node, name: &str, value: Option<&str>) {
    match value {
        Some(value) => dom.set_attribute(name, value),
        None => dom.remove_attribute(name),
    }
}

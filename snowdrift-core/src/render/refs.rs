//! Named refs.

use std::collections::HashMap;

use super::{LiveKind, LiveNode};
use crate::component::Component;
use crate::dom::Node;
use crate::template::{Binding, NodeKind};

/// What a ref name resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum Ref {
    /// An element.
    Node(Node),
    /// A child component.
    Component(Component),
    /// Every match of a ref declared inside a loop, in document order.
    Many(Vec<Ref>),
}

impl Ref {
    /// The element, for a single element ref.
    pub fn node(&self) -> Option<&Node> {
        match self {
            Ref::Node(node) => Some(node),
            _ => None,
        }
    }

    /// The component, for a single component ref.
    pub fn component(&self) -> Option<&Component> {
        match self {
            Ref::Component(component) => Some(component),
            _ => None,
        }
    }

    /// Every target as a list. A single ref is a list of one.
    pub fn all(&self) -> Vec<Ref> {
        match self {
            Ref::Many(list) => list.clone(),
            single => vec![single.clone()],
        }
    }

    /// Number of targets.
    pub fn len(&self) -> usize {
        match self {
            Ref::Many(list) => list.len(),
            _ => 1,
        }
    }

    /// Whether a loop ref matched nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Walk the live tree and gather every ref.
pub(crate) fn collect_refs(live: &[LiveNode]) -> HashMap<String, Ref> {
    let mut refs = HashMap::new();
    for node in live {
        walk(node, false, &mut refs);
    }
    refs
}

fn walk(live: &LiveNode, in_loop: bool, refs: &mut HashMap<String, Ref>) {
    match (&live.kind, live.node.kind()) {
        (LiveKind::Element(element), NodeKind::Element(node)) => {
            for binding in &node.bindings {
                if let Binding::Ref(name) = binding {
                    publish(refs, name, Ref::Node(element.dom.clone()), in_loop);
                }
            }
            for child in &element.children {
                walk(child, in_loop, refs);
            }
        }
        (LiveKind::Loop(block), _) => block.for_each_child(|child| walk(child, true, refs)),
        (LiveKind::Component(slot), NodeKind::Component(node)) => {
            if let Some(name) = &node.ref_name {
                publish(refs, name, Ref::Component(slot.child().clone()), in_loop);
            }
        }
        _ => {}
    }
}

fn publish(refs: &mut HashMap<String, Ref>, name: &str, target: Ref, in_loop: bool) {
    if !in_loop {
        refs.insert(name.to_string(), target);
        return;
    }
    let entry = refs.entry(name.to_string()).or_insert_with(|| Ref::Many(Vec::new()));
    match entry {
        Ref::Many(list) => list.push(target),
        _ => *entry = Ref::Many(vec![target]),
    }
}

//! Host DOM nodes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::event::{Event, Listener, ListenerId};

/// Unique identifier for a DOM node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// What kind of node this is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// An element with a tag name.
    Element(String),
    /// A text node.
    Text,
    /// A comment, used as a position marker.
    Comment,
    /// A parentless container for nodes not yet in a document.
    Fragment,
}

#[derive(Default)]
struct NodeData {
    parent: Weak<NodeInner>,
    children: Vec<Node>,
    attributes: IndexMap<String, String>,
    text: String,
    text_writes: u64,
    listeners: Vec<(ListenerId, String, Listener)>,
}

struct NodeInner {
    id: NodeId,
    kind: NodeKind,
    data: RwLock<NodeData>,
}

/// A handle to a node. Clones share the node; equality is identity.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    fn with_kind(kind: NodeKind, text: String) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                id: NodeId::next(),
                kind,
                data: RwLock::new(NodeData {
                    text,
                    ..NodeData::default()
                }),
            }),
        }
    }

    /// Create an element.
    pub fn element(tag: &str) -> Self {
        Self::with_kind(NodeKind::Element(tag.to_string()), String::new())
    }

    /// Create a text node.
    pub fn text(text: &str) -> Self {
        Self::with_kind(NodeKind::Text, text.to_string())
    }

    /// Create a comment.
    pub fn comment(text: &str) -> Self {
        Self::with_kind(NodeKind::Comment, text.to_string())
    }

    /// Create an empty fragment.
    pub fn fragment() -> Self {
        Self::with_kind(NodeKind::Fragment, String::new())
    }

    /// The node's unique id.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// The node's kind.
    pub fn kind(&self) -> &NodeKind {
        &self.inner.kind
    }

    /// The tag name, for elements.
    pub fn tag(&self) -> Option<&str> {
        match &self.inner.kind {
            NodeKind::Element(tag) => Some(tag),
            _ => None,
        }
    }

    /// Whether this is an element.
    pub fn is_element(&self) -> bool {
        matches!(self.inner.kind, NodeKind::Element(_))
    }

    /// The parent node, if attached.
    pub fn parent(&self) -> Option<Node> {
        self.inner.data.read().parent.upgrade().map(|inner| Node { inner })
    }

    /// A snapshot of the children.
    pub fn children(&self) -> Vec<Node> {
        self.inner.data.read().children.clone()
    }

    /// Element children only.
    pub fn element_children(&self) -> Vec<Node> {
        self.children().into_iter().filter(Node::is_element).collect()
    }

    /// The first child.
    pub fn first_child(&self) -> Option<Node> {
        self.inner.data.read().children.first().cloned()
    }

    /// The sibling after this node.
    pub fn next_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        let data = parent.inner.data.read();
        let index = data.children.iter().position(|child| child == self)?;
        data.children.get(index + 1).cloned()
    }

    /// Append `child`, moving it out of its current parent first.
    pub fn append_child(&self, child: &Node) {
        self.insert_before(child, None);
    }

    /// Insert `child` before `reference`, or at the end when `reference` is
    /// `None` or not a child of this node. A child that is already attached
    /// somewhere is moved.
    pub fn insert_before(&self, child: &Node, reference: Option<&Node>) {
        if child == self || reference == Some(child) {
            return;
        }
        child.detach();

        {
            let mut data = self.inner.data.write();
            let index = reference
                .and_then(|reference| data.children.iter().position(|c| c == reference))
                .unwrap_or(data.children.len());
            data.children.insert(index, child.clone());
        }
        child.inner.data.write().parent = Arc::downgrade(&self.inner);
    }

    /// Remove `child` if it is a child of this node.
    pub fn remove_child(&self, child: &Node) -> bool {
        let removed = {
            let mut data = self.inner.data.write();
            let before = data.children.len();
            data.children.retain(|c| c != child);
            before != data.children.len()
        };
        if removed {
            child.inner.data.write().parent = Weak::new();
        }
        removed
    }

    /// Detach this node from its parent.
    pub fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent.remove_child(self);
        }
    }

    /// The text of a text or comment node.
    pub fn text_value(&self) -> String {
        self.inner.data.read().text.clone()
    }

    /// Replace the text of a text node.
    pub fn set_text(&self, text: &str) {
        let mut data = self.inner.data.write();
        data.text = text.to_string();
        data.text_writes += 1;
    }

    /// How many times [`set_text`](Self::set_text) was called.
    pub fn write_count(&self) -> u64 {
        self.inner.data.read().text_writes
    }

    /// Concatenated text of this node and its descendants.
    pub fn text_content(&self) -> String {
        match self.inner.kind {
            NodeKind::Text => self.text_value(),
            NodeKind::Comment => String::new(),
            _ => self.children().iter().map(Node::text_content).collect(),
        }
    }

    /// Read an attribute.
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner.data.read().attributes.get(name).cloned()
    }

    /// Write an attribute.
    pub fn set_attribute(&self, name: &str, value: &str) {
        self.inner
            .data
            .write()
            .attributes
            .insert(name.to_string(), value.to_string());
    }

    /// Remove an attribute.
    pub fn remove_attribute(&self, name: &str) {
        self.inner.data.write().attributes.shift_remove(name);
    }

    /// Whether the attribute is present.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.inner.data.read().attributes.contains_key(name)
    }

    /// Register a listener for `event`.
    pub fn add_event_listener(&self, event: &str, listener: Listener) -> ListenerId {
        let id = ListenerId::next();
        self.inner
            .data
            .write()
            .listeners
            .push((id, event.to_string(), listener));
        id
    }

    /// Remove a listener by id.
    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        let mut data = self.inner.data.write();
        let before = data.listeners.len();
        data.listeners.retain(|(listener_id, _, _)| *listener_id != id);
        before != data.listeners.len()
    }

    /// Listeners registered for `event` on this node.
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner
            .data
            .read()
            .listeners
            .iter()
            .filter(|(_, name, _)| name == event)
            .count()
    }

    /// Dispatch an event of `kind` at this node, bubbling up to the root.
    pub fn dispatch(&self, kind: &str) -> Event {
        let mut event = Event::new(kind, self.clone());
        let mut current = Some(self.clone());
        while let Some(node) = current {
            let listeners: Vec<Listener> = node
                .inner
                .data
                .read()
                .listeners
                .iter()
                .filter(|(_, name, _)| name == kind)
                .map(|(_, _, listener)| listener.clone())
                .collect();
            event.set_current_target(node.clone());
            for listener in listeners {
                listener(&mut event);
            }
            if event.propagation_stopped() {
                break;
            }
            current = node.parent();
        }
        event
    }

    /// Serialize the children.
    pub fn inner_html(&self) -> String {
        self.children().iter().map(Node::outer_html).collect()
    }

    /// Serialize this node.
    pub fn outer_html(&self) -> String {
        match &self.inner.kind {
            NodeKind::Text => self.text_value(),
            NodeKind::Comment => format!("<!--{}-->", self.text_value()),
            NodeKind::Fragment => self.inner_html(),
            NodeKind::Element(tag) => {
                let attributes: String = self
                    .inner
                    .data
                    .read()
                    .attributes
                    .iter()
                    .map(|(name, value)| format!(" {name}=\"{value}\""))
                    .collect();
                format!("<{tag}{attributes}>{}</{tag}>", self.inner_html())
            }
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.kind {
            NodeKind::Element(tag) => write!(f, "<{tag}#{}>", self.inner.id.0),
            NodeKind::Text => write!(f, "#text({:?})", self.text_value()),
            NodeKind::Comment => write!(f, "<!--{}-->", self.text_value()),
            NodeKind::Fragment => write!(f, "#fragment"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn insert_before_moves_existing_children() {
        let list = Node::element("ul");
        let (a, b, c) = (Node::element("a"), Node::element("b"), Node::element("c"));
        list.append_child(&a);
        list.append_child(&b);
        list.append_child(&c);

        list.insert_before(&c, Some(&a));
        assert_eq!(list.children(), vec![c.clone(), a.clone(), b.clone()]);
        assert_eq!(a.next_sibling(), Some(b));
        assert_eq!(c.parent(), Some(list));
    }

    #[test]
    fn moving_between_parents_detaches() {
        let (first, second, child) = (Node::fragment(), Node::element("div"), Node::text("x"));
        first.append_child(&child);
        second.append_child(&child);

        assert!(first.children().is_empty());
        assert_eq!(second.inner_html(), "x");
    }

    #[test]
    fn html_serialization() {
        let div = Node::element("div");
        div.set_attribute("class", "a");
        div.append_child(&Node::text("hi"));
        div.append_child(&Node::comment("m"));
        assert_eq!(div.outer_html(), r#"<div class="a">hi<!--m--></div>"#);
        assert_eq!(div.text_content(), "hi");
    }

    #[test]
    fn dispatch_bubbles_and_stops() {
        let outer = Node::element("div");
        let inner = Node::element("span");
        outer.append_child(&inner);

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        outer.add_event_listener(
            "click",
            Arc::new(move |_: &mut Event| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        inner.dispatch("click");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        inner.add_event_listener("click", Arc::new(|event: &mut Event| event.stop_propagation()));
        inner.dispatch("click");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(outer.listener_count("click"), 1);
    }
}

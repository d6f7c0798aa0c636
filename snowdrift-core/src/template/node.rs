//! Static node trees and their builders.
//!
//! # Example
//!
//! ```rust,ignore
//! let template = Template::new(vec![
//!     element("ul")
//!         .child(
//!             each("list", "item")
//!                 .key("item.id")
//!                 .child(element("li").on("click", |cx| cx.set(json!({ "picked": 1 }))).child(interp("item.name"))),
//!         )
//!         .into(),
//! ]);
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::expr::Expr;
use super::scope::Scope;
use crate::component::Component;
use crate::dom::Event;
use crate::error::Result;
use crate::reactive::untracked;

/// An event handler bound in a template.
pub type Handler = Arc<dyn Fn(&mut EventContext<'_>) -> Result<()> + Send + Sync>;

/// What a handler sees when its event fires.
pub struct EventContext<'a> {
    event: &'a mut Event,
    scope: &'a Scope,
    component: &'a Component,
}

impl<'a> EventContext<'a> {
    pub(crate) fn new(event: &'a mut Event, scope: &'a Scope, component: &'a Component) -> Self {
        Self {
            event,
            scope,
            component,
        }
    }

    /// The DOM event.
    pub fn event(&mut self) -> &mut Event {
        self.event
    }

    /// The scope the bound element was rendered with, loop locals included.
    pub fn scope(&self) -> &Scope {
        self.scope
    }

    /// The component that owns the binding.
    pub fn component(&self) -> &Component {
        self.component
    }

    /// Evaluate `expr` in the handler's scope without tracking.
    pub fn value(&self, expr: impl Into<Expr>) -> Result<Value> {
        let expr = expr.into();
        untracked(|| expr.value(self.scope))
    }

    /// Forward a patch to the owning component's state.
    pub fn set(&self, patch: Value) -> Result<()> {
        self.component.set(patch)
    }
}

/// A binding attached to an element.
#[derive(Clone)]
pub enum Binding {
    /// Publish the element under a ref name.
    Ref(String),
    /// Handle an event through the component's delegated listener.
    Event {
        /// Event type, e.g. `click`.
        event: String,
        /// The handler.
        handler: Handler,
    },
    /// Keep an attribute in sync with an expression. `null` and `false`
    /// remove the attribute.
    Attr {
        /// Attribute name.
        name: String,
        /// Value expression.
        expr: Expr,
    },
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Ref(name) => write!(f, "ref={name}"),
            Binding::Event { event, .. } => write!(f, "on{event}"),
            Binding::Attr { name, expr } => write!(f, "{name}={{{expr}}}"),
        }
    }
}

/// An element with static attributes, bindings and children.
#[derive(Debug, Clone)]
pub struct ElementNode {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub bindings: Vec<Binding>,
    pub children: Vec<StaticNode>,
}

/// A loop directive.
#[derive(Debug, Clone)]
pub struct LoopNode {
    pub source: Expr,
    pub item: String,
    pub index: Option<String>,
    pub key: Option<Expr>,
    pub body: Vec<StaticNode>,
}

/// A child component placeholder.
#[derive(Debug, Clone)]
pub struct ComponentNode {
    pub tag: String,
    pub props: Vec<(String, Expr)>,
    pub ref_name: Option<String>,
}

/// The kinds of static node.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Literal text.
    Text(String),
    /// Text computed from an expression.
    Interpolation(Expr),
    /// An element.
    Element(ElementNode),
    /// A loop directive.
    Loop(LoopNode),
    /// A child component.
    Component(ComponentNode),
}

/// An immutable template node, cheap to clone and shared between every
/// component rendered from it.
#[derive(Clone)]
pub struct StaticNode(Arc<NodeKind>);

impl StaticNode {
    /// Wrap a node kind.
    pub fn new(kind: NodeKind) -> Self {
        Self(Arc::new(kind))
    }

    /// The node's kind.
    pub fn kind(&self) -> &NodeKind {
        &self.0
    }
}

impl fmt::Debug for StaticNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The static node tree of a component.
#[derive(Debug, Clone)]
pub struct Template {
    roots: Arc<[StaticNode]>,
}

impl Template {
    /// A template with these root nodes.
    pub fn new(roots: Vec<StaticNode>) -> Self {
        Self { roots: roots.into() }
    }

    /// The root nodes.
    pub fn roots(&self) -> &[StaticNode] {
        &self.roots
    }
}

impl From<StaticNode> for Template {
    fn from(root: StaticNode) -> Self {
        Template::new(vec![root])
    }
}

impl From<Vec<StaticNode>> for Template {
    fn from(roots: Vec<StaticNode>) -> Self {
        Template::new(roots)
    }
}

impl From<ElementBuilder> for Template {
    fn from(builder: ElementBuilder) -> Self {
        builder.build().into()
    }
}

impl From<LoopBuilder> for Template {
    fn from(builder: LoopBuilder) -> Self {
        builder.build().into()
    }
}

impl From<ComponentBuilder> for Template {
    fn from(builder: ComponentBuilder) -> Self {
        builder.build().into()
    }
}

/// Literal text.
pub fn text(content: &str) -> StaticNode {
    StaticNode::new(NodeKind::Text(content.to_string()))
}

/// An interpolation.
pub fn interp(expr: impl Into<Expr>) -> StaticNode {
    StaticNode::new(NodeKind::Interpolation(expr.into()))
}

/// Start an element.
pub fn element(tag: &str) -> ElementBuilder {
    ElementBuilder(ElementNode {
        tag: tag.to_string(),
        attrs: Vec::new(),
        bindings: Vec::new(),
        children: Vec::new(),
    })
}

/// Start a loop over `source`, binding each item to `item`.
pub fn each(source: impl Into<Expr>, item: &str) -> LoopBuilder {
    LoopBuilder(LoopNode {
        source: source.into(),
        item: item.to_string(),
        index: None,
        key: None,
        body: Vec::new(),
    })
}

/// Start a child component placeholder.
pub fn component(tag: &str) -> ComponentBuilder {
    ComponentBuilder(ComponentNode {
        tag: tag.to_string(),
        props: Vec::new(),
        ref_name: None,
    })
}

/// Builder for [`ElementNode`].
#[derive(Debug, Clone)]
pub struct ElementBuilder(ElementNode);

impl ElementBuilder {
    /// A static attribute.
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.0.attrs.push((name.to_string(), value.to_string()));
        self
    }

    /// An attribute bound to an expression.
    pub fn bind(mut self, name: &str, expr: impl Into<Expr>) -> Self {
        self.0.bindings.push(Binding::Attr {
            name: name.to_string(),
            expr: expr.into(),
        });
        self
    }

    /// An event handler.
    pub fn on<F>(mut self, event: &str, handler: F) -> Self
    where
        F: Fn(&mut EventContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.0.bindings.push(Binding::Event {
            event: event.to_string(),
            handler: Arc::new(handler),
        });
        self
    }

    /// A ref name.
    pub fn ref_name(mut self, name: &str) -> Self {
        self.0.bindings.push(Binding::Ref(name.to_string()));
        self
    }

    /// Append a child.
    pub fn child(mut self, child: impl Into<StaticNode>) -> Self {
        self.0.children.push(child.into());
        self
    }

    /// Finish.
    pub fn build(self) -> StaticNode {
        StaticNode::new(NodeKind::Element(self.0))
    }
}

/// Builder for [`LoopNode`].
#[derive(Debug, Clone)]
pub struct LoopBuilder(LoopNode);

impl LoopBuilder {
    /// Bind the position to `name`.
    pub fn index(mut self, name: &str) -> Self {
        self.0.index = Some(name.to_string());
        self
    }

    /// Key items by an expression instead of their identity.
    pub fn key(mut self, expr: impl Into<Expr>) -> Self {
        self.0.key = Some(expr.into());
        self
    }

    /// Append a body node.
    pub fn child(mut self, child: impl Into<StaticNode>) -> Self {
        self.0.body.push(child.into());
        self
    }

    /// Finish.
    pub fn build(self) -> StaticNode {
        StaticNode::new(NodeKind::Loop(self.0))
    }
}

/// Builder for [`ComponentNode`].
#[derive(Debug, Clone)]
pub struct ComponentBuilder(ComponentNode);

impl ComponentBuilder {
    /// Pass a prop.
    pub fn prop(mut self, name: &str, expr: impl Into<Expr>) -> Self {
        self.0.props.push((name.to_string(), expr.into()));
        self
    }

    /// Publish the child under a ref name.
    pub fn ref_name(mut self, name: &str) -> Self {
        self.0.ref_name = Some(name.to_string());
        self
    }

    /// Finish.
    pub fn build(self) -> StaticNode {
        StaticNode::new(NodeKind::Component(self.0))
    }
}

impl From<ElementBuilder> for StaticNode {
    fn from(builder: ElementBuilder) -> Self {
        builder.build()
    }
}

impl From<LoopBuilder> for StaticNode {
    fn from(builder: LoopBuilder) -> Self {
        builder.build()
    }
}

impl From<ComponentBuilder> for StaticNode {
    fn from(builder: ComponentBuilder) -> Self {
        builder.build()
    }
}

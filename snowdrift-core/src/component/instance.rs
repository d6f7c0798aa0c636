//! Component instances.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde_json::Value;

use crate::config::RuntimeConfig;
use crate::dom::Node;
use crate::error::Result;
use crate::reactive::{next_tick, Reaction};
use crate::render::{self, collect_refs, Delegation, LiveNode, Position, Ref};
use crate::store::{observable, Observable};
use crate::template::{Scope, Template};

type DestroyCallback = Box<dyn FnOnce(&Component) + Send>;

/// Unique identifier for a component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl ComponentId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component#{}", self.0)
    }
}

/// Where the component is in its render lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Created, first render not done yet.
    Pending,
    /// The last render succeeded.
    Rendered,
    /// The last render failed with this message.
    Failed(String),
}

enum Placement {
    AppendTo(Node),
    PrependTo(Node),
    Before(Node),
    After(Node),
    Remove,
}

pub(crate) struct ComponentInner {
    id: ComponentId,
    state: Observable,
    template: Template,
    host: Node,
    tree: Mutex<Option<Vec<LiveNode>>>,
    reaction: Reaction,
    refs: RwLock<HashMap<String, Ref>>,
    children: Mutex<IndexMap<ComponentId, Component>>,
    delegation: Mutex<Delegation>,
    status: RwLock<Status>,
    rendered_version: RwLock<Option<u64>>,
    render_depth: AtomicUsize,
    destroyed: AtomicBool,
    on_destroy: Mutex<Vec<DestroyCallback>>,
}

/// A state store paired with a template and the live DOM rendered from it.
///
/// Rendering is a reaction: whatever the render reads is tracked, and writing
/// any of it re-renders on the next flush. Loop items re-render on their own
/// when only their data changed.
///
/// # Example
///
/// ```rust,ignore
/// let counter = Component::new(
///     element("p").child(interp("count")).build(),
///     Scalar::new(json!({ "count": 0 })),
/// );
/// counter.render()?;
/// counter.append_to(&body);
///
/// counter.set(json!({ "count": 1 }))?;
/// tick().await?; // <p>1</p>
/// ```
#[derive(Clone)]
pub struct Component {
    inner: Arc<ComponentInner>,
}

/// A non-owning handle used by reactions and listeners.
#[derive(Clone)]
pub(crate) struct WeakComponent(Weak<ComponentInner>);

impl WeakComponent {
    pub(crate) fn upgrade(&self) -> Option<Component> {
        self.0.upgrade().map(|inner| Component { inner })
    }
}

impl Component {
    /// Create a component and schedule its first render.
    pub fn new(template: impl Into<Template>, state: impl Into<Observable>) -> Self {
        let id = ComponentId::next();
        let prefix = RuntimeConfig::with(|config| config.event_attribute_prefix.clone());

        let inner = Arc::new_cyclic(|weak: &Weak<ComponentInner>| {
            let owner = WeakComponent(weak.clone());
            let reaction = Reaction::labelled(format!("{id} render"), move || match owner.upgrade() {
                Some(component) => component.render_pass(),
                None => Ok(()),
            });
            ComponentInner {
                id,
                state: state.into(),
                template: template.into(),
                host: Node::fragment(),
                tree: Mutex::new(None),
                reaction,
                refs: RwLock::new(HashMap::new()),
                children: Mutex::new(IndexMap::new()),
                delegation: Mutex::new(Delegation::new(&prefix, id)),
                status: RwLock::new(Status::Pending),
                rendered_version: RwLock::new(None),
                render_depth: AtomicUsize::new(0),
                destroyed: AtomicBool::new(false),
                on_destroy: Mutex::new(Vec::new()),
            }
        });

        let component = Self { inner };
        component.inner.reaction.schedule();
        tracing::debug!(component = %id, "component created");
        component
    }

    /// Create a component over `observable(value)`.
    pub fn from_value(template: impl Into<Template>, value: Value) -> Self {
        Self::new(template, observable(value))
    }

    /// The component's unique id.
    pub fn id(&self) -> ComponentId {
        self.inner.id
    }

    /// The state store.
    pub fn state(&self) -> &Observable {
        &self.inner.state
    }

    /// The template the component renders.
    pub fn template(&self) -> &Template {
        &self.inner.template
    }

    /// The render reaction.
    pub fn reaction(&self) -> &Reaction {
        &self.inner.reaction
    }

    /// Forward `patch` to the state store. Record state is merged, keeping
    /// keys the patch leaves out.
    pub fn set(&self, patch: Value) -> Result<()> {
        self.inner.state.set(patch)
    }

    /// Make the state hold exactly `value`.
    pub fn replace(&self, value: Value) -> Result<()> {
        self.inner.state.replace(value)
    }

    /// Render now instead of waiting for the flush.
    pub fn render(&self) -> Result<()> {
        self.inner.reaction.run()
    }

    /// Render lifecycle status.
    pub fn status(&self) -> Status {
        self.inner.status.read().clone()
    }

    /// State version the last successful render saw.
    pub fn rendered_version(&self) -> Option<u64> {
        *self.inner.rendered_version.read()
    }

    /// Every ref published by the last render.
    pub fn refs(&self) -> HashMap<String, Ref> {
        self.inner.refs.read().clone()
    }

    /// One ref by name.
    pub fn get_ref(&self, name: &str) -> Option<Ref> {
        self.inner.refs.read().get(name).cloned()
    }

    /// Child components created by placeholders, in creation order.
    pub fn children(&self) -> Vec<Component> {
        self.inner.children.lock().values().cloned().collect()
    }

    /// The component's top-level DOM nodes in document order, anchors
    /// included. Empty before the first render.
    pub fn root_nodes(&self) -> Vec<Node> {
        match self.inner.tree.lock().as_deref() {
            Some(live) => render::dom_nodes(live),
            None => Vec::new(),
        }
    }

    /// Serialized root nodes.
    pub fn html(&self) -> String {
        self.root_nodes().iter().map(Node::outer_html).collect()
    }

    /// Append the root nodes to `parent`.
    pub fn append_to(&self, parent: &Node) -> &Self {
        self.place(Placement::AppendTo(parent.clone()))
    }

    /// Insert the root nodes at the start of `parent`.
    pub fn prepend_to(&self, parent: &Node) -> &Self {
        self.place(Placement::PrependTo(parent.clone()))
    }

    /// Insert the root nodes before `reference`.
    pub fn before(&self, reference: &Node) -> &Self {
        self.place(Placement::Before(reference.clone()))
    }

    /// Insert the root nodes after `reference`.
    pub fn after(&self, reference: &Node) -> &Self {
        self.place(Placement::After(reference.clone()))
    }

    /// Take the root nodes out of the document.
    pub fn remove(&self) -> &Self {
        self.place(Placement::Remove)
    }

    /// Register a callback for when the component is destroyed.
    pub fn on_destroy(&self, callback: impl FnOnce(&Component) + Send + 'static) {
        if self.is_destroyed() {
            callback(self);
            return;
        }
        self.inner.on_destroy.lock().push(Box::new(callback));
    }

    /// Whether [`destroy`](Self::destroy) has been called.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Stop rendering, destroy child components and the state store, and
    /// detach the DOM. Idempotent.
    ///
    /// Called while the component is rendering, the teardown waits for the
    /// end of the batch; the render in flight finishes without effect.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.reaction.destroy();

        if self.inner.render_depth.load(Ordering::SeqCst) > 0 {
            tracing::warn!(component = %self.inner.id, "destroyed during render, deferring teardown");
            let this = self.clone();
            next_tick(move || this.teardown());
        } else {
            self.teardown();
        }
    }

    fn teardown(&self) {
        let tree = match self.inner.tree.try_lock() {
            Some(mut tree) => tree.take(),
            None => {
                let this = self.clone();
                next_tick(move || this.teardown());
                return;
            }
        };
        for live in tree.into_iter().flatten() {
            live.destroy(self);
        }

        let orphans: Vec<Component> = self.inner.children.lock().drain(..).map(|(_, child)| child).collect();
        for child in orphans {
            child.destroy();
        }

        self.inner.delegation.lock().clear();
        self.inner.refs.write().clear();
        self.inner.state.destroy();

        let callbacks = std::mem::take(&mut *self.inner.on_destroy.lock());
        for callback in callbacks {
            callback(self);
        }
        tracing::debug!(component = %self.inner.id, "component destroyed");
    }

    fn place(&self, placement: Placement) -> &Self {
        if *self.inner.status.read() == Status::Pending {
            let this = self.clone();
            next_tick(move || {
                this.place_now(placement);
            });
        } else {
            self.place_now(placement);
        }
        self
    }

    fn place_now(&self, placement: Placement) {
        let nodes = self.root_nodes();
        match placement {
            Placement::AppendTo(parent) => {
                for node in &nodes {
                    parent.append_child(node);
                }
            }
            Placement::PrependTo(parent) => {
                let first = parent.first_child();
                for node in &nodes {
                    parent.insert_before(node, first.as_ref());
                }
            }
            Placement::Before(reference) => {
                if let Some(parent) = reference.parent() {
                    for node in &nodes {
                        parent.insert_before(node, Some(&reference));
                    }
                }
            }
            Placement::After(reference) => {
                if let Some(parent) = reference.parent() {
                    let next = reference.next_sibling();
                    for node in &nodes {
                        parent.insert_before(node, next.as_ref());
                    }
                }
            }
            Placement::Remove => {
                for node in &nodes {
                    self.inner.host.append_child(node);
                }
            }
        }
        self.rehome_bindings();
    }

    /// The render reaction's computation.
    fn render_pass(&self) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        self.begin_render();
        let result = self.render_tree();
        self.end_render();

        match &result {
            Ok(()) => {
                *self.inner.status.write() = Status::Rendered;
                *self.inner.rendered_version.write() = Some(self.inner.state.version());
            }
            Err(error) => {
                tracing::warn!(component = %self.inner.id, %error, "render failed");
                *self.inner.status.write() = Status::Failed(error.to_string());
            }
        }
        result
    }

    fn render_tree(&self) -> Result<()> {
        let mut tree = self.inner.tree.lock();
        let scope = Scope::new(self.inner.state.clone());
        match tree.as_mut() {
            Some(live) => render::patch_all(live, &scope, self)?,
            None => {
                let at = Position::append(&self.inner.host);
                *tree = Some(render::build_all(self.inner.template.roots(), &scope, self, &at)?);
            }
        }
        if let Some(live) = tree.as_deref() {
            self.sync_bindings(live);
        }
        Ok(())
    }

    /// Republish refs and install missing delegated listeners after a loop
    /// item re-rendered on its own.
    pub(crate) fn refresh_bindings(&self) {
        if self.is_destroyed() {
            return;
        }
        if let Some(tree) = self.inner.tree.try_lock() {
            if let Some(live) = tree.as_deref() {
                self.sync_bindings(live);
            }
        }
    }

    fn sync_bindings(&self, live: &[LiveNode]) {
        *self.inner.refs.write() = collect_refs(live);
        let target = render::delegation_target(live);
        self.inner.delegation.lock().sync_listeners(target.as_ref(), &self.downgrade());
    }

    /// Move delegated listeners after the root nodes changed parent. Child
    /// components grafted at the root level moved along, so they follow.
    pub(crate) fn rehome_bindings(&self) {
        self.refresh_bindings();
        for child in self.children() {
            child.rehome_bindings();
        }
    }

    /// Enter a render. Returns whether no other render of this component is
    /// in progress.
    pub(crate) fn begin_render(&self) -> bool {
        self.inner.render_depth.fetch_add(1, Ordering::SeqCst) == 0
    }

    pub(crate) fn end_render(&self) {
        self.inner.render_depth.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn downgrade(&self) -> WeakComponent {
        WeakComponent(Arc::downgrade(&self.inner))
    }

    pub(crate) fn delegation(&self) -> MutexGuard<'_, Delegation> {
        self.inner.delegation.lock()
    }

    /// Number of delegated listeners, one per bound event type once the
    /// component rendered.
    pub fn listener_count(&self) -> usize {
        self.inner.delegation.lock().listener_count()
    }

    /// Number of elements with a live event binding.
    pub fn bound_handler_count(&self) -> usize {
        self.inner.delegation.lock().slot_count()
    }

    pub(crate) fn adopt(&self, child: &Component) {
        self.inner.children.lock().insert(child.id(), child.clone());
    }

    pub(crate) fn disown(&self, child: ComponentId) {
        self.inner.children.lock().shift_remove(&child);
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Component {}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state.id())
            .field("status", &*self.inner.status.read())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

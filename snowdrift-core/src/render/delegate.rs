//! Event delegation.
//!
//! Elements with event bindings are not given listeners. Each gets a
//! synthetic attribute `{prefix}{component}-on{event}` whose value is a slot
//! number, and the component keeps a table from slot to handler and scope.
//! One listener per event type is installed on the component's delegation
//! target: its root element when the template has exactly one, otherwise
//! the parent its root nodes share. When an event bubbles to it, the
//! listener walks from the target back up to that node, calling the handler
//! of every slot it passes.
//!
//! Re-rendering only rewrites table entries, so the number of listeners
//! depends on the event types in use, not on how many elements bind them or
//! how many items a root-level loop holds.

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;

use crate::component::{Component, ComponentId, WeakComponent};
use crate::dom::{Event, Listener, ListenerId, Node, NodeId};
use crate::template::{EventContext, Handler, Scope};

/// Number stored in the synthetic attribute.
pub(crate) type SlotId = u64;

struct Entry {
    event: String,
    handler: Handler,
    scope: Scope,
}

/// A component's delegated handlers and installed listeners.
pub(crate) struct Delegation {
    prefix: String,
    next_slot: SlotId,
    slots: HashMap<SlotId, Entry>,
    listeners: IndexMap<(NodeId, String), (Node, ListenerId)>,
}

impl Delegation {
    pub(crate) fn new(prefix: &str, component: ComponentId) -> Self {
        Self {
            prefix: format!("{prefix}{}-on", component.raw()),
            next_slot: 0,
            slots: HashMap::new(),
            listeners: IndexMap::new(),
        }
    }

    /// The attribute that marks elements handling `event`.
    pub(crate) fn attribute(&self, event: &str) -> String {
        format!("{}{event}", self.prefix)
    }

    pub(crate) fn bind(&mut self, event: &str, handler: Handler, scope: Scope) -> SlotId {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.slots.insert(
            slot,
            Entry {
                event: event.to_string(),
                handler,
                scope,
            },
        );
        slot
    }

    pub(crate) fn rebind(&mut self, slot: SlotId, handler: Handler, scope: Scope) {
        if let Some(entry) = self.slots.get_mut(&slot) {
            entry.handler = handler;
            entry.scope = scope;
        }
    }

    pub(crate) fn release_all(&mut self, slots: &[SlotId]) {
        for slot in slots {
            self.slots.remove(slot);
        }
    }

    fn lookup(&self, slot: SlotId) -> Option<(Handler, Scope)> {
        self.slots
            .get(&slot)
            .map(|entry| (entry.handler.clone(), entry.scope.clone()))
    }

    /// Number of live slots.
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Make sure `target` listens for every bound event type, and drop
    /// listeners left on any other node.
    pub(crate) fn sync_listeners(&mut self, target: Option<&Node>, owner: &WeakComponent) {
        let events: BTreeSet<&str> = self.slots.values().map(|entry| entry.event.as_str()).collect();
        let wanted: HashSet<(NodeId, String)> = target
            .iter()
            .flat_map(|node| events.iter().map(move |event| (node.id(), event.to_string())))
            .collect();

        self.listeners.retain(|key, (node, listener)| {
            let keep = wanted.contains(key);
            if !keep {
                node.remove_event_listener(*listener);
            }
            keep
        });

        let Some(node) = target else {
            return;
        };
        for event in &events {
            let key = (node.id(), event.to_string());
            if self.listeners.contains_key(&key) {
                continue;
            }
            let listener = node.add_event_listener(event, listener(owner.clone(), self.attribute(event)));
            self.listeners.insert(key, (node.clone(), listener));
        }
    }

    /// Number of listeners installed, one per event type.
    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Remove every listener and forget every slot.
    pub(crate) fn clear(&mut self) {
        for (_, (node, listener)) in self.listeners.drain(..) {
            node.remove_event_listener(listener);
        }
        self.slots.clear();
    }
}

fn listener(owner: WeakComponent, attribute: String) -> Listener {
    std::sync::Arc::new(move |event: &mut Event| {
        if let Some(component) = owner.upgrade() {
            dispatch(&component, event, &attribute);
        }
    })
}

/// Run the handlers of every slot between the event target and the node
/// whose listener fired.
pub(crate) fn dispatch(component: &Component, event: &mut Event, attribute: &str) {
    if component.is_destroyed() {
        return;
    }
    let boundary = event.current_target().clone();
    let mut current = Some(event.target().clone());

    while let Some(node) = current {
        let slot = node.attribute(attribute).and_then(|value| value.parse::<SlotId>().ok());
        let entry = slot.and_then(|slot| component.delegation().lookup(slot));
        if let Some((handler, scope)) = entry {
            let outcome = handler(&mut EventContext::new(event, &scope, component));
            if let Err(error) = outcome {
                tracing::error!(
                    component = %component.id(),
                    event = event.kind(),
                    %error,
                    "event handler failed"
                );
            }
            if event.propagation_stopped() {
                break;
            }
        }
        if node == boundary {
            break;
        }
        current = node.parent();
    }
}

//! Reachability-scoped view of node properties.
//!
//! Converts the raw added/modified deltas of the synchronization service and
//! the topology layer's reachability changes into consumer-grade events:
//! added/updated/removed property sets and immutable per-node value maps,
//! both restricted to currently reachable nodes. Properties of unreachable
//! nodes are retained silently and re-reported when the node reconnects.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::core::NodeId;
use crate::knowledge::{CompositeKey, NodeProperty};
use crate::sync::listener::{Callback, CallbackHub, ListenerHandle, PropertyListener};

/// Listener for reachability-scoped property events.
pub trait ViewListener: Send + Sync {
    /// Called when the set of reachable properties changes. A reconnecting
    /// node's properties arrive as `added`, a disconnecting node's as
    /// `removed`.
    fn on_reachable_properties_changed(
        &self,
        added: &[NodeProperty],
        updated: &[NodeProperty],
        removed: &[NodeProperty],
    );

    /// Called with fresh immutable value maps for every node whose map
    /// changed; `None` means the node became unreachable.
    fn on_node_property_maps_changed(
        &self,
        maps: &HashMap<NodeId, Option<HashMap<String, String>>>,
    );
}

struct ViewState {
    /// Live (non-retracted) property objects per node, reachable or not.
    properties_by_node: HashMap<NodeId, HashMap<String, NodeProperty>>,
    /// Current value map per known node.
    value_maps: HashMap<NodeId, HashMap<String, String>>,
    /// Current value map per *reachable* node.
    reachable_value_maps: HashMap<NodeId, HashMap<String, String>>,
    reachable_nodes: HashSet<NodeId>,
    reachable_properties: HashMap<CompositeKey, NodeProperty>,
    callbacks: CallbackHub<dyn ViewListener>,
}

/// Converts raw property deltas plus topology changes into
/// [`ViewListener`] events.
///
/// Cheap to clone; clones share state. Feed it by registering
/// [`ReachablePropertyView::as_property_listener`] with the synchronization
/// service and by calling
/// [`ReachablePropertyView::on_reachable_nodes_changed`] from the topology
/// layer's change events.
#[derive(Clone)]
pub struct ReachablePropertyView {
    state: Arc<Mutex<ViewState>>,
}

impl ReachablePropertyView {
    /// Create an empty view with no reachable nodes.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ViewState {
                properties_by_node: HashMap::new(),
                value_maps: HashMap::new(),
                reachable_value_maps: HashMap::new(),
                reachable_nodes: HashSet::new(),
                reachable_properties: HashMap::new(),
                callbacks: CallbackHub::new(),
            })),
        }
    }

    /// Register a view listener.
    ///
    /// The listener is immediately (asynchronously) replayed all currently
    /// reachable properties as `added`, followed by the current reachable
    /// value maps, before any live event. Must be called inside a tokio
    /// runtime.
    pub fn add_listener(&self, listener: Arc<dyn ViewListener>) -> ListenerHandle {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let reachable: Vec<NodeProperty> = state.reachable_properties.values().cloned().collect();
        let maps: HashMap<NodeId, Option<HashMap<String, String>>> = state
            .reachable_value_maps
            .iter()
            .map(|(node, map)| (node.clone(), Some(map.clone())))
            .collect();
        let initial: Callback<dyn ViewListener> = Arc::new(move |listener: &dyn ViewListener| {
            listener.on_reachable_properties_changed(&reachable, &[], &[]);
            listener.on_node_property_maps_changed(&maps);
        });
        state.callbacks.add_listener(listener, Some(initial))
    }

    /// Unregister a previously added listener.
    pub fn remove_listener(&self, handle: &ListenerHandle) {
        self.state.lock().callbacks.remove_listener(handle);
    }

    /// Adapter feeding this view from a synchronization service's raw
    /// property stream.
    pub fn as_property_listener(&self) -> Arc<dyn PropertyListener> {
        Arc::new(ViewFeed { view: self.clone() })
    }

    /// Process a batch of raw added/modified properties.
    pub fn on_raw_properties(&self, properties: &[NodeProperty]) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let mut added = Vec::new();
        let mut updated = Vec::new();
        let mut removed = Vec::new();
        let mut touched: HashSet<NodeId> = HashSet::new();

        for property in properties {
            let node = property.origin().clone();
            let is_reachable = state.reachable_nodes.contains(&node);
            touched.insert(node.clone());
            let node_map = state.properties_by_node.entry(node).or_default();

            if property.is_retraction() {
                node_map.remove(property.key());
                if is_reachable {
                    state.reachable_properties.remove(&property.composite_key());
                    removed.push(property.clone());
                }
            } else {
                let replaced = node_map.insert(property.key().to_string(), property.clone());
                if is_reachable {
                    state
                        .reachable_properties
                        .insert(property.composite_key(), property.clone());
                    if replaced.is_some() {
                        updated.push(property.clone());
                    } else {
                        added.push(property.clone());
                    }
                }
            }
        }

        if !(added.is_empty() && updated.is_empty() && removed.is_empty()) {
            debug!(
                added = added.len(),
                updated = updated.len(),
                removed = removed.len(),
                "reporting reachable property change"
            );
            state.callbacks.enqueue(Arc::new(move |listener: &dyn ViewListener| {
                listener.on_reachable_properties_changed(&added, &updated, &removed);
            }));
        }

        let mut maps_delta: HashMap<NodeId, Option<HashMap<String, String>>> = HashMap::new();
        for node in touched {
            let value_map = Self::value_map_of(state, &node);
            if state.reachable_nodes.contains(&node) {
                maps_delta.insert(node.clone(), Some(value_map.clone()));
                state
                    .reachable_value_maps
                    .insert(node.clone(), value_map.clone());
            }
            state.value_maps.insert(node, value_map);
        }
        if !maps_delta.is_empty() {
            state.callbacks.enqueue(Arc::new(move |listener: &dyn ViewListener| {
                listener.on_node_property_maps_changed(&maps_delta);
            }));
        }
    }

    /// Process a topology change: the new reachable node set plus the nodes
    /// that entered and left it.
    pub fn on_reachable_nodes_changed(
        &self,
        new_reachable: HashSet<NodeId>,
        added_nodes: &[NodeId],
        removed_nodes: &[NodeId],
    ) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let mut maps_delta: HashMap<NodeId, Option<HashMap<String, String>>> = HashMap::new();

        let mut disconnected = Vec::new();
        for node in removed_nodes {
            if let Some(node_map) = state.properties_by_node.get(node) {
                disconnected.extend(node_map.values().cloned());
            }
            maps_delta.insert(node.clone(), None);
            state.reachable_value_maps.remove(node);
        }

        let mut reconnected = Vec::new();
        for node in added_nodes {
            if let Some(node_map) = state.properties_by_node.get(node) {
                reconnected.extend(node_map.values().cloned());
            }
            let value_map = state.value_maps.get(node).cloned().unwrap_or_default();
            maps_delta.insert(node.clone(), Some(value_map.clone()));
            state.reachable_value_maps.insert(node.clone(), value_map);
        }

        for property in &reconnected {
            state
                .reachable_properties
                .insert(property.composite_key(), property.clone());
        }
        for property in &disconnected {
            state.reachable_properties.remove(&property.composite_key());
        }
        state.reachable_nodes = new_reachable;

        if !(disconnected.is_empty() && reconnected.is_empty()) {
            debug!(
                disconnected = disconnected.len(),
                reconnected = reconnected.len(),
                "reporting reachable property change after topology change"
            );
            state.callbacks.enqueue(Arc::new(move |listener: &dyn ViewListener| {
                listener.on_reachable_properties_changed(&reconnected, &[], &disconnected);
            }));
        }

        if !maps_delta.is_empty() {
            state.callbacks.enqueue(Arc::new(move |listener: &dyn ViewListener| {
                listener.on_node_property_maps_changed(&maps_delta);
            }));
        }
    }

    fn value_map_of(state: &ViewState, node: &NodeId) -> HashMap<String, String> {
        state
            .properties_by_node
            .get(node)
            .map(|node_map| {
                node_map
                    .iter()
                    .filter_map(|(key, property)| {
                        property.value().map(|value| (key.clone(), value.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for ReachablePropertyView {
    fn default() -> Self {
        Self::new()
    }
}

struct ViewFeed {
    view: ReachablePropertyView,
}

impl PropertyListener for ViewFeed {
    fn on_properties_added_or_modified(&self, properties: &[NodeProperty]) {
        self.view.on_raw_properties(properties);
    }
}

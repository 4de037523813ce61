//! The property synchronization service.
//!
//! Orchestrates local publication, the initial (anti-entropy) exchange on new
//! neighbor links, and incremental update handling, including relay/leaf
//! scoped forwarding and self-correction against stale remote copies of
//! local state.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::{KEY_DISPLAY_NAME, NodeId, SyncError};
use crate::knowledge::{NodeProperty, PropertyRegistry, SequenceClock};
use crate::sync::listener::{Callback, CallbackHub, ListenerHandle, PropertyListener};
use crate::transport::{LinkDirectory, NeighborLink, RequestHandler};
use crate::wire::{PropertyUpdate, UpdateKind};

/// Static configuration of one node's synchronization service.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Identity of the local node; the origin of everything it publishes.
    pub node_id: NodeId,
    /// Whether this node forwards knowledge it did not author (relay) or
    /// only its own properties (leaf).
    pub relay: bool,
}

impl SyncConfig {
    /// Configuration for a relay node.
    pub fn relay(node_id: NodeId) -> Self {
        Self {
            node_id,
            relay: true,
        }
    }

    /// Configuration for a leaf node.
    pub fn leaf(node_id: NodeId) -> Self {
        Self {
            node_id,
            relay: false,
        }
    }
}

/// Everything guarded by the knowledge lock.
///
/// The locally-published registry only keeps the properties authored by the
/// local node. It serves two purposes: scoping what a leaf hands to new
/// neighbors (so third-party knowledge does not leak between unrelated
/// network segments), and checking received updates about the local node
/// against what was actually published in this session.
struct Knowledge {
    complete: PropertyRegistry,
    locally_published: PropertyRegistry,
    clock: SequenceClock,
    listeners: CallbackHub<dyn PropertyListener>,
}

struct ServiceInner {
    config: SyncConfig,
    links: Arc<dyn LinkDirectory>,
    knowledge: Mutex<Knowledge>,
}

/// Node property synchronization service; one instance per node process.
///
/// Cheap to clone; clones share the same state. The host wires it up by
/// registering it as the request handler for
/// [`crate::core::MESSAGE_TYPE_PROPERTY_SYNC`] and invoking
/// [`PropertySyncService::on_outgoing_link_established`] from its channel
/// lifecycle events.
#[derive(Clone)]
pub struct PropertySyncService {
    inner: Arc<ServiceInner>,
}

impl PropertySyncService {
    /// Create a service for the given node over the given link directory.
    pub fn new(config: SyncConfig, links: Arc<dyn LinkDirectory>) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                config,
                links,
                knowledge: Mutex::new(Knowledge {
                    complete: PropertyRegistry::new(),
                    locally_published: PropertyRegistry::new(),
                    clock: SequenceClock::new(),
                    listeners: CallbackHub::new(),
                }),
            }),
        }
    }

    /// The local node's identity.
    pub fn node_id(&self) -> &NodeId {
        &self.inner.config.node_id
    }

    /// Publish a batch of local property updates.
    ///
    /// The whole batch shares one fresh sequence number, is merged into both
    /// registries, broadcast to every connected outgoing neighbor, and
    /// reported to local listeners. A `None` value publishes a retraction of
    /// the key. An empty batch is a no-op.
    pub fn publish(&self, entries: impl IntoIterator<Item = (String, Option<String>)>) {
        let entries: Vec<(String, Option<String>)> = entries.into_iter().collect();
        let mut knowledge = self.inner.knowledge.lock();
        self.inner.publish_locked(&mut knowledge, entries);
    }

    /// Publish a single key/value pair.
    pub fn publish_value(&self, key: impl Into<String>, value: impl Into<String>) {
        self.publish([(key.into(), Some(value.into()))]);
    }

    /// Publish a retraction of a single key.
    pub fn retract(&self, key: impl Into<String>) {
        self.publish([(key.into(), None)]);
    }

    /// Snapshot of one node's properties from the complete knowledge.
    pub fn node_properties(&self, node: &NodeId) -> HashMap<String, String> {
        self.inner.knowledge.lock().complete.node_properties(node)
    }

    /// Snapshot of the key/value maps of the given nodes.
    pub fn all_node_properties(
        &self,
        nodes: &[NodeId],
    ) -> HashMap<NodeId, HashMap<String, String>> {
        self.inner.knowledge.lock().complete.all_node_properties(nodes)
    }

    /// Snapshot of the key/value maps of every known node.
    pub fn all_node_properties_complete(&self) -> HashMap<NodeId, HashMap<String, String>> {
        self.inner
            .knowledge
            .lock()
            .complete
            .all_node_properties_complete()
    }

    /// Detached snapshot of the complete-knowledge entries.
    pub fn complete_snapshot(&self) -> Vec<NodeProperty> {
        self.inner.knowledge.lock().complete.detached_copy()
    }

    /// Detached snapshot of the entries this node itself published.
    pub fn published_snapshot(&self) -> Vec<NodeProperty> {
        self.inner.knowledge.lock().locally_published.detached_copy()
    }

    /// Register a listener for raw property changes.
    ///
    /// The listener is first replayed the full current complete knowledge,
    /// then receives live deltas, in order. Must be called inside a tokio
    /// runtime (the listener gets a dedicated delivery task).
    pub fn add_listener(&self, listener: Arc<dyn PropertyListener>) -> ListenerHandle {
        let mut knowledge = self.inner.knowledge.lock();
        let snapshot = Arc::new(knowledge.complete.detached_copy());
        let replay: Callback<dyn PropertyListener> = Arc::new(move |listener: &dyn PropertyListener| {
            listener.on_properties_added_or_modified(snapshot.as_slice());
        });
        knowledge.listeners.add_listener(listener, Some(replay))
    }

    /// Unregister a previously added listener.
    pub fn remove_listener(&self, handle: &ListenerHandle) {
        self.inner.knowledge.lock().listeners.remove_listener(handle);
    }

    /// Channel lifecycle event: a new outgoing link was established.
    ///
    /// Immediately starts the initial property exchange over that link. The
    /// response is consumed asynchronously; if it never arrives, the local
    /// registry simply stays un-updated until the next (re)establishment.
    pub fn on_outgoing_link_established(&self, link: &Arc<dyn NeighborLink>) {
        let remote = link.remote_node();
        debug!(
            local = %self.inner.config.node_id,
            %remote,
            "link established; starting initial property exchange"
        );

        let snapshot = {
            let knowledge = self.inner.knowledge.lock();
            if self.inner.config.relay {
                knowledge.complete.detached_copy()
            } else {
                knowledge.locally_published.detached_copy()
            }
        };

        let body = PropertyUpdate::new(UpdateKind::Initial, snapshot).encode();
        let inner = Arc::clone(&self.inner);
        link.send_request(
            body,
            Some(Box::new(move |result| match result {
                Ok(response) => inner.handle_initial_response(&remote, &response),
                Err(error) => {
                    warn!(%remote, %error, "initial property exchange failed");
                }
            })),
        );
    }

    /// Channel lifecycle event: the set of links present before this service
    /// started observing.
    ///
    /// Normally empty on startup; pre-existing links are logged because they
    /// will not receive an initial exchange until re-established.
    pub fn set_initial_links(&self, links: &[Arc<dyn NeighborLink>]) {
        if !links.is_empty() {
            warn!(
                count = links.len(),
                "initial link set is not empty; these links get no initial property exchange"
            );
        }
    }
}

impl RequestHandler for PropertySyncService {
    fn handle_request(&self, sender: &NodeId, body: &str) -> Result<String, SyncError> {
        self.inner.handle_request_inner(sender, body)
    }
}

impl ServiceInner {
    /// Local publication; caller holds the knowledge lock.
    fn publish_locked(&self, knowledge: &mut Knowledge, entries: Vec<(String, Option<String>)>) {
        if entries.is_empty() {
            debug!("property update triggered with empty data; ignoring");
            return;
        }

        let sequence_no = knowledge.clock.next();
        let delta: Vec<NodeProperty> = entries
            .into_iter()
            .map(|(key, value)| {
                NodeProperty::new(self.config.node_id.clone(), key, sequence_no, value)
            })
            .collect();
        debug!(
            count = delta.len(),
            sequence_no, "applying update delta to published properties"
        );

        // All entries are fresh and authoritative, so the merge stays simple.
        knowledge.complete.merge_unchecked(delta.iter().cloned());
        knowledge.locally_published.merge_unchecked(delta.iter().cloned());

        self.broadcast(UpdateKind::Incremental, &delta, None);
        self.note_display_name_changes(&delta);
        Self::report_delta(&mut knowledge.listeners, delta);
    }

    /// Shared merge path for everything arriving from the network; caller
    /// holds the knowledge lock. Returns the accepted (effective) subset.
    fn merge_external_locked(
        &self,
        knowledge: &mut Knowledge,
        entries: &[NodeProperty],
    ) -> Vec<NodeProperty> {
        let corrections = self.corrections_for(knowledge, entries);
        if !corrections.is_empty() {
            debug!(
                count = corrections.len(),
                "publishing a cancel/republish set"
            );
            // The sender of an initial update may see this as an incremental
            // update before receiving the complementing response; harmless.
            self.publish_locked(knowledge, corrections);
        }

        // No relay/leaf distinction here: the result is only forwarded in
        // relay mode.
        let effective = knowledge
            .complete
            .merge_and_get_effective_subset(entries.iter().cloned());
        self.note_display_name_changes(&effective);
        Self::report_delta(&mut knowledge.listeners, effective.clone());
        effective
    }

    /// Self-correction pass: compare received entries claiming local origin
    /// against what this node actually published.
    fn corrections_for(
        &self,
        knowledge: &mut Knowledge,
        entries: &[NodeProperty],
    ) -> Vec<(String, Option<String>)> {
        let mut corrections = Vec::new();
        for received in entries.iter().filter(|e| e.origin() == &self.config.node_id) {
            let existing = knowledge
                .locally_published
                .property(&self.config.node_id, received.key())
                .cloned();
            match existing {
                None => {
                    debug!(
                        property = %received,
                        "received a property for the local node with no local counterpart; \
                         a canceling update will be published"
                    );
                    knowledge.clock.observe(received.sequence_no());
                    corrections.push((received.key().to_string(), None));
                }
                Some(local) if local.sequence_no() < received.sequence_no() => {
                    // Should not happen with unique node ids in place.
                    warn!(
                        local = %local,
                        received = %received,
                        "received a property for the local node that is newer than the \
                         actual local state; is there a node with the same id in the \
                         network? re-publishing the local value"
                    );
                    knowledge.clock.observe(received.sequence_no());
                    corrections.push((
                        received.key().to_string(),
                        local.value().map(String::from),
                    ));
                }
                Some(_) => {}
            }
        }
        corrections
    }

    /// Inbound request processing (both update subtypes).
    fn handle_request_inner(&self, sender: &NodeId, body: &str) -> Result<String, SyncError> {
        let update = PropertyUpdate::decode(body).map_err(SyncError::from)?;

        let mut knowledge = self.knowledge.lock();
        let effective = self.merge_external_locked(&mut knowledge, &update.entries);
        if self.config.relay {
            self.forward_if_not_empty(sender, &effective);
        }

        match update.kind {
            UpdateKind::Initial => {
                let (registry, scope) = if self.config.relay {
                    (&knowledge.complete, "complete")
                } else {
                    (&knowledge.locally_published, "local")
                };
                let complement = registry.complementing_knowledge(&update.entries);
                debug!(
                    complementing = complement.len(),
                    total = registry.entry_count(),
                    scope,
                    "responding to initial property exchange"
                );
                Ok(PropertyUpdate::new(UpdateKind::Incremental, complement).encode())
            }
            UpdateKind::Incremental => Ok(String::new()),
        }
    }

    /// Completion of an initial exchange this node started.
    fn handle_initial_response(&self, responder: &NodeId, body: &str) {
        let update = match PropertyUpdate::decode(body) {
            Ok(update) => update,
            Err(error) => {
                warn!(
                    %responder,
                    %error,
                    "failed to decode response to initial property exchange"
                );
                return;
            }
        };

        let mut knowledge = self.knowledge.lock();
        let effective = self.merge_external_locked(&mut knowledge, &update.entries);
        if self.config.relay {
            debug!(
                %responder,
                "received initial property response; forwarding to all other connected nodes"
            );
            self.forward_if_not_empty(responder, &effective);
        } else {
            debug!(%responder, "received initial property response");
        }
    }

    /// Forward to all neighbors *except* the given sender, unless the
    /// accepted subset is empty.
    fn forward_if_not_empty(&self, sender: &NodeId, effective: &[NodeProperty]) {
        if effective.is_empty() {
            debug!(%sender, "property update did not result in a local change; not forwarding");
        } else {
            self.broadcast(UpdateKind::Incremental, effective, Some(sender));
        }
    }

    /// Fire-and-forget send to every outgoing link, minus an optional
    /// excluded recipient. Failures are logged per link.
    fn broadcast(&self, kind: UpdateKind, entries: &[NodeProperty], exclude: Option<&NodeId>) {
        let mut body: Option<String> = None;
        for link in self.links.outgoing_links() {
            let remote = link.remote_node();
            if exclude == Some(&remote) {
                continue;
            }
            // Construct the body lazily in case there is no recipient at all.
            let body = body
                .get_or_insert_with(|| PropertyUpdate::new(kind, entries.to_vec()).encode())
                .clone();
            let link_id = link.link_id();
            link.send_request(
                body,
                Some(Box::new(move |result| {
                    if let Err(error) = result {
                        warn!(
                            %remote,
                            link = %link_id,
                            %error,
                            "failed to send property update"
                        );
                    }
                })),
            );
        }
    }

    fn note_display_name_changes(&self, entries: &[NodeProperty]) {
        for entry in entries.iter().filter(|e| e.key() == KEY_DISPLAY_NAME) {
            debug!(node = %entry.origin(), name = ?entry.value(), "display name changed");
        }
    }

    fn report_delta(listeners: &mut CallbackHub<dyn PropertyListener>, delta: Vec<NodeProperty>) {
        let batch = Arc::new(delta);
        listeners.enqueue(Arc::new(move |listener: &dyn PropertyListener| {
            listener.on_properties_added_or_modified(batch.as_slice());
        }));
    }
}

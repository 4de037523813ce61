//! In-process mesh transport.
//!
//! Connects any number of node handlers through an in-memory message queue,
//! implementing the [`NeighborLink`]/[`LinkDirectory`] seam without sockets.
//! All deliveries go through one dispatcher task, so a handler is never
//! invoked synchronously from inside `send_request` (which callers may issue
//! while holding locks) and never concurrently with another delivery.
//!
//! Used by the integration tests; also handy for wiring several node
//! instances inside one process.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::sync::mpsc;

use crate::core::{LinkError, NodeId};
use crate::transport::{LinkDirectory, NeighborLink, RequestHandler, ResponseCallback};

enum Delivery {
    Request {
        from: NodeId,
        to: NodeId,
        body: String,
        on_response: Option<ResponseCallback>,
    },
    Response {
        on_response: ResponseCallback,
        result: Result<String, LinkError>,
    },
}

#[derive(Default)]
struct NodeSlot {
    handler: Option<Arc<dyn RequestHandler>>,
    links: Vec<Arc<MemoryLink>>,
}

struct MeshInner {
    nodes: Mutex<HashMap<NodeId, NodeSlot>>,
    queue: mpsc::UnboundedSender<Delivery>,
    /// Deliveries queued or currently executing.
    pending: AtomicUsize,
    idle: Notify,
}

impl MeshInner {
    fn enqueue(&self, delivery: Delivery) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.queue.send(delivery).is_err() {
            // Dispatcher gone (runtime shutdown); drop silently.
            self.finish_one();
        }
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn handler_of(&self, node: &NodeId) -> Option<Arc<dyn RequestHandler>> {
        self.nodes.lock().get(node).and_then(|slot| slot.handler.clone())
    }
}

/// An in-process mesh of nodes with bidirectional neighbor links.
///
/// Must be created inside a tokio runtime; the dispatcher runs as a spawned
/// task for the lifetime of the mesh.
#[derive(Clone)]
pub struct MemoryMesh {
    inner: Arc<MeshInner>,
}

impl MemoryMesh {
    /// Create an empty mesh and spawn its dispatcher task.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let inner = Arc::new(MeshInner {
            nodes: Mutex::new(HashMap::new()),
            queue: tx,
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        let dispatcher = Arc::clone(&inner);
        tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                match delivery {
                    Delivery::Request {
                        from,
                        to,
                        body,
                        on_response,
                    } => {
                        let outcome = match dispatcher.handler_of(&to) {
                            Some(handler) => handler
                                .handle_request(&from, &body)
                                .map_err(|e| LinkError::RequestFailed(e.to_string())),
                            None => Err(LinkError::Closed),
                        };
                        if let Some(on_response) = on_response {
                            dispatcher.enqueue(Delivery::Response {
                                on_response,
                                result: outcome,
                            });
                        }
                    }
                    Delivery::Response {
                        on_response,
                        result,
                    } => on_response(result),
                }
                dispatcher.finish_one();
            }
        });

        Self { inner }
    }

    /// Add a node and return its link directory handle.
    pub fn add_node(&self, id: NodeId) -> Arc<MeshNode> {
        self.inner.nodes.lock().entry(id.clone()).or_default();
        Arc::new(MeshNode {
            id,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Install the request handler of a node.
    pub fn set_handler(&self, id: &NodeId, handler: Arc<dyn RequestHandler>) {
        if let Some(slot) = self.inner.nodes.lock().get_mut(id) {
            slot.handler = Some(handler);
        }
    }

    /// Establish a bidirectional neighbor connection between two nodes.
    ///
    /// Returns the two directed links `(a → b, b → a)`, already present in
    /// each node's directory; the caller decides when to announce them to the
    /// respective services.
    pub fn connect(&self, a: &NodeId, b: &NodeId) -> (Arc<MemoryLink>, Arc<MemoryLink>) {
        let a_to_b = Arc::new(MemoryLink {
            local: a.clone(),
            remote: b.clone(),
            inner: Arc::clone(&self.inner),
        });
        let b_to_a = Arc::new(MemoryLink {
            local: b.clone(),
            remote: a.clone(),
            inner: Arc::clone(&self.inner),
        });

        let mut nodes = self.inner.nodes.lock();
        nodes.entry(a.clone()).or_default().links.push(Arc::clone(&a_to_b));
        nodes.entry(b.clone()).or_default().links.push(Arc::clone(&b_to_a));
        (a_to_b, b_to_a)
    }

    /// Wait until every queued delivery (including deliveries triggered by
    /// other deliveries, transitively) has been processed.
    pub async fn settle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for MemoryMesh {
    fn default() -> Self {
        Self::new()
    }
}

/// A node's view of the mesh; implements [`LinkDirectory`].
pub struct MeshNode {
    id: NodeId,
    inner: Arc<MeshInner>,
}

impl MeshNode {
    /// The node this handle belongs to.
    pub fn id(&self) -> &NodeId {
        &self.id
    }
}

impl LinkDirectory for MeshNode {
    fn outgoing_links(&self) -> Vec<Arc<dyn NeighborLink>> {
        self.inner
            .nodes
            .lock()
            .get(&self.id)
            .map(|slot| {
                slot.links
                    .iter()
                    .map(|link| Arc::clone(link) as Arc<dyn NeighborLink>)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A directed in-memory link between two mesh nodes.
pub struct MemoryLink {
    local: NodeId,
    remote: NodeId,
    inner: Arc<MeshInner>,
}

impl NeighborLink for MemoryLink {
    fn remote_node(&self) -> NodeId {
        self.remote.clone()
    }

    fn link_id(&self) -> String {
        format!("mem:{}->{}", self.local, self.remote)
    }

    fn send_request(&self, body: String, on_response: Option<ResponseCallback>) {
        self.inner.enqueue(Delivery::Request {
            from: self.local.clone(),
            to: self.remote.clone(),
            body,
            on_response,
        });
    }
}

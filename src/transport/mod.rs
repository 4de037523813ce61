//! Transport seam: neighbor links and request routing.
//!
//! The channel layer that establishes and tears down links and moves bytes is
//! an external collaborator. This module defines the narrow interfaces it is
//! consumed through, and [`memory`] provides an in-process implementation for
//! tests and local wiring.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       PropertySyncService               │
//! ├─────────────────────────────────────────┤
//! │   NeighborLink / LinkDirectory /        │  ← this module
//! │   RequestHandler                        │
//! ├─────────────────────────────────────────┤
//! │   Channel layer (external)              │
//! └─────────────────────────────────────────┘
//! ```

pub mod memory;

use std::sync::Arc;

use crate::core::{LinkError, NodeId, SyncError};

/// Callback invoked with the outcome of a request sent on a neighbor link.
pub type ResponseCallback = Box<dyn FnOnce(Result<String, LinkError>) + Send + 'static>;

/// One established outgoing link to a direct neighbor.
///
/// `send_request` is fire-and-forget: implementations MUST NOT block and MUST
/// NOT invoke request handlers or callbacks synchronously from inside the
/// call, because callers may hold locks while broadcasting.
pub trait NeighborLink: Send + Sync {
    /// The node this link reaches.
    fn remote_node(&self) -> NodeId;

    /// A stable link identifier, for diagnostics only.
    fn link_id(&self) -> String;

    /// Send a request body to the neighbor. The response (or failure) is
    /// delivered asynchronously to `on_response` when one was supplied.
    fn send_request(&self, body: String, on_response: Option<ResponseCallback>);
}

/// Directory of the currently established outgoing links of the local node.
pub trait LinkDirectory: Send + Sync {
    /// Snapshot of all outgoing links at this moment.
    fn outgoing_links(&self) -> Vec<Arc<dyn NeighborLink>>;
}

/// Handler for inbound requests of one message type.
///
/// The host registers an implementation under a fixed message-type tag (for
/// this subsystem: [`crate::core::MESSAGE_TYPE_PROPERTY_SYNC`]) and routes
/// every matching request to it. An `Err` return is surfaced to the sender as
/// a failure response for that single message.
pub trait RequestHandler: Send + Sync {
    /// Process one request body from `sender`, returning the response body.
    fn handle_request(&self, sender: &NodeId, body: &str) -> Result<String, SyncError>;
}

//! # propsync
//!
//! Hop-by-hop node property synchronization for peer-to-peer overlay meshes.
//!
//! Every node in the mesh publishes key/value metadata about itself
//! (capabilities, display name, …) that every other node must eventually
//! learn, propagated over direct neighbor links rather than through a
//! central broker. propsync provides:
//!
//! - **Per-origin versioning**: a strictly monotonic sequence number per
//!   publishing node orders concurrent updates to the same key
//! - **Anti-entropy**: new neighbor links immediately exchange complementing
//!   knowledge, so both sides converge without waiting for fresh updates
//! - **Scoped forwarding**: relay nodes forward third-party knowledge, leaf
//!   nodes hand out only their own properties
//! - **Loop avoidance**: forwarding always excludes the sender, so updates
//!   never reflect back along the link they arrived on
//! - **Self-correction**: stale remote copies of local state are overridden
//!   by corrective republication under a fresh sequence number
//!
//! ## Modules
//!
//! - [`core`]: identifiers, constants, and error types
//! - [`wire`]: the escape-and-join token codec and update messages
//! - [`knowledge`]: property value types, sequence clock, and the registry
//! - [`sync`]: the synchronization service, listeners, and the reachable view
//! - [`transport`]: the consumed channel-layer interfaces, plus an
//!   in-process mesh for tests and local wiring
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use propsync::prelude::*;
//! use propsync::transport::memory::MemoryMesh;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let mesh = MemoryMesh::new();
//!
//!     // Two leaf nodes, connected by one bidirectional link.
//!     let alice_id = NodeId::from("alice");
//!     let bob_id = NodeId::from("bob");
//!     let alice = PropertySyncService::new(
//!         SyncConfig::leaf(alice_id.clone()),
//!         mesh.add_node(alice_id.clone()),
//!     );
//!     let bob = PropertySyncService::new(
//!         SyncConfig::leaf(bob_id.clone()),
//!         mesh.add_node(bob_id.clone()),
//!     );
//!     mesh.set_handler(&alice_id, Arc::new(alice.clone()));
//!     mesh.set_handler(&bob_id, Arc::new(bob.clone()));
//!
//!     alice.publish_value("displayName", "Alice");
//!
//!     let (a_to_b, b_to_a) = mesh.connect(&alice_id, &bob_id);
//!     alice.on_outgoing_link_established(&(a_to_b as Arc<dyn NeighborLink>));
//!     bob.on_outgoing_link_established(&(b_to_a as Arc<dyn NeighborLink>));
//!     mesh.settle().await;
//!
//!     assert_eq!(
//!         bob.node_properties(&alice_id)
//!             .get("displayName")
//!             .map(String::as_str),
//!         Some("Alice"),
//!     );
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod core;
pub mod knowledge;
pub mod sync;
pub mod transport;
pub mod wire;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;
    pub use crate::knowledge::*;
    pub use crate::sync::*;
    pub use crate::transport::{
        LinkDirectory, NeighborLink, RequestHandler, ResponseCallback,
    };
    pub use crate::wire::{PropertyUpdate, UpdateKind};
}

// Re-export commonly used items at crate root
pub use crate::core::{LinkError, NodeId, ProtocolError, SyncError, TokenError};
pub use crate::knowledge::{CompositeKey, NodeProperty, PropertyRegistry, SequenceClock};
pub use crate::sync::{
    ListenerHandle, PropertyListener, PropertySyncService, ReachablePropertyView, SyncConfig,
    ViewListener,
};
pub use crate::transport::{LinkDirectory, NeighborLink, RequestHandler};
pub use crate::wire::{PropertyUpdate, UpdateKind};

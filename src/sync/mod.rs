//! Property synchronization orchestration.
//!
//! Implements:
//! - Local publication with per-batch sequence numbering
//! - Initial (anti-entropy) exchange on new neighbor links
//! - Incremental update handling with relay/leaf-scoped forwarding
//! - Self-correction against stale remote copies of local state
//! - Ordered asynchronous listener notification
//! - A reachability-scoped view for higher-level consumers

mod listener;
mod service;
mod view;

pub use listener::{ListenerHandle, PropertyListener};
pub use service::{PropertySyncService, SyncConfig};
pub use view::{ReachablePropertyView, ViewListener};

//! Protocol constants.
//!
//! These values identify messages and tokens on the wire and MUST NOT be
//! changed without breaking interoperability with existing nodes.

// =============================================================================
// MESSAGE ROUTING
// =============================================================================

/// Message-type tag under which the property synchronization request handler
/// is registered with the messaging layer.
pub const MESSAGE_TYPE_PROPERTY_SYNC: &str = "nodeProperties";

// =============================================================================
// UPDATE SUBTYPES
// =============================================================================

/// Subtype token of an initial (anti-entropy) exchange message.
pub const SUBTYPE_INITIAL: &str = "init";

/// Subtype token of an incremental update message.
pub const SUBTYPE_INCREMENTAL: &str = "delta";

// =============================================================================
// PROPERTY TOKENS
// =============================================================================

/// Number of fields in an encoded property token
/// (origin node id, key, sequence number, value).
pub const PROPERTY_TOKEN_FIELDS: usize = 4;

/// Well-known property key carrying a node's human-readable display name.
pub const KEY_DISPLAY_NAME: &str = "displayName";

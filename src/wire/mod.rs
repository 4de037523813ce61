//! Wire encoding for property update messages.
//!
//! The wire format is textual: a message body is a list of parts joined by a
//! separator character, with an escape scheme so separators inside values do
//! not corrupt parsing. The first part is the update subtype, every further
//! part is one encoded property token (itself a 4-field joined token).
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ subtype : token₁ : token₂ : … : tokenₙ       │  ← message body
//! └──────────────────────────────────────────────┘
//!   tokenᵢ = origin : key : sequence_no : value    (separators escaped)
//! ```

mod escape;
mod message;

pub use escape::{escape_and_join, split_and_unescape};
pub use message::{PropertyUpdate, UpdateKind};

//! Node property knowledge: value types, sequence numbering, and the
//! in-memory registry with merge and anti-entropy diff operations.

mod clock;
mod property;
mod registry;

pub use clock::SequenceClock;
pub use property::{CompositeKey, NodeProperty};
pub use registry::PropertyRegistry;

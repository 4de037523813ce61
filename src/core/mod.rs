//! Core identifiers, constants, and error types (always included).

mod constants;
mod error;
mod id;

pub use constants::*;
pub use error::*;
pub use id::*;

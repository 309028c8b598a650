//! Shared kernel - identifiers, errors and results used across the crate

pub mod error;
pub mod events;
pub mod result;
pub mod value_objects;

pub use error::{CallError, ErrorClass};
pub use events::EventMetadata;
pub use result::Result;
pub use value_objects::*;

//! Domain layer - call sessions, their lifecycle rules and the agents that
//! speak on them

pub mod agent;
pub mod call;
pub mod shared;

// Re-export commonly used types
pub use shared::{CallError, ErrorClass, Result};

//! Application layer - call use cases
//!
//! Orchestrates the call registry, the carrier adapter and the speech
//! upstreams into the call lifecycle and the per-call media loop.

pub mod bridge;
pub mod controller;
pub mod conversation;
pub mod events;
pub mod pending;
pub mod sweeper;

pub use bridge::{AudioBridge, BridgeSettings};
pub use controller::{CallController, CallbackOutcome, ControllerSettings};
pub use events::InstrumentedSink;
pub use pending::PendingCallbacks;
pub use sweeper::spawn_sweeper;

//! Call bounded context - lifecycle of one outbound AI voice call

pub mod aggregate;
pub mod entity;
pub mod event;
pub mod registry;
pub mod value_object;

pub use aggregate::{CallSession, CallSnapshot, SynthesisHandle, TransportHandle};
pub use entity::{Speaker, TranscriptSegment};
pub use event::{CallEvent, CallEventSink, CallSummary, NullEventSink};
pub use registry::CallSessionRegistry;
pub use value_object::{CallState, EndReason};

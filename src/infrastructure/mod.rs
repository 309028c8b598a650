//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Carrier media: codec, framing, stream protocol, audio buffers
//! - Telephony gateway (carrier REST API, webhooks)
//! - Speech synthesis and transcription clients
//! - Agent directory and conversation model client
//! - Metrics

pub mod agent;
pub mod media;
pub mod speech;
pub mod telemetry;
pub mod telephony;

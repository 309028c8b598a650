//! Callwire - real-time outbound AI voice calls
//!
//! Places outbound phone calls through a carrier, bridges the answered
//! call's media stream to speech synthesis and transcription upstreams,
//! and lets an AI agent hold the conversation.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use domain::shared::error::{CallError, ErrorClass};
pub use domain::shared::result::Result;

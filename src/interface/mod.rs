//! Interface layer - external interfaces
//!
//! This layer handles:
//! - REST API endpoints
//! - Carrier webhooks and the media stream socket
//! - Call event streaming over WebSocket

pub mod api;

//! HTTP and WebSocket API

pub mod callback_handler;
pub mod calls_handler;
pub mod dto;
pub mod media_stream;
pub mod metrics_handler;
pub mod router;
pub mod state;
pub mod ws_handler;

pub use dto::{ApiError, ApiResponse};
pub use metrics_handler::init_metrics;
pub use router::build_router;
pub use state::{AppState, WebhookSettings};
pub use ws_handler::EventBroadcaster;

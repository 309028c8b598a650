//! Telephony Gateway Adapter: carrier REST calls, status vocabulary,
//! webhook authentication and call-control markup

pub mod gateway;
pub mod signature;
pub mod status;
pub mod twilio;
pub mod twiml;

pub use gateway::{PlaceCallRequest, TelephonyGateway};
pub use signature::SignatureValidator;
pub use status::{CarrierStatus, StatusTarget};
pub use twilio::TwilioGateway;

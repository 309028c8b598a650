//! Audio codecs spoken on the carrier media stream

pub mod g711;

pub use g711::{MulawCodec, MULAW_SILENCE};

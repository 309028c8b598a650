//! Carrier media: codec, framing, wire protocol and per-call audio buffers

pub mod codec;
pub mod frame;
pub mod inbound;
pub mod outbound;
pub mod protocol;
pub mod transport;
pub mod vad;
pub mod wav;

pub use codec::MulawCodec;
pub use frame::{FrameChunker, MediaFrame, FRAME_BYTES, FRAME_DURATION};
pub use inbound::{InboundAudioBuffer, InboundStats};
pub use outbound::{OutboundAudioQueue, OutboundItem, SequencedItem};
pub use protocol::{InboundMessage, OutboundMessage};
pub use transport::{CarrierEnd, ChannelTransport, MediaSink, MediaSource, MediaTransport, StreamEvent};
pub use vad::{UtteranceDetector, VadConfig, VadDecision};

//! Carrier audio frames
//!
//! One frame is 20 ms of 8 kHz mono μ-law: 160 bytes.

use super::codec::MULAW_SILENCE;
use bytes::{Bytes, BytesMut};
use std::time::Duration;

pub const SAMPLE_RATE: u32 = 8000;
pub const FRAME_DURATION: Duration = Duration::from_millis(20);
pub const FRAME_BYTES: usize = 160;

/// A frame of inbound caller audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFrame {
    /// Carrier-assigned chunk number, when present
    pub chunk: Option<u64>,
    pub payload: Bytes,
}

impl MediaFrame {
    pub fn new(payload: Bytes) -> Self {
        Self {
            chunk: None,
            payload,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_micros(self.payload.len() as u64 * 1_000_000 / u64::from(SAMPLE_RATE))
    }
}

/// Re-slices an arbitrary byte stream into whole carrier frames
#[derive(Debug)]
pub struct FrameChunker {
    pending: BytesMut,
    frame_size: usize,
}

impl FrameChunker {
    pub fn new(frame_size: usize) -> Self {
        Self {
            pending: BytesMut::with_capacity(frame_size * 2),
            frame_size: frame_size.max(1),
        }
    }

    /// Append bytes and return every complete frame now available
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.pending.extend_from_slice(data);

        let mut frames = Vec::with_capacity(self.pending.len() / self.frame_size);
        while self.pending.len() >= self.frame_size {
            frames.push(self.pending.split_to(self.frame_size).freeze());
        }
        frames
    }

    /// Emit the trailing partial frame padded with silence
    pub fn flush(&mut self) -> Option<Bytes> {
        if self.pending.is_empty() {
            return None;
        }
        self.pending.resize(self.frame_size, MULAW_SILENCE);
        Some(self.pending.split().freeze())
    }

    /// Discard the trailing partial frame
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

impl Default for FrameChunker {
    fn default() -> Self {
        Self::new(FRAME_BYTES)
    }
}

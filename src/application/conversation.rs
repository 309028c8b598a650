//! Caller utterance assembly
//!
//! Turns the stream of inbound carrier frames into transcription chunks.
//! Frames are only forwarded once the detector has opened an utterance; the
//! few frames that opened it are kept as pre-roll so the first syllable is
//! not lost.

use crate::infrastructure::media::vad::{UtteranceDetector, VadConfig, VadDecision};
use crate::infrastructure::media::FRAME_BYTES;
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;

/// Audio ready for the transcription relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtteranceChunk {
    pub audio: Bytes,
    pub end_of_utterance: bool,
}

pub struct UtteranceAssembler {
    detector: UtteranceDetector,
    pre_roll: VecDeque<Bytes>,
    pre_roll_frames: usize,
    pending: BytesMut,
    chunk_bytes: usize,
}

impl UtteranceAssembler {
    pub fn new(vad: VadConfig, chunk_frames: usize) -> Self {
        let pre_roll_frames = vad.open_voiced_frames;
        let chunk_bytes = chunk_frames.max(1) * FRAME_BYTES;
        Self {
            detector: UtteranceDetector::new(vad),
            pre_roll: VecDeque::with_capacity(pre_roll_frames),
            pre_roll_frames,
            pending: BytesMut::with_capacity(chunk_bytes),
            chunk_bytes,
        }
    }

    pub fn is_open(&self) -> bool {
        self.detector.is_open()
    }

    /// Feed one frame; returns a chunk when one is ready
    pub fn push(&mut self, frame: &[u8]) -> Option<UtteranceChunk> {
        match self.detector.observe(frame) {
            VadDecision::Idle => {
                if self.pre_roll_frames > 0 {
                    if self.pre_roll.len() == self.pre_roll_frames {
                        self.pre_roll.pop_front();
                    }
                    self.pre_roll.push_back(Bytes::copy_from_slice(frame));
                }
                None
            }
            VadDecision::Opened => {
                for earlier in self.pre_roll.drain(..) {
                    self.pending.extend_from_slice(&earlier);
                }
                self.pending.extend_from_slice(frame);
                self.take_full_chunk()
            }
            VadDecision::Speech => {
                self.pending.extend_from_slice(frame);
                self.take_full_chunk()
            }
            VadDecision::Closed(_) => {
                self.pending.extend_from_slice(frame);
                Some(self.take_final())
            }
        }
    }

    /// Add a frame to the open utterance without emitting anything
    ///
    /// Used while tearing down, when frames are drained in bulk.
    pub fn absorb(&mut self, frame: &[u8]) {
        if self.is_open() {
            self.pending.extend_from_slice(frame);
        }
    }

    /// Close an utterance cut short by the end of the call
    pub fn flush(&mut self) -> Option<UtteranceChunk> {
        if !self.is_open() {
            return None;
        }
        self.detector.reset();
        Some(self.take_final())
    }

    fn take_full_chunk(&mut self) -> Option<UtteranceChunk> {
        if self.pending.len() < self.chunk_bytes {
            return None;
        }
        Some(UtteranceChunk {
            audio: self.pending.split().freeze(),
            end_of_utterance: false,
        })
    }

    fn take_final(&mut self) -> UtteranceChunk {
        self.pre_roll.clear();
        UtteranceChunk {
            audio: self.pending.split().freeze(),
            end_of_utterance: true,
        }
    }
}

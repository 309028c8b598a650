//! G.711 μ-law codec
//!
//! The carrier streams 8 kHz mono μ-law in both directions. Synthesized
//! speech is requested in the same format, so decoding is only needed for
//! voice activity detection and for transcription uploads.

use bytes::Bytes;

const BIAS: i32 = 0x84;
const CLIP: i32 = 32635;

/// Encoded value of a zero sample
pub const MULAW_SILENCE: u8 = 0xFF;

/// μ-law (PCMU) codec
#[derive(Debug, Clone, Copy, Default)]
pub struct MulawCodec;

impl MulawCodec {
    pub fn new() -> Self {
        Self
    }

    /// Encode 16-bit linear PCM samples
    pub fn encode(&self, pcm: &[i16]) -> Bytes {
        pcm.iter().map(|&s| encode_sample(s)).collect::<Vec<u8>>().into()
    }

    /// Decode μ-law bytes to 16-bit linear PCM
    pub fn decode(&self, encoded: &[u8]) -> Vec<i16> {
        encoded.iter().map(|&b| decode_sample(b)).collect()
    }
}

pub fn encode_sample(sample: i16) -> u8 {
    let mut magnitude = i32::from(sample);
    let sign = if magnitude < 0 {
        magnitude = -magnitude;
        0x80
    } else {
        0x00
    };

    let magnitude = magnitude.min(CLIP) + BIAS;

    // Segment = position of the highest set bit above bit 7
    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && magnitude & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }

    let mantissa = (magnitude >> (exponent + 3)) & 0x0F;
    !((sign | (exponent << 4) | mantissa) as u8)
}

pub fn decode_sample(encoded: u8) -> i16 {
    let value = !encoded;
    let sign = value & 0x80;
    let exponent = i32::from((value >> 4) & 0x07);
    let mantissa = i32::from(value & 0x0F);

    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;
    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

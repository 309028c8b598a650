//! WAV container for transcription uploads

use bytes::{BufMut, Bytes, BytesMut};

const HEADER_LEN: usize = 44;

/// WAV audio format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl WavFormat {
    /// 8 kHz mono 16-bit PCM, the decoded form of a carrier stream
    pub fn telephony_pcm16() -> Self {
        Self {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
        }
    }

    pub fn bytes_per_frame(&self) -> usize {
        usize::from(self.bits_per_sample / 8) * usize::from(self.channels)
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.bytes_per_frame() as u32
    }
}

/// Wrap 16-bit PCM samples in a canonical RIFF/WAVE container
pub fn encode_pcm16(format: WavFormat, samples: &[i16]) -> Bytes {
    let data_len = (samples.len() * 2) as u32;
    let mut out = BytesMut::with_capacity(HEADER_LEN + samples.len() * 2);

    out.put_slice(b"RIFF");
    out.put_u32_le(36 + data_len);
    out.put_slice(b"WAVE");

    out.put_slice(b"fmt ");
    out.put_u32_le(16);
    out.put_u16_le(1); // PCM
    out.put_u16_le(format.channels);
    out.put_u32_le(format.sample_rate);
    out.put_u32_le(format.byte_rate());
    out.put_u16_le(format.bytes_per_frame() as u16);
    out.put_u16_le(format.bits_per_sample);

    out.put_slice(b"data");
    out.put_u32_le(data_len);
    for sample in samples {
        out.put_i16_le(*sample);
    }

    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let wav = encode_pcm16(WavFormat::telephony_pcm16(), &[0, 1, -1, 256]);

        assert_eq!(wav.len(), HEADER_LEN + 8);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u32::from_le_bytes([wav[4], wav[5], wav[6], wav[7]]), 36 + 8);
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 1);
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 8000);
        assert_eq!(u32::from_le_bytes([wav[28], wav[29], wav[30], wav[31]]), 16000);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 8);
        assert_eq!(&wav[44..46], &[0, 0]);
        assert_eq!(&wav[48..50], &[0xFF, 0xFF]);
    }

    #[test]
    fn test_empty_audio() {
        let wav = encode_pcm16(WavFormat::telephony_pcm16(), &[]);
        assert_eq!(wav.len(), HEADER_LEN);
    }
}

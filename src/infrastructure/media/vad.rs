//! Energy-based utterance detection on carrier frames
//!
//! Opens an utterance after a run of voiced frames and closes it after a
//! span of silence or when it grows past a maximum length.

use super::codec::g711::decode_sample;
use super::frame::SAMPLE_RATE;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Number of voiced 20 ms frames required to open an utterance
    pub open_voiced_frames: usize,
    /// Milliseconds of silence that close an utterance
    pub close_silence_ms: u64,
    /// Maximum utterance length in milliseconds
    pub max_utterance_ms: u64,
    /// RMS level (16-bit PCM scale) above which a frame counts as voiced
    pub energy_threshold: f64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            open_voiced_frames: 3,
            close_silence_ms: 700,
            max_utterance_ms: 15_000,
            energy_threshold: 400.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Silence,
    MaxLength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    /// No utterance in progress
    Idle,
    /// The utterance just opened with this frame
    Opened,
    /// Frame belongs to the open utterance
    Speech,
    /// Frame closes the open utterance
    Closed(CloseReason),
}

#[derive(Debug)]
pub struct UtteranceDetector {
    cfg: VadConfig,
    voiced_frames: usize,
    silent_ms: u64,
    utterance_ms: Option<u64>,
}

impl UtteranceDetector {
    pub fn new(cfg: VadConfig) -> Self {
        Self {
            cfg,
            voiced_frames: 0,
            silent_ms: 0,
            utterance_ms: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.utterance_ms.is_some()
    }

    /// Feed one μ-law frame
    pub fn observe(&mut self, frame: &[u8]) -> VadDecision {
        let frame_ms = frame.len() as u64 * 1000 / u64::from(SAMPLE_RATE);
        let voiced = rms(frame) >= self.cfg.energy_threshold;

        if voiced {
            self.voiced_frames += 1;
            self.silent_ms = 0;
        } else {
            self.silent_ms += frame_ms;
            if !self.is_open() {
                self.voiced_frames = 0;
            }
        }

        let Some(utterance_ms) = self.utterance_ms.as_mut() else {
            if self.voiced_frames >= self.cfg.open_voiced_frames {
                debug!("Opening utterance after {} voiced frames", self.voiced_frames);
                self.utterance_ms = Some(frame_ms);
                return VadDecision::Opened;
            }
            return VadDecision::Idle;
        };

        *utterance_ms += frame_ms;
        let length = *utterance_ms;

        if self.silent_ms >= self.cfg.close_silence_ms {
            self.reset();
            VadDecision::Closed(CloseReason::Silence)
        } else if length >= self.cfg.max_utterance_ms {
            debug!("Closing utterance at maximum length: {}ms", length);
            self.reset();
            VadDecision::Closed(CloseReason::MaxLength)
        } else {
            VadDecision::Speech
        }
    }

    pub fn reset(&mut self) {
        self.voiced_frames = 0;
        self.silent_ms = 0;
        self.utterance_ms = None;
    }
}

/// Root-mean-square level of a μ-law frame on the 16-bit PCM scale
pub fn rms(frame: &[u8]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f64 = frame
        .iter()
        .map(|&b| {
            let s = f64::from(decode_sample(b));
            s * s
        })
        .sum();
    (sum / frame.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::media::codec::g711::encode_sample;
    use crate::infrastructure::media::codec::MULAW_SILENCE;
    use crate::infrastructure::media::frame::FRAME_BYTES;

    fn silence() -> Vec<u8> {
        vec![MULAW_SILENCE; FRAME_BYTES]
    }

    fn tone() -> Vec<u8> {
        (0..FRAME_BYTES)
            .map(|i| encode_sample(if i % 2 == 0 { 4000 } else { -4000 }))
            .collect()
    }

    fn detector() -> UtteranceDetector {
        UtteranceDetector::new(VadConfig {
            open_voiced_frames: 2,
            close_silence_ms: 60,
            max_utterance_ms: 200,
            energy_threshold: 400.0,
        })
    }

    #[test]
    fn test_rms_levels() {
        assert_eq!(rms(&silence()), 0.0);
        assert!(rms(&tone()) > 3000.0);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_silence_stays_idle() {
        let mut vad = detector();
        for _ in 0..20 {
            assert_eq!(vad.observe(&silence()), VadDecision::Idle);
        }
    }

    #[test]
    fn test_open_and_close_on_silence() {
        let mut vad = detector();
        assert_eq!(vad.observe(&tone()), VadDecision::Idle);
        assert_eq!(vad.observe(&tone()), VadDecision::Opened);
        assert_eq!(vad.observe(&tone()), VadDecision::Speech);
        assert_eq!(vad.observe(&silence()), VadDecision::Speech);
        assert_eq!(vad.observe(&silence()), VadDecision::Speech);
        assert_eq!(
            vad.observe(&silence()),
            VadDecision::Closed(CloseReason::Silence)
        );
        assert!(!vad.is_open());
    }

    #[test]
    fn test_isolated_click_does_not_open() {
        let mut vad = detector();
        assert_eq!(vad.observe(&tone()), VadDecision::Idle);
        assert_eq!(vad.observe(&silence()), VadDecision::Idle);
        assert_eq!(vad.observe(&tone()), VadDecision::Idle);
    }

    #[test]
    fn test_close_at_max_length() {
        let mut vad = detector();
        vad.observe(&tone());
        assert_eq!(vad.observe(&tone()), VadDecision::Opened);

        let mut closed = None;
        for _ in 0..20 {
            if let VadDecision::Closed(reason) = vad.observe(&tone()) {
                closed = Some(reason);
                break;
            }
        }
        assert_eq!(closed, Some(CloseReason::MaxLength));
    }
}

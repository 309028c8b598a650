//! Call entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who spoke a transcript segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Caller,
    Agent,
}

/// One utterance in the call transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl TranscriptSegment {
    pub fn caller(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Caller,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Agent,
            text: text.into(),
            at: Utc::now(),
        }
    }

    /// Segment recorded for an utterance whose transcription failed
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

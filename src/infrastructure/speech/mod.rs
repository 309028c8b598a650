//! Speech upstreams: synthesis of agent audio and transcription of caller audio

pub mod synthesis;
pub mod transcription;

pub use synthesis::{
    AudioByteStream, ElevenLabsSynthesizer, SpeechSynthesisClient, SpeechSynthesizer,
    SynthesisSettings, SynthesisStream,
};
pub use transcription::{
    AudioChunk, TranscriptFragment, TranscriptionEngine, TranscriptionRelay, WhisperEngine,
};

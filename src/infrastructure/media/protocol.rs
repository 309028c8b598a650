//! Carrier media stream wire format (Twilio Media Streams)
//!
//! Every message is a JSON text frame tagged by `event`. Only the fields
//! the bridge uses are modelled; unknown fields are ignored.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::frame::MediaFrame;
use crate::domain::shared::CallError;

/// Messages sent by the carrier
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum InboundMessage {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },
    Start {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        start: StartMetadata,
    },
    Media {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        media: MediaPayload,
    },
    Mark {
        mark: MarkPayload,
    },
    Dtmf {
        dtmf: DtmfPayload,
    },
    Stop {},
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMetadata {
    pub call_sid: String,
    #[serde(default)]
    pub stream_sid: Option<String>,
    #[serde(default)]
    pub media_format: Option<MediaFormat>,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaPayload {
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkPayload {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DtmfPayload {
    pub digit: String,
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self, CallError> {
        serde_json::from_str(text)
            .map_err(|e| CallError::Transport(format!("malformed stream message: {}", e)))
    }
}

impl MediaPayload {
    /// Caller audio; the outbound track is our own audio echoed back
    pub fn is_inbound(&self) -> bool {
        self.track.as_deref().map_or(true, |t| t.starts_with("inbound"))
    }

    pub fn to_frame(&self) -> Result<MediaFrame, CallError> {
        let payload = STANDARD
            .decode(self.payload.as_bytes())
            .map_err(|e| CallError::Transport(format!("invalid media payload: {}", e)))?;

        Ok(MediaFrame {
            chunk: self.chunk.as_deref().and_then(|c| c.parse().ok()),
            payload: Bytes::from(payload),
        })
    }
}

/// Messages sent to the carrier
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundMessage {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: MarkPayload,
    },
    /// Drop any audio the carrier has buffered for playback
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

impl OutboundMessage {
    pub fn media(stream_sid: &str, audio: &[u8]) -> Self {
        OutboundMessage::Media {
            stream_sid: stream_sid.to_string(),
            media: OutboundMedia {
                payload: STANDARD.encode(audio),
            },
        }
    }

    pub fn mark(stream_sid: &str, name: impl Into<String>) -> Self {
        OutboundMessage::Mark {
            stream_sid: stream_sid.to_string(),
            mark: MarkPayload { name: name.into() },
        }
    }

    pub fn clear(stream_sid: &str) -> Self {
        OutboundMessage::Clear {
            stream_sid: stream_sid.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, CallError> {
        serde_json::to_string(self).map_err(|e| CallError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_start() {
        let text = json!({
            "event": "start",
            "sequenceNumber": "1",
            "streamSid": "MZ18ad3ab5a668481ce02b83e7395059f0",
            "start": {
                "accountSid": "AC123",
                "streamSid": "MZ18ad3ab5a668481ce02b83e7395059f0",
                "callSid": "CA123",
                "tracks": ["inbound"],
                "mediaFormat": { "encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1 },
                "customParameters": { "agentId": "agent-1" }
            }
        })
        .to_string();

        match InboundMessage::parse(&text).unwrap() {
            InboundMessage::Start { stream_sid, start } => {
                assert_eq!(stream_sid, "MZ18ad3ab5a668481ce02b83e7395059f0");
                assert_eq!(start.call_sid, "CA123");
                assert_eq!(start.media_format.unwrap().sample_rate, 8000);
                assert_eq!(start.custom_parameters.get("agentId").unwrap(), "agent-1");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_media_frame() {
        let text = json!({
            "event": "media",
            "sequenceNumber": "3",
            "streamSid": "MZ1",
            "media": { "track": "inbound", "chunk": "2", "timestamp": "40", "payload": "//8A" }
        })
        .to_string();

        match InboundMessage::parse(&text).unwrap() {
            InboundMessage::Media { media, .. } => {
                assert!(media.is_inbound());
                let frame = media.to_frame().unwrap();
                assert_eq!(frame.chunk, Some(2));
                assert_eq!(&frame.payload[..], &[0xFF, 0xFF, 0x00]);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_connected_stop_mark() {
        assert!(matches!(
            InboundMessage::parse(r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#),
            Ok(InboundMessage::Connected { .. })
        ));
        assert!(matches!(
            InboundMessage::parse(r#"{"event":"stop","streamSid":"MZ1","stop":{"callSid":"CA1"}}"#),
            Ok(InboundMessage::Stop {})
        ));
        assert!(matches!(
            InboundMessage::parse(r#"{"event":"mark","streamSid":"MZ1","mark":{"name":"turn-1"}}"#),
            Ok(InboundMessage::Mark { mark }) if mark.name == "turn-1"
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(InboundMessage::parse("not json").is_err());
        assert!(InboundMessage::parse(r#"{"event":"unknown"}"#).is_err());
    }

    #[test]
    fn test_outbound_shapes() {
        let media = OutboundMessage::media("MZ1", &[0xFF, 0xFF, 0x00]).to_json().unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&media).unwrap(),
            json!({"event": "media", "streamSid": "MZ1", "media": {"payload": "//8A"}})
        );

        let clear = OutboundMessage::clear("MZ1").to_json().unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&clear).unwrap(),
            json!({"event": "clear", "streamSid": "MZ1"})
        );

        let mark = OutboundMessage::mark("MZ1", "turn-1").to_json().unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&mark).unwrap(),
            json!({"event": "mark", "streamSid": "MZ1", "mark": {"name": "turn-1"}})
        );
    }
}

//! Server → client message envelope.
//!
//! Inbound messages are JSON objects tagged by `type`:
//! - `{"type": "transcript", "text": "..."}`: what the user said
//! - `{"type": "ai_response", "text": "..."}`: what the agent answered
//! - `{"type": "audio_chunk", "audio": "<base64 PCM16>"}`: synthesized speech
//!
//! Outbound traffic is raw binary PCM16 and has no envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "transcript")]
    Transcript { text: String },

    #[serde(rename = "ai_response")]
    AiResponse { text: String },

    #[serde(rename = "audio_chunk")]
    AudioChunk { audio: String },
}

impl InboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Transcript { .. } => "transcript",
            InboundMessage::AiResponse { .. } => "ai_response",
            InboundMessage::AudioChunk { .. } => "audio_chunk",
        }
    }
}

const KNOWN_KINDS: [&str; 3] = ["transcript", "ai_response", "audio_chunk"];

/// Parse one inbound frame, separating unknown kinds from malformed JSON
pub fn parse_inbound(raw: &str) -> Result<InboundMessage, ProtocolError> {
    let value: Value = serde_json::from_str(raw)?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingKind)?;

    if !KNOWN_KINDS.contains(&kind) {
        return Err(ProtocolError::UnrecognizedKind(kind.to_string()));
    }

    Ok(serde_json::from_value(value)?)
}

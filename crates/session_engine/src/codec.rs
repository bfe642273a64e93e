use serde_json::Value;
use shared::{
    error::SessionError,
    protocol::{ClientCommand, ServerEvent},
};
use thiserror::Error;

pub type Frame = String;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty frame")]
    Empty,
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
    #[error("frame is not valid JSON: {0}")]
    Malformed(String),
    #[error("frame has no string `type` field")]
    MissingType,
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("invalid payload for `{kind}`: {reason}")]
    InvalidPayload { kind: String, reason: String },
}

impl From<DecodeError> for SessionError {
    fn from(value: DecodeError) -> Self {
        SessionError::Decode(value.to_string())
    }
}

pub fn decode(raw: &str, max_len: usize) -> Result<ClientCommand, DecodeError> {
    if raw.trim().is_empty() {
        return Err(DecodeError::Empty);
    }
    if raw.len() > max_len {
        return Err(DecodeError::TooLarge {
            len: raw.len(),
            max: max_len,
        });
    }

    let value: Value =
        serde_json::from_str(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_string();
    if !ClientCommand::TYPES.contains(&kind.as_str()) {
        return Err(DecodeError::UnknownType(kind));
    }

    serde_json::from_value(value).map_err(|e| DecodeError::InvalidPayload {
        kind,
        reason: e.to_string(),
    })
}

/// Binary frames are accepted when they carry UTF-8 JSON.
pub fn decode_bytes(raw: &[u8], max_len: usize) -> Result<ClientCommand, DecodeError> {
    if raw.len() > max_len {
        return Err(DecodeError::TooLarge {
            len: raw.len(),
            max: max_len,
        });
    }
    let text = std::str::from_utf8(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    decode(text, max_len)
}

pub fn encode(event: &ServerEvent) -> Result<Frame, serde_json::Error> {
    serde_json::to_string(event)
}

#[cfg(test)]
#[path = "tests/codec_tests.rs"]
mod tests;

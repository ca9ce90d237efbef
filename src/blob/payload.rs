// ABOUTME: Decoding of image column values into raw bytes
// ABOUTME: Exactly three accepted encodings, everything else is a typed error

use crate::error::PayloadError;
use base64::Engine;
use rusqlite::types::Value;
use serde::Deserialize;

/// An image value as found in a `*Url` column before extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryPayload {
    /// Native SQLite BLOB
    RawBytes(Vec<u8>),
    /// Serialized buffer object `{"type":"Buffer","data":[...]}` stored as text
    WrappedBytes(Vec<u8>),
    /// Base64 text, optionally a `data:<mime>;base64,` URI
    Base64Text(String),
}

#[derive(Deserialize)]
struct WrappedBuffer {
    #[serde(rename = "type")]
    kind: String,
    data: Vec<u8>,
}

impl BinaryPayload {
    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        match value {
            Value::Blob(bytes) => Ok(Self::RawBytes(bytes)),
            Value::Text(text) => {
                if text.trim_start().starts_with('{') {
                    let wrapped: WrappedBuffer = serde_json::from_str(&text)
                        .map_err(|e| PayloadError::UnsupportedWrapper(e.to_string()))?;
                    if wrapped.kind != "Buffer" {
                        return Err(PayloadError::UnsupportedWrapper(format!(
                            "type '{}' is not 'Buffer'",
                            wrapped.kind
                        )));
                    }
                    Ok(Self::WrappedBytes(wrapped.data))
                } else {
                    Ok(Self::Base64Text(text))
                }
            }
            Value::Integer(_) => Err(PayloadError::UnsupportedType("integer")),
            Value::Real(_) => Err(PayloadError::UnsupportedType("real")),
            Value::Null => Err(PayloadError::UnsupportedType("null")),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::RawBytes(_) => "raw",
            Self::WrappedBytes(_) => "wrapped",
            Self::Base64Text(_) => "base64",
        }
    }

    /// Normalize to raw bytes
    pub fn normalize(self) -> Result<Vec<u8>, PayloadError> {
        let bytes = match self {
            Self::RawBytes(bytes) | Self::WrappedBytes(bytes) => bytes,
            Self::Base64Text(text) => decode_base64(&text)?,
        };

        if bytes.is_empty() {
            return Err(PayloadError::Empty);
        }
        Ok(bytes)
    }
}

fn decode_base64(text: &str) -> Result<Vec<u8>, PayloadError> {
    let trimmed = text.trim();
    let body = match trimmed.strip_prefix("data:") {
        Some(rest) => rest.split_once(";base64,").map(|(_, b)| b).unwrap_or(rest),
        None => trimmed,
    };

    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
}

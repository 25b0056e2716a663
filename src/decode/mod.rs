pub mod binary;
pub mod json;

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::snapshot::SnapshotSet;

pub use self::binary::BinaryDecoder;
pub use self::json::JsonDecoder;

/// Errors that can occur while decoding a payload.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload is empty")]
    Empty,

    #[error("unsupported payload version: {version}")]
    UnsupportedVersion { version: u8 },

    #[error("reading {field}: unexpected end of data at offset {offset}")]
    Truncated { field: &'static str, offset: usize },

    #[error("reading {field}: invalid UTF-8")]
    InvalidUtf8 { field: &'static str },

    #[error("{field} length {len} exceeds remaining {remaining} bytes")]
    LengthOverflow {
        field: &'static str,
        len: usize,
        remaining: usize,
    },

    #[error("{remaining} trailing bytes after last metric")]
    TrailingBytes { remaining: usize },

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Capability to turn one raw payload into a snapshot set.
pub trait Decode {
    /// Returns the decoder name for logging.
    fn name(&self) -> &'static str;

    /// Decodes a payload. Never retains a borrow of `payload`.
    fn decode(&self, payload: &[u8]) -> Result<SnapshotSet, DecodeError>;
}

/// Decoder variant selected from configuration.
///
/// Enum dispatch keeps the ingest hot path free of trait objects.
#[derive(Debug, Clone, Copy)]
pub enum Decoder {
    Binary(BinaryDecoder),
    Json(JsonDecoder),
}

impl Decoder {
    pub fn from_kind(kind: DecoderKind) -> Self {
        match kind {
            DecoderKind::Binary => Self::Binary(BinaryDecoder),
            DecoderKind::Json => Self::Json(JsonDecoder),
        }
    }
}

impl Decode for Decoder {
    fn name(&self) -> &'static str {
        match self {
            Self::Binary(d) => d.name(),
            Self::Json(d) => d.name(),
        }
    }

    fn decode(&self, payload: &[u8]) -> Result<SnapshotSet, DecodeError> {
        match self {
            Self::Binary(d) => d.decode(payload),
            Self::Json(d) => d.decode(payload),
        }
    }
}

/// Configured payload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderKind {
    #[default]
    Binary,
    Json,
}

impl DecoderKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for DecoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecoderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary" => Ok(Self::Binary),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown decoder: {other} (expected binary or json)")),
        }
    }
}

//! Pluggable encode/decode strategies for call requests and responses.

use crate::errors::AutomockError;
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{Read, Write};
use std::sync::Arc;

/// Turns call arguments, results and target errors into bytes and back.
///
/// Implementations must be deterministic: equal values must encode to
/// identical bytes, since recorded requests are compared byte for byte.
pub trait Codec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, AutomockError>;
    fn decode(&self, bytes: &[u8]) -> Result<Value, AutomockError>;
}

/// Compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, AutomockError> {
        serde_json::to_vec(value).map_err(|e| AutomockError::Codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, AutomockError> {
        serde_json::from_slice(bytes).map_err(|e| AutomockError::Codec(e.to_string()))
    }
}

/// Gzip-compressed compact JSON. The default codec.
///
/// The gzip header carries no timestamp, so output is stable across runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipJsonCodec;

impl Codec for GzipJsonCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, AutomockError> {
        let raw = JsonCodec.encode(value)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&raw)
            .map_err(|e| AutomockError::Codec(format!("compression failed: {e}")))?;
        encoder
            .finish()
            .map_err(|e| AutomockError::Codec(format!("compression finish failed: {e}")))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, AutomockError> {
        let mut decoder = GzDecoder::new(bytes);
        let mut raw = Vec::new();
        decoder
            .read_to_end(&mut raw)
            .map_err(|e| AutomockError::Codec(format!("decompression failed: {e}")))?;
        JsonCodec.decode(&raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecKind {
    #[default]
    GzipJson,
    Json,
}

impl CodecKind {
    pub fn build(self) -> Arc<dyn Codec> {
        match self {
            Self::GzipJson => Arc::new(GzipJsonCodec),
            Self::Json => Arc::new(JsonCodec),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GzipJson => "gzip_json",
            Self::Json => "json",
        }
    }
}

pub fn default_codec() -> Arc<dyn Codec> {
    CodecKind::default().build()
}

//! The JSON frame contract the fetcher pushes and the gateway consumes
//! (spec §6): `{"kind": "realtime"|"static", "fetched_at": <epoch_float>,
//! "gzipped_data": "<hex>"}`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Realtime,
    Static,
}

impl FrameKind {
    pub fn topic(self) -> &'static str {
        match self {
            FrameKind::Realtime => "realtime-snapshot",
            FrameKind::Static => "static-snapshot",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushFrame {
    pub kind: FrameKind,
    pub fetched_at: f64,
    /// Lowercase hex-encoded gzip bytes; empty string for a dedup marker row
    /// (never published, only archived).
    pub gzipped_data: String,
}

impl PushFrame {
    pub fn new(kind: FrameKind, fetched_at: f64, gzipped: &[u8]) -> Self {
        Self {
            kind,
            fetched_at,
            gzipped_data: hex::encode(gzipped),
        }
    }

    pub fn decode_gzipped(&self) -> Result<Vec<u8>, crate::error::CoreError> {
        Ok(hex::decode(&self.gzipped_data)?)
    }

    pub fn to_text(&self) -> Result<String, crate::error::CoreError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_text(text: &str) -> Result<Self, crate::error::CoreError> {
        Ok(serde_json::from_str(text)?)
    }
}

// Copyright 2025 TraceLens Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! # TraceLens Ingest
//!
//! Converts the two accepted wire formats into canonical traces:
//!
//! - **OTLP/JSON span trees** (`resourceSpans` at the top level)
//! - **Simplified SDK logs** (`traces` at the top level)
//!
//! Detection is an explicit two-attempt decode, not key probing: a payload is
//! decoded as the span-tree shape first, then as the log shape, and anything
//! that fits neither is rejected with [`IngestError::UnrecognizedFormat`].
//!
//! Both adapters are pure functions of `(payload, received_at)`. The
//! ingestion instant is passed in explicitly because the SDK format falls
//! back to it for missing timestamps; callers pass `Utc::now()`, tests pass a
//! frozen instant.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracelens_core::Trace;

pub mod otlp;
pub mod sdk;

pub use otlp::{adapt_otlp, ExportTraceRequest};
pub use sdk::{adapt_sdk, SdkLogBatch, SdkRecord};

/// Errors produced while decoding an ingestion payload.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed JSON payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unrecognized payload format: expected resourceSpans or traces")]
    UnrecognizedFormat,
}

/// A decoded ingestion payload, tagged by wire format.
#[derive(Debug)]
pub enum TracePayload {
    Otlp(ExportTraceRequest),
    Sdk(SdkLogBatch),
}

impl TracePayload {
    /// Decode raw bytes into one of the two supported shapes.
    ///
    /// Unparseable JSON is [`IngestError::Malformed`]; well-formed JSON that
    /// matches neither shape is [`IngestError::UnrecognizedFormat`]. In both
    /// cases the whole batch is rejected, never partially ingested.
    pub fn decode(bytes: &[u8]) -> Result<Self, IngestError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;

        if let Ok(request) = serde_json::from_value::<ExportTraceRequest>(value.clone()) {
            return Ok(TracePayload::Otlp(request));
        }
        if let Ok(batch) = serde_json::from_value::<SdkLogBatch>(value) {
            return Ok(TracePayload::Sdk(batch));
        }

        Err(IngestError::UnrecognizedFormat)
    }

    /// Convert the payload into canonical traces. `batch_seq` disambiguates
    /// SDK batches adapted within the same millisecond; OTLP spans carry
    /// their own ids and ignore it.
    pub fn into_traces(self, received_at: DateTime<Utc>, batch_seq: u64) -> Vec<Trace> {
        match self {
            TracePayload::Otlp(request) => adapt_otlp(request, received_at),
            TracePayload::Sdk(batch) => adapt_sdk(batch, received_at, batch_seq),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_detects_otlp_shape() {
        let body = br#"{"resourceSpans": []}"#;
        assert!(matches!(
            TracePayload::decode(body).unwrap(),
            TracePayload::Otlp(_)
        ));
    }

    #[test]
    fn test_decode_detects_sdk_shape() {
        let body = br#"{"traces": []}"#;
        assert!(matches!(
            TracePayload::decode(body).unwrap(),
            TracePayload::Sdk(_)
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_shape() {
        let body = br#"{"spans": []}"#;
        assert!(matches!(
            TracePayload::decode(body),
            Err(IngestError::UnrecognizedFormat)
        ));
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        let body = br#"{"resourceSpans": "#;
        assert!(matches!(
            TracePayload::decode(body),
            Err(IngestError::Malformed(_))
        ));
    }
}

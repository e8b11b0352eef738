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

//! Simplified SDK log adapter
//!
//! A flat array of model-call records; every record becomes one CLIENT-kind
//! trace. Records without a timestamp fall back to the ingestion instant,
//! which is why `received_at` is an explicit parameter rather than a hidden
//! `Utc::now()` call.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use tracelens_core::{ContextText, LlmCall, SpanKind, Trace, TraceSource, TraceStatus};

/// Top-level SDK log payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdkLogBatch {
    pub traces: Vec<SdkRecord>,
}

/// One logged model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkRecord {
    pub model: String,
    pub provider: String,
    pub input: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextText>,
    #[serde(default)]
    pub prompt_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens: Option<u64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

/// Adapt an SDK log batch into canonical traces.
///
/// Span ids are synthesized from the record's position (`span-{index}`); the
/// batch shares one trace id derived from the ingestion instant and a
/// caller-supplied batch sequence number, so two batches arriving in the
/// same millisecond still get distinct record ids. A record without a
/// timestamp starts at `received_at`, so its duration collapses to the
/// explicit `durationMs` field (0 when that is absent too).
pub fn adapt_sdk(batch: SdkLogBatch, received_at: DateTime<Utc>, batch_seq: u64) -> Vec<Trace> {
    let trace_id = format!("sdk-{}-{}", received_at.timestamp_millis(), batch_seq);

    let traces: Vec<Trace> = batch
        .traces
        .into_iter()
        .enumerate()
        .map(|(index, record)| convert_record(record, index, &trace_id, received_at))
        .collect();

    debug!(count = traces.len(), "adapted sdk payload");
    traces
}

fn convert_record(
    record: SdkRecord,
    index: usize,
    trace_id: &str,
    received_at: DateTime<Utc>,
) -> Trace {
    let span_id = format!("span-{}", index);
    let duration_ms = record.duration_ms.unwrap_or(0);
    let start_time = record.timestamp.unwrap_or(received_at);
    let end_time = start_time + Duration::milliseconds(duration_ms as i64);

    let mut llm = LlmCall::new(
        record.provider.clone(),
        record.model.clone(),
        record.prompt_tokens.unwrap_or(0),
        record.completion_tokens.unwrap_or(0),
        None,
    );
    llm.input = Some(record.input);
    llm.output = Some(record.output);
    llm.context = record.context;
    llm.temperature = record.temperature;

    Trace {
        id: format!("{}-{}", trace_id, span_id),
        trace_id: trace_id.to_string(),
        span_id,
        parent_span_id: None,
        name: record.model,
        kind: SpanKind::Client,
        start_time,
        end_time,
        duration_ms,
        status: TraceStatus::Unset,
        attributes: record.metadata.unwrap_or_default(),
        llm: Some(llm),
        evaluation: None,
        received_at,
        source: TraceSource::Sdk,
    }
}

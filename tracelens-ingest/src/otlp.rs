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

//! OTLP/JSON span-tree adapter
//!
//! Flattens the resource → scope → span nesting into canonical traces.
//! Timestamps are 64-bit nanosecond epoch values which OTLP/JSON encodes as
//! strings; the duration subtraction is done in i128 so epoch-scale values
//! never lose precision to float rounding.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use tracing::debug;

use tracelens_core::{ContextText, LlmCall, SpanKind, Trace, TraceSource, TraceStatus};

/// Attribute names recognized by the LLM-field extraction, checked in
/// priority order (generic `llm.*` first, then the `gen_ai.*` family).
pub mod attrs {
    pub const LLM_VENDOR: &str = "llm.vendor";
    pub const LLM_MODEL: &str = "llm.model";
    pub const LLM_PROMPT_TOKENS: &str = "llm.prompt_tokens";
    pub const LLM_COMPLETION_TOKENS: &str = "llm.completion_tokens";
    pub const LLM_TOTAL_TOKENS: &str = "llm.total_tokens";
    pub const LLM_INPUT: &str = "llm.input";
    pub const LLM_OUTPUT: &str = "llm.output";
    pub const LLM_TEMPERATURE: &str = "llm.temperature";

    pub const GEN_AI_SYSTEM: &str = "gen_ai.system";
    pub const GEN_AI_REQUEST_MODEL: &str = "gen_ai.request.model";
    pub const GEN_AI_RESPONSE_MODEL: &str = "gen_ai.response.model";
    pub const GEN_AI_INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";
    pub const GEN_AI_OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";
    pub const GEN_AI_TOTAL_TOKENS: &str = "gen_ai.usage.total_tokens";
    pub const GEN_AI_PROMPT: &str = "gen_ai.prompt";
    pub const GEN_AI_COMPLETION: &str = "gen_ai.completion";
    pub const GEN_AI_TEMPERATURE: &str = "gen_ai.request.temperature";

    /// Alternate names for retrieved/grounding context, in priority order.
    pub const CONTEXT_KEYS: [&str; 4] = [
        "llm.context",
        "rag.context",
        "retrieval.context",
        "gen_ai.context",
    ];
}

/// Top-level OTLP/JSON export request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTraceRequest {
    pub resource_spans: Vec<ResourceSpans>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpans {
    #[serde(default)]
    pub scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeSpans {
    #[serde(default)]
    pub spans: Vec<OtlpSpan>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtlpSpan {
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: Option<i64>,
    #[serde(default, deserialize_with = "u64_from_string_or_number")]
    pub start_time_unix_nano: u64,
    #[serde(default, deserialize_with = "u64_from_string_or_number")]
    pub end_time_unix_nano: u64,
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
    #[serde(default)]
    pub status: Option<OtlpStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OtlpStatus {
    #[serde(default)]
    pub code: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    #[serde(default)]
    pub value: Option<AnyValue>,
}

/// OTLP tagged value union. Exactly one field is populated; extraction picks
/// the first present in fixed precedence order: string, int, double, bool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyValue {
    #[serde(default)]
    pub string_value: Option<String>,
    #[serde(default, deserialize_with = "opt_i64_from_string_or_number")]
    pub int_value: Option<i64>,
    #[serde(default)]
    pub double_value: Option<f64>,
    #[serde(default)]
    pub bool_value: Option<bool>,
}

impl AnyValue {
    fn render(&self) -> Option<String> {
        if let Some(s) = &self.string_value {
            return Some(s.clone());
        }
        if let Some(i) = self.int_value {
            return Some(i.to_string());
        }
        if let Some(d) = self.double_value {
            return Some(d.to_string());
        }
        self.bool_value.map(|b| b.to_string())
    }
}

/// OTLP/JSON serializes 64-bit integers as strings; accept both encodings.
fn u64_from_string_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        Number(u64),
        Text(String),
    }

    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::Number(n) => Ok(n),
        StringOrNumber::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn opt_i64_from_string_or_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        Number(i64),
        Text(String),
    }

    let value: Option<StringOrNumber> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(StringOrNumber::Number(n)) => Ok(Some(n)),
        Some(StringOrNumber::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Adapt an OTLP export request into canonical traces.
pub fn adapt_otlp(request: ExportTraceRequest, received_at: DateTime<Utc>) -> Vec<Trace> {
    let mut traces = Vec::new();

    for resource in request.resource_spans {
        for scope in resource.scope_spans {
            for span in scope.spans {
                traces.push(convert_span(span, received_at));
            }
        }
    }

    debug!(count = traces.len(), "adapted otlp payload");
    traces
}

fn convert_span(span: OtlpSpan, received_at: DateTime<Utc>) -> Trace {
    let attributes = flatten_attributes(&span.attributes);
    let llm = extract_llm(&attributes);

    Trace {
        id: format!("{}-{}", span.trace_id, span.span_id),
        trace_id: span.trace_id,
        span_id: span.span_id,
        parent_span_id: span.parent_span_id.filter(|p| !p.is_empty()),
        name: span.name,
        kind: SpanKind::from_index(span.kind),
        start_time: datetime_from_nanos(span.start_time_unix_nano),
        end_time: datetime_from_nanos(span.end_time_unix_nano),
        duration_ms: duration_ms(span.start_time_unix_nano, span.end_time_unix_nano),
        status: TraceStatus::from_code(span.status.and_then(|s| s.code)),
        attributes,
        llm,
        evaluation: None,
        received_at,
        source: TraceSource::Otlp,
    }
}

/// Exact millisecond duration from two nanosecond epoch timestamps.
/// The subtraction happens in i128 before the divide so epoch values past
/// 53-bit float precision stay exact; negative spans clamp to 0.
pub fn duration_ms(start_nanos: u64, end_nanos: u64) -> u64 {
    let delta = end_nanos as i128 - start_nanos as i128;
    if delta <= 0 {
        0
    } else {
        (delta / 1_000_000) as u64
    }
}

fn datetime_from_nanos(nanos: u64) -> DateTime<Utc> {
    let secs = (nanos / 1_000_000_000) as i64;
    let subsec = (nanos % 1_000_000_000) as u32;
    Utc.timestamp_opt(secs, subsec)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap())
}

/// Flatten the OTLP key/value list into a string map, applying the tagged
/// union precedence order.
pub fn flatten_attributes(attributes: &[KeyValue]) -> HashMap<String, String> {
    attributes
        .iter()
        .filter_map(|kv| {
            kv.value
                .as_ref()
                .and_then(|v| v.render())
                .map(|rendered| (kv.key.clone(), rendered))
        })
        .collect()
}

fn get_first<'a>(attributes: &'a HashMap<String, String>, keys: &[&str]) -> Option<&'a String> {
    keys.iter().find_map(|key| attributes.get(*key))
}

fn get_u64(attributes: &HashMap<String, String>, keys: &[&str]) -> Option<u64> {
    get_first(attributes, keys).and_then(|s| s.parse().ok())
}

/// Extract LLM fields from span attributes with per-field fallback chains.
///
/// Returns `None` when vendor and model both resolve to `"unknown"` and total
/// tokens is 0, so ordinary internal spans are not tagged as model calls.
pub fn extract_llm(attributes: &HashMap<String, String>) -> Option<LlmCall> {
    let vendor = get_first(attributes, &[attrs::LLM_VENDOR, attrs::GEN_AI_SYSTEM])
        .cloned()
        .unwrap_or_else(|| "unknown".to_string());

    let model = get_first(
        attributes,
        &[
            attrs::LLM_MODEL,
            attrs::GEN_AI_REQUEST_MODEL,
            attrs::GEN_AI_RESPONSE_MODEL,
        ],
    )
    .cloned()
    .unwrap_or_else(|| "unknown".to_string());

    let prompt_tokens =
        get_u64(attributes, &[attrs::LLM_PROMPT_TOKENS, attrs::GEN_AI_INPUT_TOKENS]).unwrap_or(0);
    let completion_tokens = get_u64(
        attributes,
        &[attrs::LLM_COMPLETION_TOKENS, attrs::GEN_AI_OUTPUT_TOKENS],
    )
    .unwrap_or(0);
    let total_tokens = get_u64(attributes, &[attrs::LLM_TOTAL_TOKENS, attrs::GEN_AI_TOTAL_TOKENS]);

    let mut call = LlmCall::new(vendor, model, prompt_tokens, completion_tokens, total_tokens);

    if call.vendor == "unknown" && call.model == "unknown" && call.total_tokens == 0 {
        return None;
    }

    call.input = get_first(attributes, &[attrs::LLM_INPUT, attrs::GEN_AI_PROMPT]).cloned();
    call.output = get_first(attributes, &[attrs::LLM_OUTPUT, attrs::GEN_AI_COMPLETION]).cloned();
    call.temperature =
        get_first(attributes, &[attrs::LLM_TEMPERATURE, attrs::GEN_AI_TEMPERATURE])
            .and_then(|s| s.parse().ok());
    call.context = extract_context(attributes);

    Some(call)
}

/// Check the alternate context attribute names in priority order; the value
/// may be a single string or a JSON array of strings.
pub fn extract_context(attributes: &HashMap<String, String>) -> Option<ContextText> {
    let raw = get_first(attributes, &attrs::CONTEXT_KEYS)?;

    if raw.trim_start().starts_with('[') {
        if let Ok(parts) = serde_json::from_str::<Vec<String>>(raw) {
            return Some(ContextText::Many(parts));
        }
    }
    Some(ContextText::Single(raw.clone()))
}

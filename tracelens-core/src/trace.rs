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

//! Canonical trace model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::evaluation::Evaluation;

/// Operation classification of a span, following the OTLP 6-value enum plus
/// an `Unknown` catch-all for out-of-range indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanKind {
    Unspecified,
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
    Unknown,
}

impl SpanKind {
    /// Map an OTLP kind index (0..5) to a kind. Out-of-range or missing
    /// indices map to `Unknown`.
    pub fn from_index(index: Option<i64>) -> Self {
        match index {
            Some(0) => SpanKind::Unspecified,
            Some(1) => SpanKind::Internal,
            Some(2) => SpanKind::Server,
            Some(3) => SpanKind::Client,
            Some(4) => SpanKind::Producer,
            Some(5) => SpanKind::Consumer,
            _ => SpanKind::Unknown,
        }
    }
}

/// Span outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Ok,
    Error,
    Unset,
}

impl TraceStatus {
    /// Map an OTLP status code: 2 is error, 1 is ok, anything else
    /// (including absent) is unset.
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(2) => TraceStatus::Error,
            Some(1) => TraceStatus::Ok,
            _ => TraceStatus::Unset,
        }
    }
}

/// Which adapter produced a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceSource {
    Otlp,
    Sdk,
    Manual,
}

/// Retrieved/grounding text: a single string or an ordered list of strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextText {
    Single(String),
    Many(Vec<String>),
}

impl ContextText {
    /// Flatten into one newline-joined string for text heuristics.
    pub fn joined(&self) -> String {
        match self {
            ContextText::Single(s) => s.clone(),
            ContextText::Many(parts) => parts.join("\n"),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ContextText::Single(s) => s.is_empty(),
            ContextText::Many(parts) => parts.iter().all(|s| s.is_empty()),
        }
    }
}

/// Model-call details attached to a trace. Presence of this record marks the
/// trace as an LLM call; non-LLM spans leave it absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmCall {
    pub vendor: String,
    pub model: String,
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl LlmCall {
    /// Build a call record, defaulting `total_tokens` to the prompt +
    /// completion sum when not explicitly provided.
    pub fn new(
        vendor: impl Into<String>,
        model: impl Into<String>,
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: Option<u64>,
    ) -> Self {
        Self {
            vendor: vendor.into(),
            model: model.into(),
            prompt_tokens,
            completion_tokens,
            total_tokens: total_tokens.unwrap_or(prompt_tokens + completion_tokens),
            input: None,
            output: None,
            context: None,
            temperature: None,
        }
    }
}

/// One canonical trace record. Immutable once stored except for the
/// `evaluation` field, which is appended after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    /// Unique per stored record.
    pub id: String,
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub name: String,
    pub kind: SpanKind,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Derived `end_time - start_time`; negative inputs clamp to 0.
    pub duration_ms: u64,
    pub status: TraceStatus,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
    pub received_at: DateTime<Utc>,
    pub source: TraceSource,
}

impl Trace {
    /// Whether this trace represents a model call.
    pub fn is_llm(&self) -> bool {
        self.llm.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_kind_from_index() {
        assert_eq!(SpanKind::from_index(Some(0)), SpanKind::Unspecified);
        assert_eq!(SpanKind::from_index(Some(2)), SpanKind::Server);
        assert_eq!(SpanKind::from_index(Some(3)), SpanKind::Client);
        assert_eq!(SpanKind::from_index(Some(5)), SpanKind::Consumer);
        assert_eq!(SpanKind::from_index(Some(9)), SpanKind::Unknown);
        assert_eq!(SpanKind::from_index(Some(-1)), SpanKind::Unknown);
        assert_eq!(SpanKind::from_index(None), SpanKind::Unknown);
    }

    #[test]
    fn test_status_from_code() {
        assert_eq!(TraceStatus::from_code(Some(2)), TraceStatus::Error);
        assert_eq!(TraceStatus::from_code(Some(1)), TraceStatus::Ok);
        assert_eq!(TraceStatus::from_code(Some(0)), TraceStatus::Unset);
        assert_eq!(TraceStatus::from_code(Some(7)), TraceStatus::Unset);
        assert_eq!(TraceStatus::from_code(None), TraceStatus::Unset);
    }

    #[test]
    fn test_llm_call_total_defaults_to_sum() {
        let call = LlmCall::new("openai", "gpt-4o", 10, 5, None);
        assert_eq!(call.total_tokens, 15);

        let explicit = LlmCall::new("openai", "gpt-4o", 10, 5, Some(20));
        assert_eq!(explicit.total_tokens, 20);
    }

    #[test]
    fn test_context_text_joined() {
        let single = ContextText::Single("a".to_string());
        assert_eq!(single.joined(), "a");

        let many = ContextText::Many(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(many.joined(), "a\nb");
    }

    #[test]
    fn test_context_text_deserializes_both_shapes() {
        let single: ContextText = serde_json::from_str("\"doc\"").unwrap();
        assert_eq!(single, ContextText::Single("doc".to_string()));

        let many: ContextText = serde_json::from_str("[\"a\",\"b\"]").unwrap();
        assert_eq!(
            many,
            ContextText::Many(vec!["a".to_string(), "b".to_string()])
        );
    }
}

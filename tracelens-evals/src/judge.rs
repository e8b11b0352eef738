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

//! External LLM judge
//!
//! Posts an OpenAI-compatible chat completion asking for a JSON verdict and
//! maps every failure mode to [`JudgeError`]. Callers leave the trace's
//! existing evaluation untouched on error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::apply_score;
use tracelens_core::{Evaluation, Trace};

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("judge api key not configured")]
    MissingApiKey,
    #[error("judge request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("judge returned an unusable response: {0}")]
    BadResponse(String),
    #[error("trace {0} has no LLM output to judge")]
    NothingToJudge(String),
}

/// Which dimensions the judge is asked to grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JudgeRubric {
    pub accuracy: bool,
    pub relevance: bool,
    pub safety: bool,
    pub coherence: bool,
}

impl Default for JudgeRubric {
    fn default() -> Self {
        Self {
            accuracy: true,
            relevance: true,
            safety: true,
            coherence: true,
        }
    }
}

impl JudgeRubric {
    fn dimensions(&self) -> Vec<&'static str> {
        let mut dims = Vec::new();
        if self.accuracy {
            dims.push("accuracy");
        }
        if self.relevance {
            dims.push("relevance");
        }
        if self.safety {
            dims.push("safety");
        }
        if self.coherence {
            dims.push("coherence");
        }
        dims
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JudgeConfig {
    pub provider: String,
    pub model: String,
    pub rubric: JudgeRubric,
    /// Verdicts below this confidence are discarded as unusable.
    pub confidence_threshold: f64,
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            rubric: JudgeRubric::default(),
            confidence_threshold: 0.5,
            timeout_secs: 30,
            api_key: None,
            base_url: None,
        }
    }
}

/// What the judge model returns, parsed from its JSON reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JudgeVerdict {
    /// Overall 0-10.
    pub score: f64,
    /// Per-dimension 0-1 sub-scores.
    #[serde(default)]
    pub breakdown: BTreeMap<String, f64>,
    #[serde(default)]
    pub reasoning: String,
    /// Judge self-reported confidence, 0-1.
    #[serde(default = "full_confidence")]
    pub confidence: f64,
}

fn full_confidence() -> f64 {
    1.0
}

/// Seam for the external judge; the HTTP implementation is swapped for a
/// fake in tests. `expected` is an optional reference answer the caller
/// wants the output graded against.
#[async_trait]
pub trait JudgeClient: Send + Sync {
    async fn judge(
        &self,
        trace: &Trace,
        expected: Option<&str>,
    ) -> Result<JudgeVerdict, JudgeError>;

    fn model_name(&self) -> &str;
}

/// Turn a verdict into an evaluation block via the unified scoring path.
pub fn verdict_to_evaluation(
    verdict: JudgeVerdict,
    judge_model: &str,
    pass_threshold: f64,
    now: DateTime<Utc>,
) -> Evaluation {
    let criteria = (!verdict.breakdown.is_empty()).then_some(verdict.breakdown);
    let reasoning = (!verdict.reasoning.is_empty()).then_some(verdict.reasoning);
    apply_score(
        verdict.score,
        criteria,
        Some(judge_model.to_string()),
        reasoning,
        pass_threshold,
        now,
    )
}

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug)]
pub struct HttpJudgeClient {
    http: reqwest::Client,
    config: JudgeConfig,
    api_key: String,
}

impl HttpJudgeClient {
    pub fn new(config: JudgeConfig) -> Result<Self, JudgeError> {
        let api_key = config.api_key.clone().ok_or(JudgeError::MissingApiKey)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            config,
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    fn build_prompt(&self, trace: &Trace, expected: Option<&str>) -> Result<String, JudgeError> {
        let llm = trace
            .llm
            .as_ref()
            .ok_or_else(|| JudgeError::NothingToJudge(trace.id.clone()))?;
        let output = llm
            .output
            .as_deref()
            .ok_or_else(|| JudgeError::NothingToJudge(trace.id.clone()))?;
        let input = llm.input.as_deref().unwrap_or("(not recorded)");

        let dims = self.config.rubric.dimensions().join(", ");
        let mut prompt = format!(
            "Grade the following AI response on: {dims}.\n\n\
             User request:\n{input}\n\nAI response:\n{output}\n"
        );
        if let Some(expected) = expected {
            prompt.push_str(&format!("\nExpected answer:\n{expected}\n"));
        }
        if let Some(context) = &llm.context {
            prompt.push_str(&format!("\nRetrieved context:\n{}\n", context.joined()));
        }
        prompt.push_str(
            "\nReply with JSON only: {\"score\": <0-10 overall>, \
             \"breakdown\": {<dimension>: <0-1>}, \
             \"reasoning\": \"<one paragraph>\", \
             \"confidence\": <0-1>}",
        );
        Ok(prompt)
    }

    fn parse_verdict(&self, content: &str) -> Result<JudgeVerdict, JudgeError> {
        // Models sometimes wrap the JSON in a code fence.
        let trimmed = content
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();
        let verdict: JudgeVerdict = serde_json::from_str(trimmed)
            .map_err(|e| JudgeError::BadResponse(format!("invalid verdict json: {e}")))?;

        if !(0.0..=10.0).contains(&verdict.score) {
            return Err(JudgeError::BadResponse(format!(
                "score {} out of range",
                verdict.score
            )));
        }
        if verdict.confidence < self.config.confidence_threshold {
            return Err(JudgeError::BadResponse(format!(
                "confidence {} below threshold {}",
                verdict.confidence, self.config.confidence_threshold
            )));
        }
        Ok(verdict)
    }
}

#[async_trait]
impl JudgeClient for HttpJudgeClient {
    async fn judge(
        &self,
        trace: &Trace,
        expected: Option<&str>,
    ) -> Result<JudgeVerdict, JudgeError> {
        let prompt = self.build_prompt(trace, expected)?;
        debug!(trace_id = %trace.id, model = %self.config.model, "judging trace");

        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": "You are a strict evaluation judge. Reply with JSON only."},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.0,
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let reply: serde_json::Value = response.json().await?;
        let content = reply["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| JudgeError::BadResponse("no message content".to_string()))?;

        self.parse_verdict(content)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tracelens_core::{
        EvalStatus, LlmCall, SpanKind, TraceSource, TraceStatus, DEFAULT_PASS_THRESHOLD,
    };

    fn at() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn llm_trace() -> Trace {
        let mut call = LlmCall::new("openai", "gpt-4o", 10, 5, None);
        call.input = Some("what is the refund window".to_string());
        call.output = Some("Refunds are accepted within 30 days.".to_string());
        Trace {
            id: "t1".to_string(),
            trace_id: "t".to_string(),
            span_id: "s".to_string(),
            parent_span_id: None,
            name: "chat".to_string(),
            kind: SpanKind::Client,
            start_time: at(),
            end_time: at(),
            duration_ms: 0,
            status: TraceStatus::Unset,
            attributes: Default::default(),
            llm: Some(call),
            evaluation: None,
            received_at: at(),
            source: TraceSource::Manual,
        }
    }

    struct FixedJudge {
        verdict: JudgeVerdict,
    }

    #[async_trait]
    impl JudgeClient for FixedJudge {
        async fn judge(
            &self,
            _trace: &Trace,
            _expected: Option<&str>,
        ) -> Result<JudgeVerdict, JudgeError> {
            Ok(self.verdict.clone())
        }

        fn model_name(&self) -> &str {
            "fake-judge"
        }
    }

    fn client(confidence_threshold: f64) -> HttpJudgeClient {
        HttpJudgeClient::new(JudgeConfig {
            api_key: Some("test-key".to_string()),
            confidence_threshold,
            ..JudgeConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_missing_api_key_rejected_at_construction() {
        let err = HttpJudgeClient::new(JudgeConfig::default()).unwrap_err();
        assert!(matches!(err, JudgeError::MissingApiKey));
    }

    #[test]
    fn test_prompt_names_enabled_dimensions_only() {
        let mut config = JudgeConfig {
            api_key: Some("k".to_string()),
            ..JudgeConfig::default()
        };
        config.rubric.safety = false;
        let client = HttpJudgeClient::new(config).unwrap();

        let prompt = client.build_prompt(&llm_trace(), None).unwrap();
        assert!(prompt.contains("accuracy, relevance, coherence"));
        assert!(!prompt.contains("safety"));
        assert!(prompt.contains("Refunds are accepted"));
    }

    #[test]
    fn test_prompt_carries_expected_answer_when_given() {
        let with = client(0.5)
            .build_prompt(&llm_trace(), Some("30 days from purchase"))
            .unwrap();
        assert!(with.contains("Expected answer:\n30 days from purchase"));

        let without = client(0.5).build_prompt(&llm_trace(), None).unwrap();
        assert!(!without.contains("Expected answer"));
    }

    #[test]
    fn test_parse_verdict_accepts_fenced_json() {
        let content = "```json\n{\"score\": 8.5, \"breakdown\": {\"accuracy\": 0.9}, \
                       \"reasoning\": \"solid\", \"confidence\": 0.8}\n```";
        let verdict = client(0.5).parse_verdict(content).unwrap();
        assert_eq!(verdict.score, 8.5);
        assert_eq!(verdict.breakdown["accuracy"], 0.9);
    }

    #[test]
    fn test_parse_verdict_rejects_out_of_range_score() {
        let err = client(0.5).parse_verdict("{\"score\": 12.0}").unwrap_err();
        assert!(matches!(err, JudgeError::BadResponse(_)));
    }

    #[test]
    fn test_parse_verdict_rejects_low_confidence() {
        let err = client(0.9)
            .parse_verdict("{\"score\": 8.0, \"confidence\": 0.2}")
            .unwrap_err();
        assert!(matches!(err, JudgeError::BadResponse(_)));
    }

    #[tokio::test]
    async fn test_verdict_flows_through_unified_status() {
        let judge = FixedJudge {
            verdict: JudgeVerdict {
                score: 4.5,
                breakdown: BTreeMap::new(),
                reasoning: "partially correct".to_string(),
                confidence: 1.0,
            },
        };

        let verdict = judge.judge(&llm_trace(), None).await.unwrap();
        let eval = verdict_to_evaluation(verdict, judge.model_name(), DEFAULT_PASS_THRESHOLD, at());

        assert_eq!(eval.status, Some(EvalStatus::Review));
        assert_eq!(eval.judge_model.as_deref(), Some("fake-judge"));
        assert_eq!(eval.reasoning.as_deref(), Some("partially correct"));
    }

    #[test]
    fn test_judge_trace_without_output_rejected() {
        let mut trace = llm_trace();
        trace.llm.as_mut().unwrap().output = None;
        let err = client(0.5).build_prompt(&trace, None).unwrap_err();
        assert!(matches!(err, JudgeError::NothingToJudge(_)));
    }
}

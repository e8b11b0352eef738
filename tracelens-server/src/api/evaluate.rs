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

//! Evaluation endpoints
//!
//! All three evaluation methods write through the store so the derived
//! status is reconciled once, in one place. A failed judge call reports the
//! error for that trace and leaves its stored evaluation exactly as it was.

use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{ApiError, AppState};
use crate::auth::AuthContext;
use tracelens_core::Evaluation;
use tracelens_evals::{apply_human_review, verdict_to_evaluation};

/// Accepts `{"traceId": "..."}` or `{"traceIds": ["...", ...]}`. The judge
/// endpoint also takes an optional `expected` reference answer, graded
/// against every listed trace.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    pub trace_id: Option<String>,
    #[serde(default)]
    pub trace_ids: Vec<String>,
    #[serde(default)]
    pub expected: Option<String>,
}

impl EvaluateRequest {
    fn ids(self) -> Result<Vec<String>, ApiError> {
        let mut ids = self.trace_ids;
        if let Some(id) = self.trace_id {
            ids.insert(0, id);
        }
        if ids.is_empty() {
            return Err(ApiError::BadRequest(
                "traceId or traceIds required".to_string(),
            ));
        }
        Ok(ids)
    }
}

/// Per-trace outcome; exactly one of `evaluation`/`error` is set.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateOutcome {
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub results: Vec<EvaluateOutcome>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanReviewRequest {
    pub trace_id: String,
    /// 0-10.
    pub score: f64,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanReviewResponse {
    pub trace_id: String,
    pub evaluation: Evaluation,
}

async fn store_evaluation(
    state: &AppState,
    ctx: &AuthContext,
    trace_id: &str,
    evaluation: Evaluation,
) -> Result<Evaluation, ApiError> {
    if !state.set_evaluation(ctx, trace_id, evaluation).await? {
        return Err(ApiError::NotFound(format!("trace {trace_id}")));
    }
    // Read back so the echoed block carries the reconciled status.
    let stored = state
        .get(ctx, trace_id)
        .await?
        .and_then(|t| t.evaluation)
        .ok_or_else(|| ApiError::Internal("evaluation vanished after write".to_string()))?;
    Ok(stored)
}

/// POST /api/v1/evaluations/judge - Score one or more traces with the
/// configured LLM judge.
pub async fn evaluate_judge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut request): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, ApiError> {
    let ctx = state.identity(&headers)?;
    let judge = state
        .judge
        .clone()
        .ok_or_else(|| ApiError::JudgeUnavailable("no judge configured".to_string()))?;
    let expected = request.expected.take();
    let ids = request.ids()?;

    let mut results = Vec::with_capacity(ids.len());
    for trace_id in ids {
        let outcome = match state.get(&ctx, &trace_id).await? {
            None => EvaluateOutcome {
                trace_id,
                evaluation: None,
                error: Some("trace not found".to_string()),
            },
            Some(trace) => match judge.judge(&trace, expected.as_deref()).await {
                Ok(verdict) => {
                    let evaluation = verdict_to_evaluation(
                        verdict,
                        judge.model_name(),
                        state.pass_threshold,
                        Utc::now(),
                    );
                    let stored =
                        store_evaluation(&state, &ctx, &trace_id, evaluation).await?;
                    EvaluateOutcome {
                        trace_id,
                        evaluation: Some(stored),
                        error: None,
                    }
                }
                Err(e) => {
                    // Stored evaluation stays untouched.
                    warn!(trace_id = %trace_id, error = %e, "judge call failed");
                    EvaluateOutcome {
                        trace_id,
                        evaluation: None,
                        error: Some(e.to_string()),
                    }
                }
            },
        };
        results.push(outcome);
    }

    Ok(Json(EvaluateResponse { results }))
}

/// POST /api/v1/evaluations/heuristic - Deterministic text-heuristic scoring.
pub async fn evaluate_heuristic(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, ApiError> {
    let ctx = state.identity(&headers)?;
    let ids = request.ids()?;

    let mut results = Vec::with_capacity(ids.len());
    for trace_id in ids {
        let outcome = match state.get(&ctx, &trace_id).await? {
            None => EvaluateOutcome {
                trace_id,
                evaluation: None,
                error: Some("trace not found".to_string()),
            },
            Some(trace) => {
                match tracelens_evals::evaluate_heuristic(&trace, state.pass_threshold, Utc::now())
                {
                    Ok(evaluation) => {
                        let stored =
                            store_evaluation(&state, &ctx, &trace_id, evaluation).await?;
                        EvaluateOutcome {
                            trace_id,
                            evaluation: Some(stored),
                            error: None,
                        }
                    }
                    Err(e) => EvaluateOutcome {
                        trace_id,
                        evaluation: None,
                        error: Some(e.to_string()),
                    },
                }
            }
        };
        results.push(outcome);
    }

    Ok(Json(EvaluateResponse { results }))
}

/// POST /api/v1/evaluations/human - Record a human verdict.
pub async fn evaluate_human(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<HumanReviewRequest>,
) -> Result<Json<HumanReviewResponse>, ApiError> {
    let ctx = state.identity(&headers)?;
    if !(0.0..=10.0).contains(&request.score) {
        return Err(ApiError::BadRequest(format!(
            "score {} outside 0-10",
            request.score
        )));
    }

    let trace = state
        .get(&ctx, &request.trace_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("trace {}", request.trace_id)))?;

    let evaluation = apply_human_review(
        trace.evaluation,
        request.score,
        request.notes,
        state.pass_threshold,
        Utc::now(),
    );
    let stored = store_evaluation(&state, &ctx, &request.trace_id, evaluation).await?;
    info!(trace_id = %request.trace_id, score = request.score, "human review recorded");

    Ok(Json(HumanReviewResponse {
        trace_id: request.trace_id,
        evaluation: stored,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{llm_trace, state, state_with_judge};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tracelens_core::{EvalStatus, Trace};
    use tracelens_evals::{JudgeClient, JudgeError, JudgeVerdict};

    struct ScriptedJudge {
        score: f64,
        fail: bool,
    }

    #[async_trait]
    impl JudgeClient for ScriptedJudge {
        async fn judge(
            &self,
            _trace: &Trace,
            _expected: Option<&str>,
        ) -> Result<JudgeVerdict, JudgeError> {
            if self.fail {
                return Err(JudgeError::BadResponse("scripted failure".to_string()));
            }
            Ok(JudgeVerdict {
                score: self.score,
                breakdown: BTreeMap::new(),
                reasoning: "scripted".to_string(),
                confidence: 1.0,
            })
        }

        fn model_name(&self) -> &str {
            "scripted-judge"
        }
    }

    /// Echoes the expected answer it was handed into the verdict reasoning.
    struct EchoingJudge;

    #[async_trait]
    impl JudgeClient for EchoingJudge {
        async fn judge(
            &self,
            _trace: &Trace,
            expected: Option<&str>,
        ) -> Result<JudgeVerdict, JudgeError> {
            Ok(JudgeVerdict {
                score: 8.0,
                breakdown: BTreeMap::new(),
                reasoning: expected.unwrap_or("none").to_string(),
                confidence: 1.0,
            })
        }

        fn model_name(&self) -> &str {
            "echoing-judge"
        }
    }

    fn single(id: &str) -> Json<EvaluateRequest> {
        Json(EvaluateRequest {
            trace_id: Some(id.to_string()),
            trace_ids: Vec::new(),
            expected: None,
        })
    }

    #[tokio::test]
    async fn test_judge_unconfigured_is_502() {
        let err = evaluate_judge(State(state()), HeaderMap::new(), single("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::JudgeUnavailable(_)));
    }

    #[tokio::test]
    async fn test_judge_scores_and_persists() {
        let app = state_with_judge(Some(Arc::new(ScriptedJudge {
            score: 8.0,
            fail: false,
        })));
        app.buffer.insert(vec![llm_trace("a", "openai", "gpt-4o")]);

        let Json(response) = evaluate_judge(State(app.clone()), HeaderMap::new(), single("a"))
            .await
            .unwrap();

        let evaluation = response.results[0].evaluation.as_ref().unwrap();
        assert_eq!(evaluation.status, Some(EvalStatus::Pass));
        assert_eq!(evaluation.judge_model.as_deref(), Some("scripted-judge"));

        let stored = app.buffer.get("a").unwrap().evaluation.unwrap();
        assert_eq!(stored.score, Some(8.0));
    }

    #[tokio::test]
    async fn test_expected_answer_reaches_judge() {
        let app = state_with_judge(Some(Arc::new(EchoingJudge)));
        app.buffer.insert(vec![llm_trace("a", "openai", "gpt-4o")]);

        let request = Json(EvaluateRequest {
            trace_id: Some("a".to_string()),
            trace_ids: Vec::new(),
            expected: Some("30 days".to_string()),
        });
        let Json(response) = evaluate_judge(State(app), HeaderMap::new(), request)
            .await
            .unwrap();

        let evaluation = response.results[0].evaluation.as_ref().unwrap();
        assert_eq!(evaluation.reasoning.as_deref(), Some("30 days"));
    }

    #[tokio::test]
    async fn test_judge_failure_leaves_prior_evaluation_untouched() {
        let app = state_with_judge(Some(Arc::new(ScriptedJudge {
            score: 0.0,
            fail: true,
        })));
        let mut trace = llm_trace("a", "openai", "gpt-4o");
        trace.evaluation = Some(Evaluation {
            score: Some(9.0),
            ..Default::default()
        });
        app.buffer.insert(vec![trace]);

        let Json(response) = evaluate_judge(State(app.clone()), HeaderMap::new(), single("a"))
            .await
            .unwrap();

        assert!(response.results[0].error.is_some());
        assert!(response.results[0].evaluation.is_none());
        // Prior evaluation survives.
        let stored = app.buffer.get("a").unwrap().evaluation.unwrap();
        assert_eq!(stored.score, Some(9.0));
    }

    #[tokio::test]
    async fn test_judge_batch_reports_missing_traces_per_entry() {
        let app = state_with_judge(Some(Arc::new(ScriptedJudge {
            score: 8.0,
            fail: false,
        })));
        app.buffer.insert(vec![llm_trace("a", "openai", "gpt-4o")]);

        let request = Json(EvaluateRequest {
            trace_id: None,
            trace_ids: vec!["a".to_string(), "ghost".to_string()],
            expected: None,
        });
        let Json(response) = evaluate_judge(State(app), HeaderMap::new(), request)
            .await
            .unwrap();

        assert_eq!(response.results.len(), 2);
        assert!(response.results[0].evaluation.is_some());
        assert_eq!(
            response.results[1].error.as_deref(),
            Some("trace not found")
        );
    }

    #[tokio::test]
    async fn test_empty_request_rejected() {
        let err = evaluate_heuristic(
            State(state()),
            HeaderMap::new(),
            Json(EvaluateRequest::default()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_heuristic_scores_trace() {
        let app = state();
        app.buffer.insert(vec![llm_trace("a", "openai", "gpt-4o")]);

        let Json(response) = evaluate_heuristic(State(app), HeaderMap::new(), single("a"))
            .await
            .unwrap();

        let evaluation = response.results[0].evaluation.as_ref().unwrap();
        assert!(evaluation.score.is_some());
        assert!(evaluation.criteria.as_ref().unwrap().contains_key("grounding"));
    }

    #[tokio::test]
    async fn test_human_review_persists_and_derives_status() {
        let app = state();
        app.buffer.insert(vec![llm_trace("a", "openai", "gpt-4o")]);

        let request = Json(HumanReviewRequest {
            trace_id: "a".to_string(),
            score: 4.5,
            notes: Some("borderline".to_string()),
        });
        let Json(response) = evaluate_human(State(app.clone()), HeaderMap::new(), request)
            .await
            .unwrap();

        assert_eq!(response.evaluation.status, Some(EvalStatus::Review));
        assert_eq!(response.evaluation.human_score, Some(4.5));
        assert_eq!(response.evaluation.human_notes.as_deref(), Some("borderline"));
    }

    #[tokio::test]
    async fn test_human_review_score_range_enforced() {
        let request = Json(HumanReviewRequest {
            trace_id: "a".to_string(),
            score: 12.0,
            notes: None,
        });
        let err = evaluate_human(State(state()), HeaderMap::new(), request)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}

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

//! # TraceLens Evals
//!
//! Three ways to score a trace on the 0-10 scale: deterministic text
//! heuristics, an external LLM judge, and direct human review. All three
//! funnel through [`apply_score`], so the resulting pass/fail/review status
//! is derived by one rule regardless of provenance.
//!
//! Judge failures are reported as errors and never touch a trace's existing
//! evaluation.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

use tracelens_core::{EvalStatus, Evaluation};

pub mod heuristic;
pub mod judge;

pub use heuristic::evaluate_heuristic;
pub use judge::{
    verdict_to_evaluation, HttpJudgeClient, JudgeClient, JudgeConfig, JudgeError, JudgeRubric,
    JudgeVerdict,
};

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("trace is not an LLM call")]
    NotLlmTrace,
    #[error("trace has no output text to evaluate")]
    MissingOutput,
    #[error("judge call failed: {0}")]
    Judge(#[from] judge::JudgeError),
}

/// Build an evaluation block from a score. Pure: the same inputs always
/// produce the same block, and the status comes from the unified derivation
/// rule.
pub fn apply_score(
    score: f64,
    criteria: Option<BTreeMap<String, f64>>,
    judge_model: Option<String>,
    reasoning: Option<String>,
    pass_threshold: f64,
    now: DateTime<Utc>,
) -> Evaluation {
    Evaluation {
        score: Some(score),
        status: Some(EvalStatus::from_score(score, pass_threshold)),
        criteria,
        judge_model,
        reasoning,
        evaluated_at: Some(now),
        human_score: None,
        human_notes: None,
        human_reviewed_at: None,
    }
}

/// Record a human verdict on top of whatever evaluation already exists.
/// The human score supersedes the automated one and drives the status.
pub fn apply_human_review(
    existing: Option<Evaluation>,
    score: f64,
    notes: Option<String>,
    pass_threshold: f64,
    now: DateTime<Utc>,
) -> Evaluation {
    let mut evaluation = existing.unwrap_or_default();
    evaluation.score = Some(score);
    evaluation.status = Some(EvalStatus::from_score(score, pass_threshold));
    evaluation.human_score = Some(score);
    evaluation.human_notes = notes;
    evaluation.human_reviewed_at = Some(now);
    evaluation
}

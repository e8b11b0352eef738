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

//! Evaluation record and unified status derivation
//!
//! All three scoring methods (heuristic, external judge, human review) derive
//! their pass/fail/review state through [`EvalStatus::from_score`], so
//! downstream consumers cannot distinguish evaluation provenance by status
//! alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default pass threshold on the 0-10 score scale.
pub const DEFAULT_PASS_THRESHOLD: f64 = 7.0;

/// Lower bound of the review band, as a fraction of the pass threshold.
/// Policy constant, not a structural threshold.
pub const REVIEW_BAND_FACTOR: f64 = 0.6;

/// Unified evaluation state. A trace with no evaluation at all is "pending",
/// which is represented by `Trace::evaluation` being absent rather than by a
/// variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalStatus {
    Pass,
    Fail,
    Review,
}

impl EvalStatus {
    /// Two-cutoff derivation rule: `score >= t` passes,
    /// `REVIEW_BAND_FACTOR * t <= score < t` goes to review, anything lower
    /// fails. Monotonic in `score` for a fixed threshold.
    pub fn from_score(score: f64, pass_threshold: f64) -> Self {
        if score >= pass_threshold {
            EvalStatus::Pass
        } else if score >= pass_threshold * REVIEW_BAND_FACTOR {
            EvalStatus::Review
        } else {
            EvalStatus::Fail
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EvalStatus::Pass => "pass",
            EvalStatus::Fail => "fail",
            EvalStatus::Review => "review",
        }
    }
}

/// Evaluation block appended to a trace after ingestion. Last write wins;
/// concurrent evaluations of the same trace are not merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EvalStatus>,
    /// Named sub-scores in the 0-1 range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub criteria: Option<BTreeMap<String, f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judge_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_reviewed_at: Option<DateTime<Utc>>,
}

impl Evaluation {
    /// Recompute `status` from `score` when both exist. Score is
    /// authoritative; a stale or disagreeing status is overwritten.
    pub fn reconcile_status(&mut self, pass_threshold: f64) {
        if let Some(score) = self.score {
            self.status = Some(EvalStatus::from_score(score, pass_threshold));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_two_cutoff_rule_default_threshold() {
        // Scenario D from the acceptance suite.
        assert_eq!(EvalStatus::from_score(7.0, 7.0), EvalStatus::Pass);
        assert_eq!(EvalStatus::from_score(4.5, 7.0), EvalStatus::Review);
        assert_eq!(EvalStatus::from_score(4.0, 7.0), EvalStatus::Fail);
    }

    #[test]
    fn test_review_band_lower_edge_inclusive() {
        // 0.6 * 7.0 = 4.2 is the first score that lands in review.
        assert_eq!(EvalStatus::from_score(4.2, 7.0), EvalStatus::Review);
        assert_eq!(EvalStatus::from_score(4.1999, 7.0), EvalStatus::Fail);
    }

    #[test]
    fn test_reconcile_overwrites_disagreeing_status() {
        let mut eval = Evaluation {
            score: Some(9.0),
            status: Some(EvalStatus::Fail),
            ..Default::default()
        };
        eval.reconcile_status(DEFAULT_PASS_THRESHOLD);
        assert_eq!(eval.status, Some(EvalStatus::Pass));
    }

    fn rank(status: EvalStatus) -> u8 {
        match status {
            EvalStatus::Fail => 0,
            EvalStatus::Review => 1,
            EvalStatus::Pass => 2,
        }
    }

    proptest! {
        #[test]
        fn status_monotonic_in_score(a in 0.0f64..10.0, b in 0.0f64..10.0, t in 1.0f64..10.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let lo_status = EvalStatus::from_score(lo, t);
            let hi_status = EvalStatus::from_score(hi, t);
            prop_assert!(rank(lo_status) <= rank(hi_status));
        }
    }
}

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

//! Heuristic savings detectors
//!
//! Four detectors over a trace collection: model downgrade, response
//! caching, prompt trimming, and request batching. Savings figures are
//! estimates computed from the fixed assumption ratios in
//! [`OptimizationPolicy`], not measurements.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::debug;

use crate::pricing::PricingTable;
use tracelens_core::Trace;

/// Models with a cheaper sibling that is generally interchangeable for
/// routine workloads.
static CHEAPER_SIBLINGS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert("gpt-4-turbo", "gpt-4o");
    map.insert("gpt-4o", "gpt-4o-mini");
    map.insert("claude-3-opus", "claude-3-5-sonnet");
    map.insert("claude-3-5-sonnet", "claude-3-haiku");
    map.insert("gemini-1.5-pro", "gemini-1.5-flash");
    map.insert("command-r-plus", "command-r");
    map
});

/// Tuning knobs and assumption ratios for the detectors. Every magic number
/// the detectors use lives here under a name.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizationPolicy {
    /// Assumed fraction of a group's spend saved by moving to the cheaper
    /// sibling model.
    pub downgrade_savings_ratio: f64,
    /// Assumed fraction of repeated-prompt spend saved by a response cache.
    pub cache_savings_ratio: f64,
    /// Assumed fraction of long-prompt spend saved by trimming prompts.
    pub prompt_savings_ratio: f64,
    /// Assumed fraction of burst-traffic spend saved by batching requests.
    pub batch_savings_ratio: f64,

    /// Minimum group size before a downgrade is suggested.
    pub downgrade_min_group: usize,
    /// Quality floor (0-1): groups averaging at or above this have headroom
    /// to run on a cheaper model.
    pub downgrade_score_bound: f64,

    /// Prompt prefix length (chars) used as the cache grouping key.
    pub cache_prefix_len: usize,
    /// Minimum repeats of one prefix before caching is suggested.
    pub cache_min_repeats: usize,
    /// Repeat counts at or above these bounds raise the caching impact.
    pub cache_high_repeats: usize,
    pub cache_medium_repeats: usize,

    /// Prompt length (chars) above which a prompt counts as long.
    pub long_prompt_chars: usize,
    /// Long-prompt count must exceed this before trimming is suggested.
    pub long_prompt_min_count: usize,

    /// Gap (ms) under which two consecutive calls count as a burst pair.
    pub rapid_window_ms: u64,
    /// Burst-involved call count must exceed this before batching is
    /// suggested.
    pub rapid_min_count: usize,
}

impl Default for OptimizationPolicy {
    fn default() -> Self {
        Self {
            downgrade_savings_ratio: 0.65,
            cache_savings_ratio: 0.90,
            prompt_savings_ratio: 0.30,
            batch_savings_ratio: 0.20,
            downgrade_min_group: 5,
            downgrade_score_bound: 0.85,
            cache_prefix_len: 100,
            cache_min_repeats: 5,
            cache_high_repeats: 20,
            cache_medium_repeats: 10,
            long_prompt_chars: 2000,
            long_prompt_min_count: 10,
            rapid_window_ms: 1000,
            rapid_min_count: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    ModelDowngrade,
    Caching,
    PromptOptimization,
    Batching,
}

/// One savings suggestion. `details` carries kind-specific fields such as
/// the suggested model or the repeated prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub description: String,
    pub details: serde_json::Value,
    pub potential_savings: f64,
    pub impact: Impact,
}

/// Quality score for one trace on a 0-1 scale: the evaluation score (0-10)
/// scaled down, falling back to a `confidence` attribute.
fn quality_score(trace: &Trace) -> Option<f64> {
    if let Some(score) = trace.evaluation.as_ref().and_then(|e| e.score) {
        return Some(score / 10.0);
    }
    trace
        .attributes
        .get("confidence")
        .and_then(|v| v.parse::<f64>().ok())
}

/// Grouping label for downgrade analysis: an explicit `task.type` attribute
/// when present, the span name otherwise.
fn task_type(trace: &Trace) -> &str {
    trace
        .attributes
        .get("task.type")
        .map(String::as_str)
        .unwrap_or(&trace.name)
}

fn trace_cost(trace: &Trace, pricing: &PricingTable) -> f64 {
    trace
        .llm
        .as_ref()
        .and_then(|llm| pricing.cost_for(llm))
        .unwrap_or(0.0)
}

fn prefix(input: &str, len: usize) -> String {
    input.chars().take(len).collect()
}

/// Run all four detectors, highest potential savings first.
pub fn find_optimizations(
    traces: &[Trace],
    pricing: &PricingTable,
    policy: &OptimizationPolicy,
) -> Vec<Recommendation> {
    let llm_traces: Vec<&Trace> = traces.iter().filter(|t| t.is_llm()).collect();
    let mut recommendations = Vec::new();

    recommendations.extend(detect_downgrades(&llm_traces, pricing, policy));
    recommendations.extend(detect_caching(&llm_traces, pricing, policy));
    recommendations.extend(detect_long_prompts(&llm_traces, pricing, policy));
    recommendations.extend(detect_bursts(&llm_traces, pricing, policy));

    recommendations.sort_by(|a, b| {
        b.potential_savings
            .partial_cmp(&a.potential_savings)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    debug!(count = recommendations.len(), "optimization scan complete");
    recommendations
}

fn detect_downgrades(
    traces: &[&Trace],
    pricing: &PricingTable,
    policy: &OptimizationPolicy,
) -> Vec<Recommendation> {
    // Group by (task label, model); only groups doing well on a model with
    // a cheaper sibling are candidates.
    let mut groups: HashMap<(String, String), Vec<&Trace>> = HashMap::new();
    for &trace in traces {
        let llm = trace.llm.as_ref().unwrap();
        groups
            .entry((task_type(trace).to_string(), llm.model.clone()))
            .or_default()
            .push(trace);
    }

    let mut out = Vec::new();
    for ((task, model), group) in groups {
        if group.len() < policy.downgrade_min_group {
            continue;
        }
        let Some(&cheaper) = CHEAPER_SIBLINGS.get(model.as_str()) else {
            continue;
        };

        let scores: Vec<f64> = group.iter().filter_map(|t| quality_score(t)).collect();
        if scores.is_empty() {
            continue;
        }
        let avg_score = scores.iter().sum::<f64>() / scores.len() as f64;
        if avg_score < policy.downgrade_score_bound {
            continue;
        }

        let group_cost: f64 = group.iter().map(|t| trace_cost(t, pricing)).sum();
        out.push(Recommendation {
            kind: RecommendationKind::ModelDowngrade,
            description: format!(
                "'{task}' runs on {model} with an average quality of {avg_score:.2}; \
                 {cheaper} should handle it"
            ),
            details: json!({
                "taskType": task,
                "currentModel": model,
                "suggestedModel": cheaper,
                "traceCount": group.len(),
                "avgScore": avg_score,
            }),
            potential_savings: group_cost * policy.downgrade_savings_ratio,
            impact: Impact::High,
        });
    }
    out
}

fn detect_caching(
    traces: &[&Trace],
    pricing: &PricingTable,
    policy: &OptimizationPolicy,
) -> Vec<Recommendation> {
    let mut by_prefix: HashMap<String, Vec<&Trace>> = HashMap::new();
    for &trace in traces {
        let llm = trace.llm.as_ref().unwrap();
        if let Some(input) = &llm.input {
            by_prefix
                .entry(prefix(input, policy.cache_prefix_len))
                .or_default()
                .push(trace);
        }
    }

    let mut out = Vec::new();
    for (key, group) in by_prefix {
        let repeats = group.len();
        if repeats < policy.cache_min_repeats {
            continue;
        }

        let group_cost: f64 = group.iter().map(|t| trace_cost(t, pricing)).sum();
        let impact = if repeats >= policy.cache_high_repeats {
            Impact::High
        } else if repeats >= policy.cache_medium_repeats {
            Impact::Medium
        } else {
            Impact::Low
        };

        out.push(Recommendation {
            kind: RecommendationKind::Caching,
            description: format!("{repeats} calls share the same prompt opening; cache responses"),
            details: json!({
                "promptPrefix": key,
                "repeats": repeats,
            }),
            potential_savings: group_cost * policy.cache_savings_ratio,
            impact,
        });
    }
    out
}

fn detect_long_prompts(
    traces: &[&Trace],
    pricing: &PricingTable,
    policy: &OptimizationPolicy,
) -> Vec<Recommendation> {
    let long: Vec<&Trace> = traces
        .iter()
        .copied()
        .filter(|t| {
            t.llm
                .as_ref()
                .and_then(|llm| llm.input.as_ref())
                .map(|input| input.chars().count() > policy.long_prompt_chars)
                .unwrap_or(false)
        })
        .collect();

    if long.len() <= policy.long_prompt_min_count {
        return Vec::new();
    }

    let flagged_cost: f64 = long.iter().map(|t| trace_cost(t, pricing)).sum();

    vec![Recommendation {
        kind: RecommendationKind::PromptOptimization,
        description: format!(
            "{} calls carry prompts over {} characters; trim boilerplate",
            long.len(),
            policy.long_prompt_chars
        ),
        details: json!({
            "longPromptCount": long.len(),
            "thresholdChars": policy.long_prompt_chars,
        }),
        potential_savings: flagged_cost * policy.prompt_savings_ratio,
        impact: Impact::Medium,
    }]
}

fn detect_bursts(
    traces: &[&Trace],
    pricing: &PricingTable,
    policy: &OptimizationPolicy,
) -> Vec<Recommendation> {
    let mut ordered: Vec<&Trace> = traces.to_vec();
    ordered.sort_by_key(|t| t.start_time);

    // A call is burst-involved when it starts within the window of its
    // predecessor.
    let mut burst: Vec<&Trace> = Vec::new();
    for pair in ordered.windows(2) {
        let gap = pair[1]
            .start_time
            .signed_duration_since(pair[0].start_time)
            .num_milliseconds();
        if gap >= 0 && (gap as u64) <= policy.rapid_window_ms {
            if burst.last().map(|t| t.id != pair[0].id).unwrap_or(true) {
                burst.push(pair[0]);
            }
            burst.push(pair[1]);
        }
    }

    if burst.len() <= policy.rapid_min_count {
        return Vec::new();
    }

    let burst_cost: f64 = burst.iter().map(|t| trace_cost(t, pricing)).sum();
    vec![Recommendation {
        kind: RecommendationKind::Batching,
        description: format!(
            "{} calls arrive within {}ms of each other; batch them",
            burst.len(),
            policy.rapid_window_ms
        ),
        details: json!({
            "burstCount": burst.len(),
            "windowMs": policy.rapid_window_ms,
        }),
        potential_savings: burst_cost * policy.batch_savings_ratio,
        impact: Impact::Low,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::PricingTable;
    use chrono::{Duration, TimeZone, Utc};
    use tracelens_core::{Evaluation, LlmCall, SpanKind, TraceSource, TraceStatus};

    fn llm_trace(id: &str, model: &str, score: Option<f64>, offset_ms: i64) -> Trace {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::milliseconds(offset_ms);
        Trace {
            id: id.to_string(),
            trace_id: "t".to_string(),
            span_id: id.to_string(),
            parent_span_id: None,
            name: "summarize".to_string(),
            kind: SpanKind::Client,
            start_time: at,
            end_time: at,
            duration_ms: 0,
            status: TraceStatus::Unset,
            attributes: Default::default(),
            llm: Some(LlmCall::new("openai", model, 1000, 500, None)),
            evaluation: score.map(|s| Evaluation {
                score: Some(s),
                ..Default::default()
            }),
            received_at: at,
            source: TraceSource::Manual,
        }
    }

    #[test]
    fn test_high_scoring_group_yields_one_downgrade() {
        // Acceptance scenario C: six well-scoring gpt-4o calls on the same
        // task produce exactly one downgrade suggestion, impact high.
        let traces: Vec<Trace> = (0..6)
            .map(|i| llm_trace(&format!("t{i}"), "gpt-4o", Some(9.0), i * 60_000))
            .collect();

        let recs = find_optimizations(
            &traces,
            &PricingTable::default(),
            &OptimizationPolicy::default(),
        );

        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].kind, RecommendationKind::ModelDowngrade);
        assert_eq!(recs[0].impact, Impact::High);
        assert_eq!(recs[0].details["suggestedModel"], "gpt-4o-mini");
        assert!(recs[0].potential_savings > 0.0);
    }

    #[test]
    fn test_low_scoring_group_is_left_alone() {
        let traces: Vec<Trace> = (0..6)
            .map(|i| llm_trace(&format!("t{i}"), "gpt-4o", Some(6.0), i * 60_000))
            .collect();

        let recs = find_optimizations(
            &traces,
            &PricingTable::default(),
            &OptimizationPolicy::default(),
        );
        assert!(recs.is_empty());
    }

    #[test]
    fn test_small_group_is_left_alone() {
        let traces: Vec<Trace> = (0..4)
            .map(|i| llm_trace(&format!("t{i}"), "gpt-4o", Some(9.0), i * 60_000))
            .collect();

        let recs = find_optimizations(
            &traces,
            &PricingTable::default(),
            &OptimizationPolicy::default(),
        );
        assert!(recs.is_empty());
    }

    #[test]
    fn test_cheapest_model_has_no_downgrade_target() {
        let traces: Vec<Trace> = (0..6)
            .map(|i| llm_trace(&format!("t{i}"), "gpt-4o-mini", Some(9.0), i * 60_000))
            .collect();

        let recs = find_optimizations(
            &traces,
            &PricingTable::default(),
            &OptimizationPolicy::default(),
        );
        assert!(recs.is_empty());
    }

    #[test]
    fn test_confidence_attribute_backs_up_missing_score() {
        let traces: Vec<Trace> = (0..6)
            .map(|i| {
                let mut t = llm_trace(&format!("t{i}"), "gpt-4o", None, i * 60_000);
                t.attributes
                    .insert("confidence".to_string(), "0.95".to_string());
                t
            })
            .collect();

        let recs = find_optimizations(
            &traces,
            &PricingTable::default(),
            &OptimizationPolicy::default(),
        );
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].kind, RecommendationKind::ModelDowngrade);
    }

    #[test]
    fn test_repeated_prompt_prefix_suggests_caching() {
        // The question number varies past the 100-char grouping prefix, so
        // all twelve calls land in one cache group.
        let traces: Vec<Trace> = (0..12)
            .map(|i| {
                let mut t = llm_trace(&format!("t{i}"), "gpt-4o", None, i * 60_000);
                t.llm.as_mut().unwrap().input = Some(format!(
                    "{} Question {i}",
                    "You are a helpful assistant working on invoices. ".repeat(4)
                ));
                t
            })
            .collect();

        let policy = OptimizationPolicy::default();
        let pricing = PricingTable::default();
        let recs = find_optimizations(&traces, &pricing, &policy);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].kind, RecommendationKind::Caching);
        assert_eq!(recs[0].impact, Impact::Medium);
        assert_eq!(recs[0].details["repeats"], 12);

        // Savings are the named ratio applied to the group's summed cost.
        let per_call = pricing.cost_for(traces[0].llm.as_ref().unwrap()).unwrap();
        let expected = per_call * 12.0 * policy.cache_savings_ratio;
        assert!((recs[0].potential_savings - expected).abs() < 1e-9);
    }

    #[test]
    fn test_long_prompts_suggest_trimming() {
        let traces: Vec<Trace> = (0..11)
            .map(|i| {
                let mut t = llm_trace(&format!("t{i}"), "gpt-4o", None, i * 60_000);
                t.llm.as_mut().unwrap().input = Some(format!("{i}{}", "x".repeat(2500)));
                t
            })
            .collect();

        let policy = OptimizationPolicy::default();
        let pricing = PricingTable::default();
        let recs = find_optimizations(&traces, &pricing, &policy);
        // Distinct leading chars keep the cache detector quiet.
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].kind, RecommendationKind::PromptOptimization);

        let per_call = pricing.cost_for(traces[0].llm.as_ref().unwrap()).unwrap();
        let expected = per_call * 11.0 * policy.prompt_savings_ratio;
        assert!((recs[0].potential_savings - expected).abs() < 1e-9);
    }

    #[test]
    fn test_long_prompt_count_at_threshold_not_flagged() {
        // "More than 10" means exactly 10 stays quiet.
        let traces: Vec<Trace> = (0..10)
            .map(|i| {
                let mut t = llm_trace(&format!("t{i}"), "gpt-4o", None, i * 60_000);
                t.llm.as_mut().unwrap().input = Some(format!("{i}{}", "x".repeat(2500)));
                t
            })
            .collect();

        let recs = find_optimizations(
            &traces,
            &PricingTable::default(),
            &OptimizationPolicy::default(),
        );
        assert!(recs.is_empty());
    }

    #[test]
    fn test_rapid_fire_calls_suggest_batching() {
        let traces: Vec<Trace> = (0..25)
            .map(|i| llm_trace(&format!("t{i}"), "gpt-3.5-turbo", None, i * 200))
            .collect();

        let recs = find_optimizations(
            &traces,
            &PricingTable::default(),
            &OptimizationPolicy::default(),
        );
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].kind, RecommendationKind::Batching);
        assert_eq!(recs[0].impact, Impact::Low);
    }

    #[test]
    fn test_rapid_count_at_threshold_not_flagged() {
        // "More than 20" means exactly 20 burst-involved calls stay quiet.
        let traces: Vec<Trace> = (0..20)
            .map(|i| llm_trace(&format!("t{i}"), "gpt-3.5-turbo", None, i * 200))
            .collect();

        let recs = find_optimizations(
            &traces,
            &PricingTable::default(),
            &OptimizationPolicy::default(),
        );
        assert!(recs.is_empty());
    }

    #[test]
    fn test_recommendations_sorted_by_savings() {
        // Downgrade candidates and a rapid-fire burst at once.
        let mut traces: Vec<Trace> = (0..25)
            .map(|i| llm_trace(&format!("t{i}"), "gpt-4o", Some(9.5), i * 200))
            .collect();
        traces.extend((0..5).map(|i| {
            llm_trace(&format!("cheap{i}"), "gpt-3.5-turbo", None, 10_000_000 + i * 60_000)
        }));

        let recs = find_optimizations(
            &traces,
            &PricingTable::default(),
            &OptimizationPolicy::default(),
        );
        assert!(recs.len() >= 2);
        for pair in recs.windows(2) {
            assert!(pair[0].potential_savings >= pair[1].potential_savings);
        }
    }

    #[test]
    fn test_empty_input_yields_no_recommendations() {
        let recs = find_optimizations(
            &[],
            &PricingTable::default(),
            &OptimizationPolicy::default(),
        );
        assert!(recs.is_empty());
    }
}

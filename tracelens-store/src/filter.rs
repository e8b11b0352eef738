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

//! Query filters and aggregate statistics, shared by both store modes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracelens_core::{EvalStatus, Trace};

pub const DEFAULT_QUERY_LIMIT: usize = 50;

/// Filter applied on read.
#[derive(Debug, Clone, Deserialize)]
pub struct TraceFilter {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    /// Substring match against `llm.model`.
    #[serde(default)]
    pub model: Option<String>,
    /// Exact match against `evaluation.status`.
    #[serde(default)]
    pub status: Option<EvalStatus>,
    /// Keep only traces with an `llm` record.
    #[serde(default)]
    pub llm_only: bool,
}

fn default_limit() -> usize {
    DEFAULT_QUERY_LIMIT
}

impl Default for TraceFilter {
    fn default() -> Self {
        Self {
            limit: DEFAULT_QUERY_LIMIT,
            offset: 0,
            model: None,
            status: None,
            llm_only: false,
        }
    }
}

impl TraceFilter {
    pub fn matches(&self, trace: &Trace) -> bool {
        if self.llm_only && trace.llm.is_none() {
            return false;
        }
        if let Some(model) = &self.model {
            match &trace.llm {
                Some(llm) if llm.model.contains(model.as_str()) => {}
                _ => return false,
            }
        }
        if let Some(status) = self.status {
            match &trace.evaluation {
                Some(eval) if eval.status == Some(status) => {}
                _ => return false,
            }
        }
        true
    }

    /// Apply filter and pagination over a most-recent-first sequence.
    /// Returns the page and the total number of matching traces.
    pub fn paginate<'a, I>(&self, traces: I) -> (Vec<Trace>, usize)
    where
        I: Iterator<Item = &'a Trace>,
    {
        let matching: Vec<&Trace> = traces.filter(|t| self.matches(t)).collect();
        let total = matching.len();
        let page = matching
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .cloned()
            .collect();
        (page, total)
    }
}

/// Counts grouped by unified evaluation state. `pending` counts traces with
/// no evaluation at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalStatusCounts {
    pub pass: u64,
    pub fail: u64,
    pub review: u64,
    pub pending: u64,
}

/// On-demand aggregate statistics for a trace collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStats {
    pub total: u64,
    pub llm_count: u64,
    pub evaluated_count: u64,
    pub by_eval_status: EvalStatusCounts,
    pub by_vendor: BTreeMap<String, u64>,
    pub by_model: BTreeMap<String, u64>,
    /// Sum of `totalTokens` across LLM traces.
    pub total_tokens: u64,
}

/// Compute stats over a trace sequence.
pub fn compute_stats<'a, I>(traces: I) -> TraceStats
where
    I: Iterator<Item = &'a Trace>,
{
    let mut stats = TraceStats::default();

    for trace in traces {
        stats.total += 1;

        match trace.evaluation.as_ref().and_then(|e| e.status) {
            Some(EvalStatus::Pass) => stats.by_eval_status.pass += 1,
            Some(EvalStatus::Fail) => stats.by_eval_status.fail += 1,
            Some(EvalStatus::Review) => stats.by_eval_status.review += 1,
            None => stats.by_eval_status.pending += 1,
        }
        if trace.evaluation.is_some() {
            stats.evaluated_count += 1;
        }

        if let Some(llm) = &trace.llm {
            stats.llm_count += 1;
            stats.total_tokens += llm.total_tokens;
            *stats.by_vendor.entry(llm.vendor.clone()).or_insert(0) += 1;
            *stats.by_model.entry(llm.model.clone()).or_insert(0) += 1;
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests::llm_trace;
    use tracelens_core::Evaluation;

    #[test]
    fn test_model_substring_filter() {
        let traces = vec![
            llm_trace("a", "openai", "gpt-4o"),
            llm_trace("b", "openai", "gpt-4o-mini"),
            llm_trace("c", "anthropic", "claude-3-haiku"),
        ];

        let filter = TraceFilter {
            model: Some("gpt-4o".to_string()),
            ..Default::default()
        };
        let (page, total) = filter.paginate(traces.iter());
        assert_eq!(total, 2);
        assert_eq!(page.len(), 2);
    }

    #[test]
    fn test_status_filter_exact() {
        let mut passing = llm_trace("a", "openai", "gpt-4o");
        passing.evaluation = Some(Evaluation {
            score: Some(9.0),
            status: Some(EvalStatus::Pass),
            ..Default::default()
        });
        let pending = llm_trace("b", "openai", "gpt-4o");

        let filter = TraceFilter {
            status: Some(EvalStatus::Pass),
            ..Default::default()
        };
        let (page, total) = filter.paginate([&passing, &pending].into_iter());
        assert_eq!(total, 1);
        assert_eq!(page[0].id, "a");
    }

    #[test]
    fn test_llm_only_filter() {
        let mut plain = llm_trace("a", "openai", "gpt-4o");
        plain.llm = None;
        let call = llm_trace("b", "openai", "gpt-4o");

        let filter = TraceFilter {
            llm_only: true,
            ..Default::default()
        };
        let (page, total) = filter.paginate([&plain, &call].into_iter());
        assert_eq!(total, 1);
        assert_eq!(page[0].id, "b");
    }

    #[test]
    fn test_pagination_window() {
        let traces: Vec<_> = (0..10)
            .map(|i| llm_trace(&format!("t{}", i), "openai", "gpt-4o"))
            .collect();

        let filter = TraceFilter {
            limit: 3,
            offset: 4,
            ..Default::default()
        };
        let (page, total) = filter.paginate(traces.iter());
        assert_eq!(total, 10);
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].id, "t4");
    }

    #[test]
    fn test_stats_grouping() {
        let mut a = llm_trace("a", "openai", "gpt-4o");
        a.evaluation = Some(Evaluation {
            score: Some(9.0),
            status: Some(EvalStatus::Pass),
            ..Default::default()
        });
        let b = llm_trace("b", "openai", "gpt-4o-mini");
        let mut c = llm_trace("c", "anthropic", "claude-3-haiku");
        c.llm = None;

        let stats = compute_stats([&a, &b, &c].into_iter());
        assert_eq!(stats.total, 3);
        assert_eq!(stats.llm_count, 2);
        assert_eq!(stats.evaluated_count, 1);
        assert_eq!(stats.by_eval_status.pass, 1);
        assert_eq!(stats.by_eval_status.pending, 2);
        assert_eq!(stats.by_vendor.get("openai"), Some(&2));
        assert_eq!(stats.by_model.get("gpt-4o"), Some(&1));
        assert_eq!(stats.total_tokens, 30);
    }
}

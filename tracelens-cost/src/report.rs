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

//! Cost aggregation across a trace collection

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::pricing::PricingTable;
use tracelens_core::Trace;

/// Aggregated cost view. `daily_costs` keys are `YYYY-MM-DD`, which sorts
/// ascending by construction in the BTreeMap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostReport {
    pub total_cost: f64,
    pub by_model: BTreeMap<String, f64>,
    pub by_platform: BTreeMap<String, f64>,
    pub daily_costs: BTreeMap<String, f64>,
    pub avg_per_task: f64,
    /// Mean observed daily cost extrapolated to a 30-day month. Averaging
    /// across observed days avoids single-day skew.
    pub projected_monthly_cost: f64,
    pub trace_count: u64,
    /// (vendor, model) pairs costed at $0 because no pricing entry matched.
    pub unpriced_models: Vec<String>,
}

/// Compute the cost report. Traces without an `llm` record are skipped;
/// unpriced model calls contribute $0 and are listed separately.
pub fn calculate_costs(traces: &[Trace], pricing: &PricingTable) -> CostReport {
    let mut report = CostReport::default();
    let mut unpriced = BTreeSet::new();

    for trace in traces {
        let Some(llm) = &trace.llm else {
            continue;
        };
        report.trace_count += 1;

        let cost = match pricing.cost_for(llm) {
            Some(cost) => cost,
            None => {
                unpriced.insert(format!("{}/{}", llm.vendor, llm.model));
                0.0
            }
        };

        report.total_cost += cost;
        *report.by_model.entry(llm.model.clone()).or_insert(0.0) += cost;
        *report.by_platform.entry(llm.vendor.clone()).or_insert(0.0) += cost;

        let day = trace.start_time.format("%Y-%m-%d").to_string();
        *report.daily_costs.entry(day).or_insert(0.0) += cost;
    }

    if report.trace_count > 0 {
        report.avg_per_task = report.total_cost / report.trace_count as f64;
    }
    if !report.daily_costs.is_empty() {
        let daily_sum: f64 = report.daily_costs.values().sum();
        report.projected_monthly_cost = daily_sum / report.daily_costs.len() as f64 * 30.0;
    }

    report.unpriced_models = unpriced.into_iter().collect();
    report
}

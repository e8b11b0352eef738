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

//! # TraceLens Cost
//!
//! Pricing-driven cost aggregation over stored traces, plus four heuristic
//! savings detectors. The detectors estimate *potential* savings from fixed,
//! named assumption ratios in [`OptimizationPolicy`]; they never claim to
//! verify realized savings.
//!
//! Traces without an `llm` record are excluded from every aggregate here.
//! Model/vendor pairs missing from the pricing table cost $0 and are
//! surfaced in `CostReport::unpriced_models` instead of erroring.

pub mod optimize;
pub mod pricing;
pub mod report;

pub use optimize::{
    find_optimizations, Impact, OptimizationPolicy, Recommendation, RecommendationKind,
};
pub use pricing::{ModelPrice, PricingTable};
pub use report::{calculate_costs, CostReport};

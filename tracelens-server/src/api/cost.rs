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

use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{ApiError, AppState};
use tracelens_cost::{calculate_costs, find_optimizations, CostReport, ModelPrice, Recommendation};

#[derive(Debug, Serialize)]
pub struct OptimizationsResponse {
    pub recommendations: Vec<Recommendation>,
}

/// One pricing entry to insert or overwrite.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingUpdate {
    pub vendor: String,
    pub model: String,
    pub input_per_1m: f64,
    pub output_per_1m: f64,
}

#[derive(Debug, Serialize)]
pub struct PricingUpdateResponse {
    pub updated: usize,
}

/// GET /api/v1/costs - Cost report over the caller's traces.
pub async fn get_costs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CostReport>, ApiError> {
    let ctx = state.identity(&headers)?;
    let traces = state.snapshot(&ctx).await?;
    let report = calculate_costs(&traces, &state.pricing.read());
    Ok(Json(report))
}

/// GET /api/v1/costs/optimizations - Savings recommendations.
pub async fn get_optimizations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<OptimizationsResponse>, ApiError> {
    let ctx = state.identity(&headers)?;
    let traces = state.snapshot(&ctx).await?;
    let recommendations = find_optimizations(&traces, &state.pricing.read(), &state.policy);
    Ok(Json(OptimizationsResponse { recommendations }))
}

/// PUT /api/v1/costs/pricing - Insert or overwrite pricing entries.
pub async fn update_pricing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(updates): Json<Vec<PricingUpdate>>,
) -> Result<Json<PricingUpdateResponse>, ApiError> {
    state.identity(&headers)?;
    if updates.is_empty() {
        return Err(ApiError::BadRequest("no pricing entries given".to_string()));
    }
    for update in &updates {
        if update.input_per_1m < 0.0 || update.output_per_1m < 0.0 {
            return Err(ApiError::BadRequest(format!(
                "negative price for {}/{}",
                update.vendor, update.model
            )));
        }
    }

    let updated = updates.len();
    let mut pricing = state.pricing.write();
    for update in updates {
        pricing.set(
            update.vendor,
            update.model,
            ModelPrice::new(update.input_per_1m, update.output_per_1m),
        );
    }
    info!(updated, "pricing table updated");

    Ok(Json(PricingUpdateResponse { updated }))
}

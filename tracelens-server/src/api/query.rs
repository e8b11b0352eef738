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

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{ApiError, AppState};
use tracelens_core::{EvalStatus, Trace};
use tracelens_store::{TraceFilter, TraceStats, DEFAULT_QUERY_LIMIT};

/// Query parameters for listing traces
#[derive(Debug, Default, Deserialize)]
pub struct TraceQueryParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Substring match against the model name
    pub model: Option<String>,
    /// Exact evaluation status (pass | fail | review)
    pub status: Option<String>,
    /// Keep only LLM-call traces
    pub llm_only: Option<bool>,
}

impl TraceQueryParams {
    fn into_filter(self) -> Result<TraceFilter, ApiError> {
        let status = match self.status.as_deref() {
            None => None,
            Some("pass") => Some(EvalStatus::Pass),
            Some("fail") => Some(EvalStatus::Fail),
            Some("review") => Some(EvalStatus::Review),
            Some(other) => {
                return Err(ApiError::BadRequest(format!(
                    "unknown status '{other}', expected pass, fail or review"
                )))
            }
        };
        Ok(TraceFilter {
            limit: self.limit.unwrap_or(DEFAULT_QUERY_LIMIT),
            offset: self.offset.unwrap_or(0),
            model: self.model,
            status,
            llm_only: self.llm_only.unwrap_or(false),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct TraceListResponse {
    pub traces: Vec<Trace>,
    pub pagination: Pagination,
    pub stats: TraceStats,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: usize,
}

/// GET /api/v1/traces - Filtered, paginated listing with aggregate stats.
pub async fn list_traces(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<TraceQueryParams>,
) -> Result<Json<TraceListResponse>, ApiError> {
    let ctx = state.identity(&headers)?;
    let filter = params.into_filter()?;

    let (traces, total) = state.query(&ctx, &filter).await?;
    let stats = state.stats(&ctx).await?;
    debug!(total, page = traces.len(), "listed traces");

    let has_more = filter.offset + traces.len() < total;
    Ok(Json(TraceListResponse {
        traces,
        pagination: Pagination {
            total,
            limit: filter.limit,
            offset: filter.offset,
            has_more,
        },
        stats,
    }))
}

/// GET /api/v1/traces/:id - Single trace lookup.
pub async fn get_trace(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Trace>, ApiError> {
    let ctx = state.identity(&headers)?;
    state
        .get(&ctx, &id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("trace {id}")))
}

/// DELETE /api/v1/traces - Clear the caller's scope.
pub async fn clear_traces(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DeleteResponse>, ApiError> {
    let ctx = state.identity(&headers)?;
    let deleted = state.clear(&ctx).await?;
    Ok(Json(DeleteResponse { deleted }))
}

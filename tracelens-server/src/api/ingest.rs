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
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use crate::api::{ApiError, AppState};
use tracelens_ingest::TracePayload;

// Disambiguates SDK batches that land in the same millisecond; the adapter
// itself stays a pure function of its arguments.
static BATCH_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// Traces accepted from this request.
    pub received: usize,
    /// Caller-visible store size after the insert.
    pub total: usize,
}

fn require_json(headers: &HeaderMap) -> Result<(), ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if content_type.starts_with("application/json") {
        Ok(())
    } else {
        Err(ApiError::UnsupportedMediaType)
    }
}

/// POST /api/v1/traces - Ingest a batch in either supported wire format.
///
/// The content type is checked before the body is parsed, and a payload that
/// matches neither format rejects the whole batch.
pub async fn ingest_traces(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestResponse>, ApiError> {
    require_json(&headers)?;
    let ctx = state.identity(&headers)?;

    let payload =
        TracePayload::decode(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let traces = payload.into_traces(Utc::now(), BATCH_SEQ.fetch_add(1, Ordering::Relaxed));
    let received = traces.len();
    debug!(received, user = ?ctx.user_id, "decoded ingestion batch");

    let total = state.insert(&ctx, traces).await?;
    info!(received, total, "ingested traces");

    Ok(Json(IngestResponse { received, total }))
}

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
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

use crate::auth::{AuthContext, AuthResolver};
use tracelens_core::{Evaluation, Trace};
use tracelens_cost::{OptimizationPolicy, PricingTable};
use tracelens_evals::JudgeClient;
use tracelens_store::{
    BoundedTraceBuffer, ScopedTraceStore, StoreError, TraceFilter, TraceStats,
};

pub mod cost;
pub mod evaluate;
pub mod health;
pub mod ingest;
pub mod query;

pub use cost::{get_costs, get_optimizations, update_pricing};
pub use evaluate::{evaluate_heuristic, evaluate_human, evaluate_judge};
pub use health::health_check;
pub use ingest::ingest_traces;
pub use query::{clear_traces, get_trace, list_traces};

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unsupported media type: expected application/json")]
    UnsupportedMediaType,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Judge unavailable: {0}")]
    JudgeUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::UnsupportedMediaType => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "expected application/json".to_string(),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::JudgeUnavailable(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Anonymous ingestion path.
    pub buffer: Arc<BoundedTraceBuffer>,
    /// Authenticated path, keyed by resolved identity.
    pub scoped: Arc<dyn ScopedTraceStore>,
    pub pricing: Arc<RwLock<PricingTable>>,
    pub policy: OptimizationPolicy,
    pub judge: Option<Arc<dyn JudgeClient>>,
    pub pass_threshold: f64,
    pub auth: Arc<dyn AuthResolver>,
}

impl AppState {
    /// Resolve the caller's identity from request headers.
    pub fn identity(&self, headers: &HeaderMap) -> Result<AuthContext, ApiError> {
        self.auth
            .resolve(headers)
            .map_err(|_| ApiError::Unauthorized)
    }

    /// Insert into the caller's store; returns the post-insert size.
    pub async fn insert(
        &self,
        ctx: &AuthContext,
        traces: Vec<Trace>,
    ) -> Result<usize, ApiError> {
        match ctx.scope() {
            Some(scope) => Ok(self.scoped.insert(&scope, traces).await?),
            None => Ok(self.buffer.insert(traces)),
        }
    }

    pub async fn query(
        &self,
        ctx: &AuthContext,
        filter: &TraceFilter,
    ) -> Result<(Vec<Trace>, usize), ApiError> {
        match ctx.scope() {
            Some(scope) => Ok(self.scoped.query(&scope, filter).await?),
            None => Ok(self.buffer.query(filter)),
        }
    }

    pub async fn get(&self, ctx: &AuthContext, id: &str) -> Result<Option<Trace>, ApiError> {
        match ctx.scope() {
            Some(scope) => Ok(self.scoped.get(&scope, id).await?),
            None => Ok(self.buffer.get(id)),
        }
    }

    pub async fn set_evaluation(
        &self,
        ctx: &AuthContext,
        id: &str,
        evaluation: Evaluation,
    ) -> Result<bool, ApiError> {
        match ctx.scope() {
            Some(scope) => Ok(self.scoped.set_evaluation(&scope, id, evaluation).await?),
            None => Ok(self.buffer.set_evaluation(id, evaluation)),
        }
    }

    pub async fn stats(&self, ctx: &AuthContext) -> Result<TraceStats, ApiError> {
        match ctx.scope() {
            Some(scope) => Ok(self.scoped.aggregate_stats(&scope).await?),
            None => Ok(self.buffer.aggregate_stats()),
        }
    }

    pub async fn clear(&self, ctx: &AuthContext) -> Result<usize, ApiError> {
        match ctx.scope() {
            Some(scope) => Ok(self.scoped.clear(&scope).await?),
            None => Ok(self.buffer.clear()),
        }
    }

    /// Every trace visible to the caller, most recent first. Feeds the cost
    /// and optimization aggregates, which need the full collection.
    pub async fn snapshot(&self, ctx: &AuthContext) -> Result<Vec<Trace>, ApiError> {
        match ctx.scope() {
            Some(scope) => {
                let unbounded = TraceFilter {
                    limit: usize::MAX,
                    ..Default::default()
                };
                let (traces, _) = self.scoped.query(&scope, &unbounded).await?;
                Ok(traces)
            }
            None => Ok(self.buffer.snapshot()),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::auth::StaticKeyResolver;
    use crate::config::AuthConfig;
    use chrono::{TimeZone, Utc};
    use tracelens_core::{
        LlmCall, SpanKind, TraceSource, TraceStatus, DEFAULT_PASS_THRESHOLD,
    };
    use tracelens_store::InMemoryScopedStore;

    pub(crate) fn state() -> AppState {
        state_with_judge(None)
    }

    pub(crate) fn state_with_judge(judge: Option<Arc<dyn JudgeClient>>) -> AppState {
        AppState {
            buffer: Arc::new(BoundedTraceBuffer::default()),
            scoped: Arc::new(InMemoryScopedStore::default()),
            pricing: Arc::new(RwLock::new(PricingTable::default())),
            policy: OptimizationPolicy::default(),
            judge,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            auth: Arc::new(StaticKeyResolver::from_config(&AuthConfig {
                enabled: true,
                api_keys: vec!["secret:alice".to_string()],
            })),
        }
    }

    pub(crate) fn llm_trace(id: &str, vendor: &str, model: &str) -> Trace {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut call = LlmCall::new(vendor, model, 10, 5, None);
        call.input = Some("what is the refund window".to_string());
        call.output = Some("Refunds are accepted within 30 days of purchase.".to_string());
        Trace {
            id: id.to_string(),
            trace_id: "t".to_string(),
            span_id: id.to_string(),
            parent_span_id: None,
            name: model.to_string(),
            kind: SpanKind::Client,
            start_time: at,
            end_time: at,
            duration_ms: 0,
            status: TraceStatus::Unset,
            attributes: Default::default(),
            llm: Some(call),
            evaluation: None,
            received_at: at,
            source: TraceSource::Manual,
        }
    }
}

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

pub mod api;
pub mod auth;
pub mod config;

use anyhow::Result;
use axum::{
    routing::{get, post, put},
    Router,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::AppState;
use auth::StaticKeyResolver;
use config::ServerConfig;
use tracelens_cost::{OptimizationPolicy, PricingTable};
use tracelens_evals::{HttpJudgeClient, JudgeClient};
use tracelens_store::{BoundedTraceBuffer, InMemoryScopedStore};

/// Assemble the API router over a prepared state. Exposed separately from
/// [`run_server`] so tests can drive the router directly.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(api::health_check))
        .route(
            "/api/v1/traces",
            post(api::ingest_traces)
                .get(api::list_traces)
                .delete(api::clear_traces),
        )
        .route("/api/v1/traces/:id", get(api::get_trace))
        .route("/api/v1/costs", get(api::get_costs))
        .route("/api/v1/costs/optimizations", get(api::get_optimizations))
        .route("/api/v1/costs/pricing", put(api::update_pricing))
        .route("/api/v1/evaluations/judge", post(api::evaluate_judge))
        .route("/api/v1/evaluations/heuristic", post(api::evaluate_heuristic))
        .route("/api/v1/evaluations/human", post(api::evaluate_human))
        .with_state(state)
}

/// Build the application state from a validated configuration.
pub fn build_state(config: &ServerConfig) -> AppState {
    let judge: Option<Arc<dyn JudgeClient>> = if config.judge.api_key.is_some() {
        match HttpJudgeClient::new(config.judge.clone()) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!("judge disabled: {e}");
                None
            }
        }
    } else {
        None
    };

    AppState {
        buffer: Arc::new(BoundedTraceBuffer::new(
            config.store.capacity,
            config.store.pass_threshold,
        )),
        scoped: Arc::new(InMemoryScopedStore::new(config.store.pass_threshold)),
        pricing: Arc::new(RwLock::new(PricingTable::default())),
        policy: OptimizationPolicy::default(),
        judge,
        pass_threshold: config.store.pass_threshold,
        auth: Arc::new(StaticKeyResolver::from_config(&config.auth)),
    }
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tracelens_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting TraceLens server");
    config.validate()?;

    let state = build_state(&config);
    let mut app = router(state).layer(TraceLayer::new_for_http());

    if config.server.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr).await?;
    tracing::info!("Listening on {}", config.server.listen_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

pub mod auth;
pub mod handler;
pub mod middleware;
pub mod response;

use arc_swap::ArcSwap;
use axum::http::Request;
use axum::{Router, middleware as axum_mw};
use keymeter_core::config::Config;
use keymeter_core::cost::CostCalculator;
use keymeter_core::keys::KeyLookup;
use keymeter_core::metrics::Metrics;
use keymeter_core::usage::{UsageAggregator, UsageLedger};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ArcSwap<Config>>,
    /// Key registry consulted by both usage endpoints.
    pub keys: Arc<dyn KeyLookup>,
    /// Answers public usage queries.
    pub usage: Arc<dyn UsageAggregator>,
    /// Receives ingested records.
    pub ledger: Arc<UsageLedger>,
    pub cost_calculator: Arc<CostCalculator>,
    pub metrics: Arc<Metrics>,
}

pub fn build_router(state: AppState) -> Router {
    let body_limit_bytes = state.config.load().body_limit_mb * 1024 * 1024;

    // Public routes — no auth required
    let public_routes = Router::new()
        .route("/health", axum::routing::get(handler::health::health))
        .route("/metrics", axum::routing::get(handler::health::metrics))
        .route(
            "/api/v1/public/usage",
            axum::routing::get(handler::public::usage),
        );

    // Internal routes — admin token required, with body size limit
    let internal_routes = Router::new()
        .route(
            "/api/v1/internal/usage",
            axum::routing::post(handler::ingest::record_usage),
        )
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            auth::admin_auth_middleware,
        ));

    // Compose, then global middleware layers (outer → inner)
    Router::new()
        .merge(public_routes)
        .merge(internal_routes)
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::request_logging::request_logging_middleware,
        ))
        .layer(axum_mw::from_fn(
            middleware::request_context::request_context_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
            // Path only: the public usage query string carries an API key
            tracing::info_span!("http", method = %req.method(), path = %req.uri().path())
        }))
        .with_state(state)
}

//! Router assembly (spec §6), grounded on the teacher's `build_app`: a
//! public route group (health, callback links) and an authenticated group
//! wrapped in the auth → rate-limit middleware chain, merged under one
//! `CorsLayer`/`TraceLayer` and the shared [`AppState`].

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::middleware::auth::auth_middleware;
use super::middleware::ip_extractor::extract_client_ip;
use super::middleware::rate_limit::rate_limit_middleware;
use super::routes::{calendar, callback, health, requests};
use super::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let protected = calendar::router().merge(requests::router()).layer(
        axum::middleware::from_fn_with_state(state.clone(), rate_limit_middleware),
    ).layer(
        axum::middleware::from_fn_with_state(state.clone(), auth_middleware),
    );

    let public = Router::new()
        .route("/api/health", get(health::health_handler))
        .merge(callback::router());

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    public
        .merge(protected)
        .layer(axum::middleware::from_fn(extract_client_ip))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

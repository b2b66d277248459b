// src/routes.rs

use axum::{
    Router,
    http::Method,
    middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{daily, profile, quiz},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * All routes require a bearer token; auth is an external concern and
///   this service only verifies it.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (pool, config, session store, judge client).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let quiz_routes = Router::new()
        .route("/{id}/session", post(quiz::start_session))
        .route("/{id}/practice", post(quiz::practice_submit));

    let session_routes = Router::new()
        .route("/{id}/begin", post(quiz::begin_session))
        .route("/{id}/answers", post(quiz::record_answer))
        .route("/{id}/events", post(quiz::session_events))
        .route("/{id}/submit", post(quiz::submit_session))
        .route("/{id}/forfeit", post(quiz::forfeit_session));

    let daily_routes = Router::new()
        .route("/", get(daily::get_daily))
        .route("/forfeit", post(daily::forfeit_daily))
        .route("/code", post(daily::submit_daily_code));

    let profile_routes = Router::new()
        .route("/me", get(profile::get_me))
        .route("/attempts", get(profile::get_attempts))
        .route("/attempts/{id}", get(profile::get_attempt_detail));

    Router::new()
        .nest("/api/quiz", quiz_routes)
        .nest("/api/session", session_routes)
        .nest("/api/daily", daily_routes)
        .nest("/api/profile", profile_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

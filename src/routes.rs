// src/routes.rs

use axum::{
    Router,
    http::Method,
    middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{handlers::attempts, state::AppState, utils::jwt::auth_middleware};

/// Assembles the main application router.
///
/// * Attempt routes (start, save, progress, submit) behind the identity
///   middleware.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (stores, buffer, config).
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

    let exam_routes = Router::new().route("/{exam_id}/attempts", post(attempts::start_attempt));

    let attempt_routes = Router::new()
        .route("/{id}", get(attempts::get_attempt))
        .route("/{id}/answers", post(attempts::save_answer))
        .route("/{id}/answers/batch", post(attempts::save_batch))
        .route("/{id}/progress", get(attempts::get_progress))
        .route("/{id}/submit", post(attempts::submit_attempt));

    Router::new()
        .nest("/api/exams", exam_routes)
        .nest("/api/attempts", attempt_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

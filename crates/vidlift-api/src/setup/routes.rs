//! Route configuration and setup.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use vidlift_core::constants::API_PREFIX;

use crate::handlers::{health, objects, sessions, signed};
use crate::state::AppState;

/// Headroom above the largest accepted part for non-part request bodies.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

/// Setup all application routes
pub fn setup_routes(state: Arc<AppState>) -> Router<()> {
    let body_limit = state.config.max_part_size_bytes() as usize + BODY_LIMIT_SLACK;

    let api = Router::new()
        .route("/sessions", post(sessions::initiate_session))
        .route(
            "/sessions/{id}",
            get(sessions::session_progress).delete(sessions::abort_session),
        )
        .route("/sessions/{id}/parts/{index}", put(sessions::submit_part))
        .route(
            "/sessions/{id}/parts/{index}/ack",
            post(sessions::acknowledge_part),
        )
        .route("/sessions/{id}/finalize", post(sessions::finalize_session))
        .route("/objects", get(objects::list_objects))
        .route(
            "/objects/{*name}",
            get(objects::get_object).delete(objects::delete_object),
        )
        .route("/objects-size/{*name}", get(objects::object_size))
        .route("/presign", get(objects::presign))
        .route(
            "/signed/{*key}",
            get(signed::signed_get).put(signed::signed_put),
        )
        .route("/health", get(health::health_check));

    // Browsers uploading straight to signed URLs need to read the ETag back
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::PUT, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::RANGE])
        .expose_headers([header::ETAG, header::CONTENT_RANGE]);

    Router::new()
        .nest(API_PREFIX, api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

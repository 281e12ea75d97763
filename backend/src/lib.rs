//! Reddit MCP server library.
//!
//! This module exposes the application builder for use in tests.

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::{
    routing::{get, post},
    Router,
};
use reddit_mcp_types::SESSION_ID_HEADER;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod api;
pub mod config;
pub mod mcp;
pub mod openapi;
pub mod operations;
pub mod reddit;
pub mod state;

use state::AppState;

/// Create the Axum application router.
///
/// This function is used both by the main server binary and by integration tests.
pub fn create_app() -> Router {
    create_app_with_state(AppState::default())
}

/// Create the Axum application router with a given state.
pub fn create_app_with_state(state: AppState) -> Router {
    create_app_with_config(state, Vec::new())
}

/// Create the Axum application router with a given state and CORS origins.
///
/// If `cors_allowed_origins` is empty, any origin is allowed.
/// Otherwise, only the specified origins are allowed.
pub fn create_app_with_config(state: AppState, cors_allowed_origins: Vec<String>) -> Router {
    let session_header = HeaderName::from_static(SESSION_ID_HEADER);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
            session_header.clone(),
            HeaderName::from_static("mcp-protocol-version"),
        ])
        .expose_headers([session_header]);

    // If no origins specified, allow any origin
    let cors = if cors_allowed_origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = cors_allowed_origins
            .iter()
            .filter_map(|o| o.parse::<HeaderValue>().ok())
            .collect();
        cors.allow_origin(origins)
    };

    Router::new()
        .route(
            "/mcp",
            post(api::mcp::mcp_post)
                .get(api::mcp::mcp_get)
                .delete(api::mcp::mcp_delete),
        )
        .route("/health", get(api::health::health))
        .merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
        .layer(CatchPanicLayer::custom(api::mcp::panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

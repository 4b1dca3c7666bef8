use axum::{
    http::{header, HeaderValue},
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::static_files::static_handler;
use super::state::AppState;

/// The full application: UI and API routes plus the shared middleware stack.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(ui_routes())
        .merge(api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .with_state(state)
}

// UI Routes - web interface
pub fn ui_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::ui::index_handler))
        .route("/static/{*path}", get(static_handler))
}

// API Routes - JSON API the page talks to
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            // System
            .route("/status", get(handlers::api::system_status))
            .route("/providers", get(handlers::api::list_providers))
            .route("/schema", get(handlers::api::get_schema))
            // Sessions
            .route("/sessions", post(handlers::api::create_session))
            .route(
                "/sessions/{id}",
                get(handlers::api::get_session).delete(handlers::api::delete_session),
            )
            .route("/sessions/{id}/settings", put(handlers::api::update_settings))
            .route("/sessions/{id}/ask", post(handlers::api::ask))
            .route("/sessions/{id}/history", delete(handlers::api::clear_history))
            // Data export
            .route("/sessions/{id}/export/{format}", get(handlers::api::export_result)),
    )
}

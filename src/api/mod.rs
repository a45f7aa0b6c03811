//! HTTP surface: route table and shared handler plumbing.

pub mod ingest;
pub mod orders;

pub use ingest::{load_orders, price_info};
pub use orders::{create_order, delete_order, get_order, list_orders, update_order};

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use tracing::error;

use crate::AppState;

/// Assemble the full route table. Domain routes live under /api; the
/// banner and the health probe stay at the root.
pub fn router(state: AppState) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/load", post(ingest::load_orders))
        .route("/api/price-info", get(ingest::price_info))
        .route(
            "/api/orders",
            get(orders::list_orders).post(orders::create_order),
        )
        .route(
            "/api/orders/:id",
            get(orders::get_order)
                .put(orders::update_order)
                .delete(orders::delete_order),
        )
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "orderdesk-backend",
        "message": "Active order replay and query service",
    }))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "orderdesk-backend",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Storage problems surface as opaque 500s; the detail goes to the log.
pub(crate) fn storage_error(e: anyhow::Error) -> (StatusCode, String) {
    error!("❌ storage failure: {e:#}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal storage error".to_string(),
    )
}

//! Orderdesk - active-order replay and query service
//!
//! Boot sequence: env → tracing → config → store open + schema reset →
//! router → serve. The store handle is built here and injected into the
//! handlers; nothing holds module-level state.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::middleware;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orderdesk_backend::{
    api, middleware::request_logging, models::Config, store::OrderStore, AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment and logging
    load_env();
    init_tracing();

    info!("🚀 Orderdesk starting - order replay and query service");

    let config = Config::from_env()?;
    let db_path = resolve_data_path(&config.database_path)?;

    let store = Arc::new(OrderStore::new(&db_path)?);
    // Fresh snapshot per boot: the uploaded event log is the source of
    // truth, so the table is rebuilt rather than carried over.
    store.reset().await?;
    info!("📊 Order store initialized at: {}", db_path);

    let state = AppState {
        store,
        config: config.clone(),
    };

    let app = api::router(state)
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("🎯 API server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orderdesk=info,orderdesk_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate dir .env (common when running with
    // --manifest-path from elsewhere)
    let manifest_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidates = [manifest_dir.join(".env"), manifest_dir.join("../.env")];
    for p in candidates {
        if p.exists() {
            let _ = dotenv::from_path(&p);
        }
    }
}

/// Anchor relative database paths to the crate directory so running from
/// another working directory doesn't create a stray empty DB. The parent
/// directory is created if missing.
fn resolve_data_path(raw: &str) -> Result<String> {
    let p = PathBuf::from(raw);
    let resolved = if p.is_absolute() {
        p
    } else {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(p)
    };

    if let Some(parent) = resolved.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data dir {}", parent.display()))?;
    }
    Ok(resolved.to_string_lossy().to_string())
}

//! Ingestion and aggregate queries: file upload → replay → bulk load, and
//! the best-price lookup.

use axum::{
    extract::{Multipart, Query, State as AxumState},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::{parse_timestamp, BestPrices, LiveOrder};
use crate::replay;
use crate::AppState;

use super::storage_error;

#[derive(Debug, Serialize)]
pub struct LoadResponse {
    pub detail: String,
    pub orders_loaded: usize,
    pub events_processed: usize,
    pub timestamp: String,
}

fn has_csv_extension(file_name: &str) -> bool {
    file_name.to_ascii_lowercase().ends_with(".csv")
}

/// Replace nothing, append everything: the upload is replayed into live
/// orders and bulk-appended to the store (repeated uploads duplicate).
pub async fn load_orders(
    AxumState(state): AxumState<AppState>,
    mut multipart: Multipart,
) -> Result<Json<LoadResponse>, (StatusCode, String)> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("malformed multipart body: {e}")))?
    {
        // The upload is whichever part carries a filename.
        let Some(file_name) = field.file_name().map(|name| name.to_string()) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("failed to read upload: {e}")))?;
        upload = Some((file_name, data.to_vec()));
        break;
    }

    let Some((file_name, data)) = upload else {
        return Err((StatusCode::BAD_REQUEST, "missing file upload".to_string()));
    };

    if !has_csv_extension(&file_name) {
        return Err((
            StatusCode::BAD_REQUEST,
            "Invalid file format. Only CSV files are allowed.".to_string(),
        ));
    }

    let text = String::from_utf8(data)
        .map_err(|_| (StatusCode::BAD_REQUEST, "upload is not valid UTF-8".to_string()))?;

    let events = replay::parse_log(&text).map_err(|e| {
        warn!("📄 rejected {}: {}", file_name, e);
        (StatusCode::BAD_REQUEST, e.to_string())
    })?;
    let events_processed = events.len();

    let live = replay::replay_events(events);
    let orders: Vec<LiveOrder> = live.into_values().collect();

    let loaded = state
        .store
        .bulk_load(&orders, state.config.load_chunk_size)
        .await
        .map_err(storage_error)?;
    let total = state.store.count().await.map_err(storage_error)?;
    info!(
        "📥 {} live orders loaded from {} ({} events, store now holds {})",
        loaded, file_name, events_processed, total
    );

    Ok(Json(LoadResponse {
        detail: format!("Orders loaded successfully from {file_name}"),
        orders_loaded: loaded,
        events_processed,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct PriceInfoQuery {
    pub instrument: String,
    pub timestamp: String,
}

/// Best resting bid/ask for an instrument as of a point in time. 404 when
/// neither side has a matching order.
pub async fn price_info(
    Query(params): Query<PriceInfoQuery>,
    AxumState(state): AxumState<AppState>,
) -> Result<Json<BestPrices>, (StatusCode, String)> {
    let as_of = parse_timestamp(&params.timestamp).ok_or((
        StatusCode::BAD_REQUEST,
        format!("invalid timestamp '{}'", params.timestamp),
    ))?;

    let best = state
        .store
        .best_prices(&params.instrument, as_of)
        .await
        .map_err(storage_error)?;

    if best.is_empty() {
        return Err((
            StatusCode::NOT_FOUND,
            format!(
                "No orders found for {} at {}",
                params.instrument, params.timestamp
            ),
        ));
    }
    Ok(Json(best))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_extension_check() {
        assert!(has_csv_extension("orders.csv"));
        assert!(has_csv_extension("ORDERS.CSV"));
        assert!(has_csv_extension("path.with.dots.csv"));
        assert!(!has_csv_extension("orders.txt"));
        assert!(!has_csv_extension("orders.csv.gz"));
        assert!(!has_csv_extension("csv"));
    }
}

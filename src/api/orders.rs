//! CRUD handlers over the persisted live orders.

use axum::{
    extract::{Json as AxumJson, Path, Query, State as AxumState},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::{parse_timestamp, LiveOrder, Side, StoredOrder};
use crate::AppState;

use super::storage_error;

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub instrument: String,
    pub operation: String,
    pub price: Decimal,
    pub remaining_qty: i64,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderRequest {
    pub remaining_qty: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OrdersPage {
    pub orders: Vec<StoredOrder>,
    pub count: usize,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct DetailResponse {
    pub detail: String,
}

pub async fn create_order(
    AxumState(state): AxumState<AppState>,
    AxumJson(req): AxumJson<CreateOrderRequest>,
) -> Result<Json<StoredOrder>, (StatusCode, String)> {
    let side = Side::from_code(req.operation.trim()).ok_or((
        StatusCode::BAD_REQUEST,
        "operation must be 'B' or 'S'".to_string(),
    ))?;
    if req.remaining_qty < 1 {
        return Err((
            StatusCode::BAD_REQUEST,
            "remaining_qty must be >= 1".to_string(),
        ));
    }
    let timestamp = parse_timestamp(&req.timestamp).ok_or((
        StatusCode::BAD_REQUEST,
        format!("invalid timestamp '{}'", req.timestamp),
    ))?;

    let order = LiveOrder {
        instrument: req.instrument,
        side,
        price: req.price,
        remaining_qty: req.remaining_qty,
        timestamp,
    };
    let created = state.store.create(&order).await.map_err(storage_error)?;
    info!(
        "🆕 order {} created: {} {} {} @ {}",
        created.id,
        created.operation.as_str(),
        created.remaining_qty,
        created.instrument,
        created.price
    );
    Ok(Json(created))
}

pub async fn get_order(
    Path(id): Path<i64>,
    AxumState(state): AxumState<AppState>,
) -> Result<Json<StoredOrder>, (StatusCode, String)> {
    match state.store.get(id).await.map_err(storage_error)? {
        Some(order) => Ok(Json(order)),
        None => Err((StatusCode::NOT_FOUND, "Order not found".to_string())),
    }
}

pub async fn list_orders(
    Query(params): Query<ListQuery>,
    AxumState(state): AxumState<AppState>,
) -> Result<Json<OrdersPage>, (StatusCode, String)> {
    let limit = params.limit.unwrap_or(10);
    if !(1..=100).contains(&limit) {
        return Err((
            StatusCode::BAD_REQUEST,
            "limit must be between 1 and 100".to_string(),
        ));
    }
    let offset = params.offset.unwrap_or(0);
    if offset < 0 {
        return Err((StatusCode::BAD_REQUEST, "offset must be >= 0".to_string()));
    }

    let orders = state
        .store
        .list(limit as usize, offset as usize)
        .await
        .map_err(storage_error)?;
    Ok(Json(OrdersPage {
        count: orders.len(),
        orders,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

/// Replaces the remaining quantity; a zero update closes the order out.
pub async fn update_order(
    Path(id): Path<i64>,
    AxumState(state): AxumState<AppState>,
    AxumJson(req): AxumJson<UpdateOrderRequest>,
) -> Result<Json<StoredOrder>, (StatusCode, String)> {
    if req.remaining_qty < 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "remaining_qty must be >= 0".to_string(),
        ));
    }

    match state
        .store
        .update_qty(id, req.remaining_qty)
        .await
        .map_err(storage_error)?
    {
        Some(order) => {
            if order.remaining_qty == 0 {
                info!("🗑️  order {} closed out by zero-quantity update", id);
            }
            Ok(Json(order))
        }
        None => Err((StatusCode::NOT_FOUND, "Order not found".to_string())),
    }
}

/// Idempotent: deleting an absent order still reports success.
pub async fn delete_order(
    Path(id): Path<i64>,
    AxumState(state): AxumState<AppState>,
) -> Result<Json<DetailResponse>, (StatusCode, String)> {
    state.store.delete(id).await.map_err(storage_error)?;
    Ok(Json(DetailResponse {
        detail: "Order deleted".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Config;
    use crate::store::OrderStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn create_test_state() -> (AppState, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        let store = OrderStore::new(db_path).unwrap();
        let state = AppState {
            store: Arc::new(store),
            config: Config {
                database_path: db_path.to_string(),
                bind_addr: "127.0.0.1:0".to_string(),
                load_chunk_size: 10_000,
                max_upload_bytes: 64 * 1024 * 1024,
            },
        };
        (state, temp_file)
    }

    fn create_request() -> CreateOrderRequest {
        CreateOrderRequest {
            instrument: "PETR4".to_string(),
            operation: "B".to_string(),
            price: dec!(100.25),
            remaining_qty: 500,
            timestamp: "2024-01-05T10:00:00".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let (state, _temp) = create_test_state();

        let Json(created) = create_order(AxumState(state.clone()), AxumJson(create_request()))
            .await
            .unwrap();
        assert_eq!(created.operation, Side::Buy);
        assert_eq!(created.price, dec!(100.25));

        let Json(fetched) = get_order(Path(created.id), AxumState(state)).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_operation() {
        let (state, _temp) = create_test_state();

        let mut req = create_request();
        req.operation = "X".to_string();
        let (status, _) = create_order(AxumState(state.clone()), AxumJson(req))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut req = create_request();
        req.operation = "BS".to_string();
        let (status, _) = create_order(AxumState(state), AxumJson(req))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_rejects_nonpositive_qty() {
        let (state, _temp) = create_test_state();

        let mut req = create_request();
        req.remaining_qty = 0;
        let (status, _) = create_order(AxumState(state.clone()), AxumJson(req))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut req = create_request();
        req.remaining_qty = -5;
        let (status, _) = create_order(AxumState(state), AxumJson(req))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_timestamp() {
        let (state, _temp) = create_test_state();

        let mut req = create_request();
        req.timestamp = "yesterday".to_string();
        let (status, msg) = create_order(AxumState(state), AxumJson(req))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(msg.contains("timestamp"));
    }

    #[tokio::test]
    async fn test_get_missing_is_404() {
        let (state, _temp) = create_test_state();
        let (status, _) = get_order(Path(42), AxumState(state)).await.unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_validates_pagination() {
        let (state, _temp) = create_test_state();

        for limit in [0, 101, -1] {
            let (status, _) = list_orders(
                Query(ListQuery {
                    limit: Some(limit),
                    offset: None,
                }),
                AxumState(state.clone()),
            )
            .await
            .unwrap_err();
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }

        let (status, _) = list_orders(
            Query(ListQuery {
                limit: None,
                offset: Some(-1),
            }),
            AxumState(state.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Defaults are fine on an empty store.
        let Json(page) = list_orders(
            Query(ListQuery {
                limit: None,
                offset: None,
            }),
            AxumState(state),
        )
        .await
        .unwrap();
        assert_eq!(page.count, 0);
        assert!(page.orders.is_empty());
    }

    #[tokio::test]
    async fn test_update_zero_deletes_and_404_after() {
        let (state, _temp) = create_test_state();

        let Json(created) = create_order(AxumState(state.clone()), AxumJson(create_request()))
            .await
            .unwrap();

        let Json(updated) = update_order(
            Path(created.id),
            AxumState(state.clone()),
            AxumJson(UpdateOrderRequest { remaining_qty: 0 }),
        )
        .await
        .unwrap();
        assert_eq!(updated.remaining_qty, 0);

        let (status, _) = get_order(Path(created.id), AxumState(state))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_missing_is_404_and_negative_rejected() {
        let (state, _temp) = create_test_state();

        let (status, _) = update_order(
            Path(9000),
            AxumState(state.clone()),
            AxumJson(UpdateOrderRequest { remaining_qty: 5 }),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = update_order(
            Path(9000),
            AxumState(state),
            AxumJson(UpdateOrderRequest { remaining_qty: -1 }),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_succeeds_even_when_absent() {
        let (state, _temp) = create_test_state();
        let Json(resp) = delete_order(Path(12345), AxumState(state)).await.unwrap();
        assert_eq!(resp.detail, "Order deleted");
    }
}

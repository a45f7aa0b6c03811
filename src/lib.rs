//! Orderdesk Backend Library
//!
//! Replays an order-event log into the set of still-outstanding orders,
//! persists that snapshot, and serves CRUD plus best-price queries over it.

pub mod api;
pub mod middleware;
pub mod models;
pub mod replay;
pub mod store;

use std::sync::Arc;

use models::Config;
use store::OrderStore;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<OrderStore>,
    pub config: Config,
}

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Prices carry exactly two fractional digits (cents).
pub const PRICE_SCALE: u32 = 2;

/// Order side as it appears in the source log and the API ("B"/"S").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "B")]
    Buy,
    #[serde(rename = "S")]
    Sell,
}

impl Side {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "B",
            Side::Sell => "S",
        }
    }

    /// Exact single-letter code, nothing else accepted.
    #[inline]
    pub fn from_code(code: &str) -> Option<Side> {
        match code {
            "B" => Some(Side::Buy),
            "S" => Some(Side::Sell),
            _ => None,
        }
    }
}

/// Lifecycle stage of a logged order event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    New,
    Cancel,
    PartialFill,
}

impl EventKind {
    /// Source log integer codes: 0 = cancel, 1 = new, 2 = partial fill.
    /// Any other code has no lifecycle meaning and the row is skipped.
    #[inline]
    pub fn from_code(code: i64) -> Option<EventKind> {
        match code {
            1 => Some(EventKind::New),
            0 => Some(EventKind::Cancel),
            2 => Some(EventKind::PartialFill),
            _ => None,
        }
    }
}

/// One parsed line of the source event log.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderEvent {
    pub kind: EventKind,
    pub order_id: String,
    pub instrument: String,
    pub side: Side,
    pub price: Decimal,
    /// Initial resting quantity for New, filled quantity for PartialFill.
    pub quantity: i64,
    pub event_time: DateTime<Utc>,
}

/// An order still outstanding after replay, before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveOrder {
    pub instrument: String,
    pub side: Side,
    pub price: Decimal,
    pub remaining_qty: i64,
    /// Event time of the New event that created the order.
    pub timestamp: DateTime<Utc>,
}

/// A persisted live order as served by the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredOrder {
    pub id: i64,
    pub instrument: String,
    pub operation: Side,
    pub price: Decimal,
    pub remaining_qty: i64,
    pub timestamp: DateTime<Utc>,
}

/// Best resting prices for one instrument as of a point in time.
/// Either side may be empty; both empty is reported as not-found upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestPrices {
    pub highest_buy_price: Option<Decimal>,
    pub lowest_sell_price: Option<Decimal>,
}

impl BestPrices {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.highest_buy_price.is_none() && self.lowest_sell_price.is_none()
    }
}

/// Normalize a price to exactly two fractional digits.
/// Excess digits round half-even, matching the ingestion contract.
pub fn quantize_price(value: Decimal) -> Decimal {
    let mut v = value;
    v.rescale(PRICE_SCALE);
    v
}

/// Integer cents for storage, so SQL MIN/MAX stay exact.
pub fn price_to_cents(price: Decimal) -> anyhow::Result<i64> {
    let quantized = quantize_price(price);
    i64::try_from(quantized.mantissa())
        .with_context(|| format!("price out of storable range: {price}"))
}

pub fn cents_to_price(cents: i64) -> Decimal {
    Decimal::new(cents, PRICE_SCALE)
}

/// Epoch microseconds for storage; timestamps are compared in SQL.
#[inline]
pub fn micros_from_datetime(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

#[inline]
pub fn datetime_from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}

/// Parse an API-facing timestamp: RFC 3339 first, then naive ISO-8601
/// (no offset, treated as UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub bind_addr: String,
    pub load_chunk_size: usize,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path = std::env::var("DATABASE_PATH")
            .unwrap_or_else(|_| "data/active_orders.db".to_string());

        let bind_addr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let load_chunk_size = std::env::var("LOAD_CHUNK_SIZE")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .unwrap_or(10_000);

        let max_upload_bytes = std::env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| (64 * 1024 * 1024).to_string())
            .parse()
            .unwrap_or(64 * 1024 * 1024);

        Ok(Self {
            database_path,
            bind_addr,
            load_chunk_size,
            max_upload_bytes,
        })
    }
}

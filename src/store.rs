//! SQLite-backed store for live orders.
//!
//! One connection behind an async mutex; every method is a request-scoped
//! unit of work (guard held for the call, released on any exit path).
//! Mutations commit immediately; only bulk_load opens explicit
//! transactions, one per chunk.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::{
    cents_to_price, datetime_from_micros, micros_from_datetime, price_to_cents, BestPrices,
    LiveOrder, Side, StoredOrder,
};

#[derive(Clone)]
pub struct OrderStore {
    conn: Arc<Mutex<Connection>>,
}

impl OrderStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open order db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        Self::create_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS active_orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instrument TEXT NOT NULL,
                operation TEXT NOT NULL,
                price_cents INTEGER NOT NULL,
                remaining_qty INTEGER NOT NULL,
                ts_micros INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_active_orders_instrument_ts
             ON active_orders(instrument, ts_micros)",
            [],
        )?;
        Ok(())
    }

    /// Boot-time storage init. The event log is the source of truth: each
    /// process start rebuilds the snapshot from scratch, so the table is
    /// dropped and recreated rather than carried over.
    pub async fn reset(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DROP TABLE IF EXISTS active_orders", [])?;
        Self::create_schema(&conn)?;
        Ok(())
    }

    fn row_to_order(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredOrder> {
        let side_code: String = row.get(2)?;
        let operation = Side::from_code(&side_code).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown side code '{side_code}'").into(),
            )
        })?;
        Ok(StoredOrder {
            id: row.get(0)?,
            instrument: row.get(1)?,
            operation,
            price: cents_to_price(row.get(3)?),
            remaining_qty: row.get(4)?,
            timestamp: datetime_from_micros(row.get(5)?),
        })
    }

    /// Insert a batch in fixed-size chunks, each committed in its own
    /// transaction. Blind append: repeated loads duplicate rows. A failure
    /// mid-load keeps the chunks already committed.
    pub async fn bulk_load(&self, orders: &[LiveOrder], chunk_size: usize) -> Result<usize> {
        let chunk_size = chunk_size.max(1);
        let conn = self.conn.lock().await;

        let mut inserted = 0usize;
        for chunk in orders.chunks(chunk_size) {
            if let Err(e) = Self::insert_chunk(&conn, chunk) {
                let _ = conn.execute("ROLLBACK", []);
                return Err(e);
            }
            inserted += chunk.len();
            debug!("committed chunk of {} orders ({} total)", chunk.len(), inserted);
        }
        Ok(inserted)
    }

    fn insert_chunk(conn: &Connection, chunk: &[LiveOrder]) -> Result<()> {
        conn.execute("BEGIN IMMEDIATE", [])?;
        let mut stmt = conn.prepare_cached(
            "INSERT INTO active_orders (instrument, operation, price_cents, remaining_qty, ts_micros)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for order in chunk {
            stmt.execute(params![
                &order.instrument,
                order.side.as_str(),
                price_to_cents(order.price)?,
                order.remaining_qty,
                micros_from_datetime(order.timestamp),
            ])?;
        }
        drop(stmt);
        conn.execute("COMMIT", [])?;
        Ok(())
    }

    /// Insert one order, returning it with the assigned id.
    pub async fn create(&self, order: &LiveOrder) -> Result<StoredOrder> {
        let price_cents = price_to_cents(order.price)?;
        let ts_micros = micros_from_datetime(order.timestamp);
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO active_orders (instrument, operation, price_cents, remaining_qty, ts_micros)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &order.instrument,
                order.side.as_str(),
                price_cents,
                order.remaining_qty,
                ts_micros,
            ],
        )?;
        let id = conn.last_insert_rowid();

        Ok(StoredOrder {
            id,
            instrument: order.instrument.clone(),
            operation: order.side,
            price: cents_to_price(price_cents),
            remaining_qty: order.remaining_qty,
            timestamp: datetime_from_micros(ts_micros),
        })
    }

    pub async fn get(&self, id: i64) -> Result<Option<StoredOrder>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, instrument, operation, price_cents, remaining_qty, ts_micros
             FROM active_orders WHERE id = ?1",
        )?;
        match stmt.query_row(params![id], Self::row_to_order) {
            Ok(order) => Ok(Some(order)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Page through orders in insertion order (stable, no business meaning).
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<StoredOrder>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, instrument, operation, price_cents, remaining_qty, ts_micros
             FROM active_orders ORDER BY id LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], Self::row_to_order)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Replace remaining quantity. Zero deletes the row instead of storing
    /// it; the returned record reflects the value the caller set. None if
    /// no such id.
    pub async fn update_qty(&self, id: i64, remaining_qty: i64) -> Result<Option<StoredOrder>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, instrument, operation, price_cents, remaining_qty, ts_micros
             FROM active_orders WHERE id = ?1",
        )?;
        let existing = match stmt.query_row(params![id], Self::row_to_order) {
            Ok(order) => order,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if remaining_qty == 0 {
            conn.execute("DELETE FROM active_orders WHERE id = ?1", params![id])?;
        } else {
            conn.execute(
                "UPDATE active_orders SET remaining_qty = ?1 WHERE id = ?2",
                params![remaining_qty, id],
            )?;
        }

        let mut order = existing;
        order.remaining_qty = remaining_qty;
        Ok(Some(order))
    }

    /// Idempotent delete: absent ids succeed silently.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute("DELETE FROM active_orders WHERE id = ?1", params![id])?;
        if deleted == 0 {
            debug!("delete for order {} ignored, no such row", id);
        }
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached("SELECT COUNT(*) FROM active_orders")?;
        let n = stmt.query_row([], |row| row.get(0))?;
        Ok(n)
    }

    /// Best resting prices for an instrument as of a point in time:
    /// highest buy and lowest sell, each over rows with `timestamp <=
    /// as_of` and positive quantity. The two sides are independent.
    pub async fn best_prices(&self, instrument: &str, as_of: DateTime<Utc>) -> Result<BestPrices> {
        let as_of_micros = micros_from_datetime(as_of);
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT
                (SELECT MAX(price_cents) FROM active_orders
                  WHERE instrument = ?1 AND ts_micros <= ?2
                    AND remaining_qty > 0 AND operation = 'B'),
                (SELECT MIN(price_cents) FROM active_orders
                  WHERE instrument = ?1 AND ts_micros <= ?2
                    AND remaining_qty > 0 AND operation = 'S')",
        )?;
        let (buy_cents, sell_cents): (Option<i64>, Option<i64>) = stmt
            .query_row(params![instrument, as_of_micros], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;

        Ok(BestPrices {
            highest_buy_price: buy_cents.map(cents_to_price),
            lowest_sell_price: sell_cents.map(cents_to_price),
        })
    }
}

//! Source log parsing: delimiter sniffing, header mapping, row decoding.
//!
//! Parsing is strict and fail-closed: one malformed field aborts the whole
//! load with the line number and field name. The only tolerated oddity is
//! an ACTION code outside the known lifecycle set, which skips the row.

use std::str::FromStr;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use crate::models::{quantize_price, EventKind, OrderEvent, Side};

/// MOMENT column pattern: `YYYYMMDDHHMMSSssssss` (microseconds, no dot).
const MOMENT_FORMAT: &str = "%Y%m%d%H%M%S%6f";

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("first line contains neither ';' nor ',': cannot detect delimiter")]
    UnknownDelimiter,
    #[error("input is empty: missing header row")]
    MissingHeader,
    #[error("header is missing required column {0}")]
    MissingColumn(&'static str),
    #[error("line {line}: missing {field} field")]
    MissingField { line: usize, field: &'static str },
    #[error("line {line}: invalid {field} value '{value}'")]
    InvalidField {
        line: usize,
        field: &'static str,
        value: String,
    },
}

/// The delimiter is inferred from the header line; ';' wins when both
/// characters are present.
pub fn detect_delimiter(first_line: &str) -> Result<char, ReplayError> {
    if first_line.contains(';') {
        Ok(';')
    } else if first_line.contains(',') {
        Ok(',')
    } else {
        Err(ReplayError::UnknownDelimiter)
    }
}

/// Positions of the required columns within a data row. Extra columns and
/// arbitrary column order are tolerated.
#[derive(Debug, Clone, Copy)]
struct Columns {
    action: usize,
    id: usize,
    symbol: usize,
    side: usize,
    price: usize,
    volume: usize,
    moment: usize,
}

impl Columns {
    fn from_header(header: &str, delimiter: char) -> Result<Self, ReplayError> {
        let names: Vec<&str> = header.split(delimiter).map(|name| name.trim()).collect();
        let find = |name: &'static str| {
            names
                .iter()
                .position(|column| *column == name)
                .ok_or(ReplayError::MissingColumn(name))
        };
        Ok(Self {
            action: find("ACTION")?,
            id: find("ID")?,
            symbol: find("SYMBOL")?,
            side: find("TYPE")?,
            price: find("PRICE")?,
            volume: find("VOLUME")?,
            moment: find("MOMENT")?,
        })
    }
}

fn parse_row(
    fields: &[&str],
    cols: Columns,
    line: usize,
) -> Result<Option<OrderEvent>, ReplayError> {
    let field = |idx: usize, name: &'static str| -> Result<&str, ReplayError> {
        fields
            .get(idx)
            .map(|raw| raw.trim())
            .ok_or(ReplayError::MissingField { line, field: name })
    };
    let invalid = |name: &'static str, value: &str| ReplayError::InvalidField {
        line,
        field: name,
        value: value.to_string(),
    };

    let action_raw = field(cols.action, "ACTION")?;
    let action: i64 = action_raw
        .parse()
        .map_err(|_| invalid("ACTION", action_raw))?;
    let Some(kind) = EventKind::from_code(action) else {
        debug!("⏭️  line {}: ACTION code {} outside lifecycle set, row skipped", line, action);
        return Ok(None);
    };

    let order_id = field(cols.id, "ID")?.to_string();
    let instrument = field(cols.symbol, "SYMBOL")?.to_string();

    let side_raw = field(cols.side, "TYPE")?;
    let side = Side::from_code(side_raw).ok_or_else(|| invalid("TYPE", side_raw))?;

    let price_raw = field(cols.price, "PRICE")?;
    let price = Decimal::from_str(price_raw)
        .map(quantize_price)
        .map_err(|_| invalid("PRICE", price_raw))?;

    let volume_raw = field(cols.volume, "VOLUME")?;
    let quantity: i64 = volume_raw
        .parse()
        .map_err(|_| invalid("VOLUME", volume_raw))?;

    let moment_raw = field(cols.moment, "MOMENT")?;
    let event_time = NaiveDateTime::parse_from_str(moment_raw, MOMENT_FORMAT)
        .map_err(|_| invalid("MOMENT", moment_raw))?
        .and_utc();

    Ok(Some(OrderEvent {
        kind,
        order_id,
        instrument,
        side,
        price,
        quantity,
        event_time,
    }))
}

/// Parse a whole delimited log into events. Blank lines after the header
/// are skipped; any malformed field aborts with its line number.
pub fn parse_log(input: &str) -> Result<Vec<OrderEvent>, ReplayError> {
    let mut lines = input.lines();
    let header = lines.next().ok_or(ReplayError::MissingHeader)?;
    let delimiter = detect_delimiter(header)?;
    let cols = Columns::from_header(header, delimiter)?;

    let mut events = Vec::new();
    for (idx, raw_line) in lines.enumerate() {
        // Header is line 1, first data row is line 2.
        let line = idx + 2;
        if raw_line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = raw_line.split(delimiter).collect();
        if let Some(event) = parse_row(&fields, cols, line)? {
            events.push(event);
        }
    }
    Ok(events)
}

//! Manual data capture into an existing warehouse.
//!
//! Two modes:
//! - single: one row for `(market, city, date)`
//! - batch: one row per month start in `[start, end]`, constant or linearly
//!   ramped; the `(city, date range)` is deleted first, in the same
//!   transaction as the inserts
//!
//! Inputs are validated before the warehouse is opened, so a rejected
//! capture never leaves a partial write behind.

use std::path::Path;

use chrono::NaiveDate;
use log::{info, warn};
use rusqlite::params_from_iter;
use rusqlite::types::Value;

use crate::domain::{City, MarketType, Table, CITY_COLUMN, DATE_COLUMN, MARKET_COLUMN, PRICE_COLUMN, UF_COLUMN};
use crate::error::AppError;
use crate::io::locale::month_starts_between;
use crate::warehouse::store::{self, quote_ident};

/// One row to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleCapture {
    pub market: MarketType,
    pub city: String,
    pub date: String,
    pub price: f64,
}

/// A month range to (re)write for one city.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCapture {
    pub market: MarketType,
    pub city: String,
    pub start: String,
    pub end: String,
    pub base_price: f64,
    /// Total change spread linearly from the first to the last month.
    pub ramp_total: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOutcome {
    pub table: Table,
    pub city: String,
    pub inserted: usize,
    pub deleted: usize,
    pub warnings: Vec<String>,
}

/// Strict `YYYY-MM-DD`.
pub fn parse_capture_date(s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("Invalid date '{s}'. Expected YYYY-MM-DD.")))
}

pub fn validate_price(price: f64) -> Result<(), AppError> {
    if price.is_finite() && price > 0.0 {
        Ok(())
    } else {
        Err(AppError::validation(format!("Price must be a finite number > 0 (got {price}).")))
    }
}

/// Canonical label and state code for a city name. Unknown cities keep the
/// given label and have no state code.
fn resolve_city(city: &str) -> Result<(String, Option<&'static str>), AppError> {
    let trimmed = city.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("City must not be empty."));
    }
    Ok(match City::from_key(trimmed) {
        Some(c) => (c.label().to_string(), Some(c.uf())),
        None => (trimmed.to_string(), None),
    })
}

/// `base + ramp_total * i / (n - 1)` for each of `n` months; constant when
/// there is no ramp or a single month.
pub fn batch_values(base: f64, ramp_total: Option<f64>, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| match ramp_total {
            Some(delta) if n > 1 => base + delta * (i as f64 / (n - 1) as f64),
            _ => base,
        })
        .collect()
}

/// Columns to write, restricted to those the table actually has.
fn writable_columns(existing: &[String], table: Table) -> (Vec<&'static str>, Vec<String>) {
    let mut warnings = Vec::new();
    let mut cols = Vec::new();
    for c in [DATE_COLUMN, CITY_COLUMN, UF_COLUMN, MARKET_COLUMN] {
        if existing.iter().any(|e| e == c) {
            cols.push(c);
        }
    }
    if existing.iter().any(|e| e == PRICE_COLUMN) {
        cols.push(PRICE_COLUMN);
    } else {
        let msg = format!("column '{PRICE_COLUMN}' does not exist in {table}; only metadata is stored");
        warn!("{msg}");
        warnings.push(msg);
    }
    (cols, warnings)
}

fn row_values(cols: &[&str], date: &str, city: &str, uf: Option<&str>, market: MarketType, price: f64) -> Vec<Value> {
    cols.iter()
        .map(|c| match *c {
            DATE_COLUMN => Value::Text(date.to_string()),
            CITY_COLUMN => Value::Text(city.to_string()),
            UF_COLUMN => uf.map_or(Value::Null, |u| Value::Text(u.to_string())),
            MARKET_COLUMN => Value::Text(market.label().to_string()),
            _ => Value::Real(price),
        })
        .collect()
}

fn insert_sql(table: Table, cols: &[&str]) -> String {
    let quoted: Vec<String> = cols.iter().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table.name()),
        quoted.join(", "),
        placeholders.join(", ")
    )
}

/// Open the warehouse for a capture and return the target table's columns.
fn open_for_capture(db_path: &Path, table: Table) -> Result<(rusqlite::Connection, Vec<String>), AppError> {
    if !db_path.exists() {
        return Err(AppError::config(format!(
            "Warehouse not found at '{}'. Run `rw build` first.",
            db_path.display()
        )));
    }
    let conn = store::open_rw(db_path)?;
    if !store::table_exists(&conn, table.name())? {
        return Err(AppError::config(format!(
            "Table '{table}' does not exist yet. Run `rw build` first."
        )));
    }
    let existing = store::table_columns(&conn, table.name())?;
    Ok((conn, existing))
}

pub fn insert_single(db_path: &Path, capture: &SingleCapture) -> Result<CaptureOutcome, AppError> {
    let date = parse_capture_date(&capture.date)?;
    validate_price(capture.price)?;
    let (city, uf) = resolve_city(&capture.city)?;
    let table = capture.market.table();

    let (conn, existing) = open_for_capture(db_path, table)?;
    let (cols, warnings) = writable_columns(&existing, table);

    let iso = date.format("%Y-%m-%d").to_string();
    let values = row_values(&cols, &iso, &city, uf, capture.market, capture.price);
    conn.execute(&insert_sql(table, &cols), params_from_iter(values))
        .map_err(|e| AppError::storage(format!("Failed to insert into {table}: {e}")))?;

    info!("1 row inserted into {table} for {city} at {iso}");
    Ok(CaptureOutcome {
        table,
        city,
        inserted: 1,
        deleted: 0,
        warnings,
    })
}

pub fn insert_batch(db_path: &Path, capture: &BatchCapture) -> Result<CaptureOutcome, AppError> {
    let start = parse_capture_date(&capture.start)?;
    let end = parse_capture_date(&capture.end)?;
    if end < start {
        return Err(AppError::validation(format!(
            "Period end {end} is before start {start}."
        )));
    }
    let months = month_starts_between(start, end);
    if months.is_empty() {
        return Err(AppError::validation(format!(
            "Period {start} to {end} contains no month start."
        )));
    }
    let values = batch_values(capture.base_price, capture.ramp_total, months.len());
    // A negative ramp may not take the last month to zero or below.
    for v in [capture.base_price].iter().chain(values.last()) {
        validate_price(*v)?;
    }
    let (city, uf) = resolve_city(&capture.city)?;
    let table = capture.market.table();

    let (conn, existing) = open_for_capture(db_path, table)?;
    let (cols, warnings) = writable_columns(&existing, table);

    let start_iso = start.format("%Y-%m-%d").to_string();
    let end_iso = end.format("%Y-%m-%d").to_string();

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| AppError::storage(format!("Failed to begin transaction: {e}")))?;

    let deleted = tx
        .execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1 AND {} BETWEEN ?2 AND ?3",
                quote_ident(table.name()),
                quote_ident(CITY_COLUMN),
                quote_ident(DATE_COLUMN)
            ),
            [&city, &start_iso, &end_iso],
        )
        .map_err(|e| AppError::storage(format!("Failed to clear {table} range: {e}")))?;

    {
        let mut stmt = tx
            .prepare(&insert_sql(table, &cols))
            .map_err(|e| AppError::storage(format!("Failed to prepare insert: {e}")))?;
        for (month, price) in months.iter().zip(&values) {
            let iso = month.format("%Y-%m-%d").to_string();
            stmt.execute(params_from_iter(row_values(&cols, &iso, &city, uf, capture.market, *price)))
                .map_err(|e| AppError::storage(format!("Failed to insert into {table}: {e}")))?;
        }
    }

    tx.commit()
        .map_err(|e| AppError::storage(format!("Failed to commit batch: {e}")))?;

    info!(
        "{} rows inserted into {table} for {city} ({start_iso} to {end_iso}), {deleted} replaced",
        months.len()
    );
    Ok(CaptureOutcome {
        table,
        city,
        inserted: months.len(),
        deleted,
        warnings,
    })
}

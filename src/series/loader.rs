//! Cached reads from the warehouse.
//!
//! A warehouse that has not been built yet (no file, or no table) is not an
//! error here: callers get an empty result plus a warning they can show.
//! Only genuine storage failures surface as `AppError`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};

use crate::domain::{Series, Table, CITY_COLUMN, DATE_COLUMN, INDICATOR_COLUMN};
use crate::error::AppError;
use crate::series::cache::TtlCache;
use crate::warehouse::builder::pivot_indicators;
use crate::warehouse::store::{self, quote_ident};

/// A result plus an optional operator-facing warning.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub value: T,
    pub warning: Option<String>,
}

impl<T> Loaded<T> {
    fn ok(value: T) -> Self {
        Self { value, warning: None }
    }

    fn warn(value: T, warning: String) -> Self {
        warn!("{warning}");
        Self {
            value,
            warning: Some(warning),
        }
    }
}

/// Per-function TTL caches over short-lived read-only connections.
#[derive(Debug)]
pub struct SeriesLoader {
    db_path: PathBuf,
    series: TtlCache<(Table, String), Series>,
    cities: TtlCache<Table, Vec<String>>,
    indicator_names: TtlCache<(), Vec<String>>,
    wide: TtlCache<(), Series>,
}

impl SeriesLoader {
    pub fn new(db_path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            db_path: db_path.into(),
            series: TtlCache::new(ttl),
            cities: TtlCache::new(ttl),
            indicator_names: TtlCache::new(ttl),
            wide: TtlCache::new(ttl),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Open the warehouse and check `table`; `Err(warning)` when either is absent.
    fn connect(&self, table: Table) -> Result<Result<rusqlite::Connection, String>, AppError> {
        let Some(conn) = store::open_ro(&self.db_path)? else {
            return Ok(Err(format!(
                "Warehouse not found at '{}'. Run `rw build` first.",
                self.db_path.display()
            )));
        };
        if !store::table_exists(&conn, table.name())? {
            return Ok(Err(format!(
                "Table '{table}' does not exist yet. Run `rw build` first."
            )));
        }
        Ok(Ok(conn))
    }

    /// Rows of `table` for `city`, sorted by date with unparseable dates dropped.
    pub fn load(&mut self, table: Table, city: &str) -> Result<Loaded<Series>, AppError> {
        let key = (table, city.to_string());
        if let Some(hit) = self.series.get(&key) {
            debug!("cache hit: {table}/{city}");
            return Ok(Loaded::ok(hit));
        }

        let conn = match self.connect(table)? {
            Ok(c) => c,
            Err(w) => return Ok(Loaded::warn(Series::empty(), w)),
        };
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1 ORDER BY {}",
            quote_ident(table.name()),
            quote_ident(CITY_COLUMN),
            quote_ident(DATE_COLUMN)
        );
        let frame = store::query_frame(&conn, &sql, [city])?;
        let series = Series::from_frame(frame).map_err(AppError::storage)?;

        if series.is_empty() {
            return Ok(Loaded::warn(series, format!("No rows for '{city}' in {table}.")));
        }
        self.series.insert(key, series.clone());
        Ok(Loaded::ok(series))
    }

    /// Distinct city labels present in `table`, sorted.
    pub fn cities(&mut self, table: Table) -> Result<Loaded<Vec<String>>, AppError> {
        if let Some(hit) = self.cities.get(&table) {
            debug!("cache hit: cities of {table}");
            return Ok(Loaded::ok(hit));
        }
        let conn = match self.connect(table)? {
            Ok(c) => c,
            Err(w) => return Ok(Loaded::warn(Vec::new(), w)),
        };
        let cities = store::distinct_text(&conn, table.name(), CITY_COLUMN)?;
        if cities.is_empty() {
            return Ok(Loaded::warn(cities, format!("No cities found in {table}.")));
        }
        self.cities.insert(table, cities.clone());
        Ok(Loaded::ok(cities))
    }

    /// Distinct indicator names in the macro table.
    pub fn indicator_names(&mut self) -> Result<Loaded<Vec<String>>, AppError> {
        if let Some(hit) = self.indicator_names.get(&()) {
            return Ok(Loaded::ok(hit));
        }
        let conn = match self.connect(Table::Indicators)? {
            Ok(c) => c,
            Err(w) => return Ok(Loaded::warn(Vec::new(), w)),
        };
        let names = store::distinct_text(&conn, Table::Indicators.name(), INDICATOR_COLUMN)?;
        if names.is_empty() {
            return Ok(Loaded::warn(names, "No indicators found in bcb.".to_string()));
        }
        self.indicator_names.insert((), names.clone());
        Ok(Loaded::ok(names))
    }

    /// Macro indicators in wide form, keyed by date. Falls back to pivoting the
    /// long table when the wide one is absent.
    pub fn indicators_wide(&mut self) -> Result<Loaded<Series>, AppError> {
        if let Some(hit) = self.wide.get(&()) {
            debug!("cache hit: {}", Table::IndicatorsWide);
            return Ok(Loaded::ok(hit));
        }

        let frame = match self.connect(Table::IndicatorsWide)? {
            Ok(conn) => {
                let sql = format!(
                    "SELECT * FROM {} ORDER BY {}",
                    quote_ident(Table::IndicatorsWide.name()),
                    quote_ident(DATE_COLUMN)
                );
                store::query_frame(&conn, &sql, rusqlite::params![])?
            }
            Err(_) => match self.connect(Table::Indicators)? {
                Ok(conn) => {
                    let sql = format!("SELECT * FROM {}", quote_ident(Table::Indicators.name()));
                    pivot_indicators(&store::query_frame(&conn, &sql, rusqlite::params![])?)
                        .map_err(AppError::storage)?
                }
                Err(w) => return Ok(Loaded::warn(Series::empty(), w)),
            },
        };

        let series = Series::from_frame(frame).map_err(AppError::storage)?;
        if series.is_empty() {
            return Ok(Loaded::warn(series, "Macro indicator table is empty.".to_string()));
        }
        self.wide.insert((), series.clone());
        Ok(Loaded::ok(series))
    }

    /// Forget cached results that read `table`.
    pub fn invalidate(&mut self, table: Table) {
        let n = self.series.invalidate_where(|(t, _)| *t == table)
            + self.cities.invalidate_where(|t| *t == table);
        if matches!(table, Table::Indicators | Table::IndicatorsWide) {
            self.wide.clear();
            self.indicator_names.clear();
        }
        debug!("invalidated {n} cached entries for {table}");
    }

    /// Forget everything (after a full rebuild).
    pub fn clear(&mut self) {
        self.series.clear();
        self.cities.clear();
        self.indicator_names.clear();
        self.wide.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::frame::{frame_from, real_column, text_column, DataFrame};
    use crate::warehouse::store::replace_table;

    fn recife_frame(prices: &[f64]) -> DataFrame {
        let n = prices.len();
        frame_from(vec![
            text_column(DATE_COLUMN, (0..n).rev().map(|i| Some(format!("2022-{:02}-01", i + 1))).collect()),
            text_column(CITY_COLUMN, vec![Some("Recife".into()); n]),
            real_column("v", prices.iter().rev().map(|p| Some(*p)).collect()),
        ])
        .unwrap()
    }

    #[test]
    fn missing_warehouse_or_table_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("w.db");

        let mut loader = SeriesLoader::new(&db, Duration::from_secs(300));
        let got = loader.load(Table::Rental, "Recife").unwrap();
        assert!(got.value.is_empty());
        assert!(got.warning.unwrap().contains("not found"));

        // File exists but the table does not.
        drop(store::open_rw(&db).unwrap());
        let got = loader.load(Table::Sale, "Recife").unwrap();
        assert!(got.value.is_empty());
        assert!(got.warning.unwrap().contains("does not exist"));
        assert!(loader.cities(Table::Sale).unwrap().value.is_empty());
    }

    #[test]
    fn results_are_cached_until_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("w.db");
        let mut conn = store::open_rw(&db).unwrap();
        replace_table(&mut conn, "locacao", &recife_frame(&[1.0, 2.0]), &[]).unwrap();

        let mut loader = SeriesLoader::new(&db, Duration::from_secs(300));
        let first = loader.load(Table::Rental, "Recife").unwrap().value;
        assert_eq!(first.values("v").unwrap(), vec![Some(1.0), Some(2.0)]);

        replace_table(&mut conn, "locacao", &recife_frame(&[5.0, 6.0, 7.0]), &[]).unwrap();
        let cached = loader.load(Table::Rental, "Recife").unwrap().value;
        assert_eq!(cached.len(), 2);

        loader.invalidate(Table::Rental);
        let fresh = loader.load(Table::Rental, "Recife").unwrap().value;
        assert_eq!(fresh.values("v").unwrap(), vec![Some(5.0), Some(6.0), Some(7.0)]);
    }
}

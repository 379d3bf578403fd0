//! Warehouse build: source CSVs → SQLite.
//!
//! Build steps:
//! - locate per-city files for both markets and the macro-indicator file
//! - reconcile headers, parse dates (month start), coerce Brazilian numbers
//! - attach `Cidade`/`UF`/`TipoMercado` and union cities per market
//! - reshape indicators to a wide, mean-per-date table
//! - replace every table (DROP + CREATE + INSERT) and rebuild its index
//! - write `warehouse_meta.json` next to the database
//!
//! A missing data directory aborts. Anything narrower (one missing file, one
//! unreadable file, one table that fails to write) is reported in
//! [`BuildReport`] and the build carries on.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use log::{info, warn};
use polars::prelude::{col, IntoLazy};

use crate::domain::frame::{self, DataFrame};
use crate::domain::{
    City, MarketType, Table, CITY_COLUMN, DATE_COLUMN, INDICATOR_COLUMN, INDICATOR_MEAN, INDICATOR_STATS,
    MARKET_COLUMN, PRICE_COLUMN, UF_COLUMN,
};
use crate::error::AppError;
use crate::io::{coerce_column, dedup_columns, month_start, parse_br_number, parse_date, read_semicolon_csv};
use crate::io::{reconcile, Role};
use crate::warehouse::meta::{meta_path, write_meta, WarehouseMeta};
use crate::warehouse::store::{self, IndexSpec};

/// Candidate file names for the macro-indicator export, in priority order.
pub const INDICATOR_FILE_NAMES: [&str; 3] = [
    "dados_banco_central.csv",
    "dados_banco_central_tratado.csv",
    "dados_banco_central_tratados.csv",
];

/// Index rebuilt for a table after it is replaced.
pub fn table_indexes(table: Table) -> &'static [IndexSpec] {
    match table {
        Table::Rental => &[IndexSpec {
            name: "idx_locacao",
            columns: &[CITY_COLUMN, DATE_COLUMN],
        }],
        Table::Sale => &[IndexSpec {
            name: "idx_vendas",
            columns: &[CITY_COLUMN, DATE_COLUMN],
        }],
        Table::Indicators => &[IndexSpec {
            name: "idx_bcb",
            columns: &[INDICATOR_COLUMN, DATE_COLUMN],
        }],
        Table::IndicatorsWide => &[],
    }
}

/// One source file that made it into a table.
#[derive(Debug, Clone)]
pub struct SourceLoad {
    pub table: Table,
    pub label: String,
    pub path: PathBuf,
    pub rows: usize,
    pub dropped_dates: usize,
}

/// Per-table outcome of the write phase.
#[derive(Debug, Clone)]
pub enum TableOutcome {
    Written { rows: usize },
    /// No usable source rows; any table from an earlier build is dropped.
    Skipped,
    Failed { message: String },
}

/// Everything an operator needs to know about a build.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub loaded: Vec<SourceLoad>,
    /// Expected files that were not found.
    pub missing: Vec<String>,
    /// Files that were found but unusable, with the reason.
    pub failures: Vec<String>,
    pub tables: Vec<(Table, TableOutcome)>,
    pub meta: Option<WarehouseMeta>,
    pub meta_path: PathBuf,
}

impl BuildReport {
    pub fn rows_written(&self, table: Table) -> Option<usize> {
        self.tables.iter().find(|(t, _)| *t == table).and_then(|(_, o)| match o {
            TableOutcome::Written { rows } => Some(*rows),
            _ => None,
        })
    }

    /// `true` when every expected source loaded and every table was written.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
            && self.failures.is_empty()
            && self.tables.iter().all(|(_, o)| matches!(o, TableOutcome::Written { .. }))
    }
}

/// Build (or rebuild) the warehouse at `db_path` from CSVs in `data_dir`.
pub fn build_warehouse(data_dir: &Path, db_path: &Path) -> Result<BuildReport, AppError> {
    if !data_dir.is_dir() {
        return Err(AppError::config(format!(
            "Data directory does not exist: {}",
            data_dir.display()
        )));
    }
    info!("building warehouse {} from {}", db_path.display(), data_dir.display());

    let mut report = BuildReport {
        data_dir: data_dir.to_path_buf(),
        db_path: db_path.to_path_buf(),
        meta_path: meta_path(db_path),
        ..BuildReport::default()
    };

    let mut frames: Vec<(Table, DataFrame)> = Vec::new();

    for market in MarketType::ALL {
        let mut per_city = Vec::new();
        for city in City::ALL {
            let label = format!("{}/{}", market.file_kind(), city.label());
            let Some(path) = find_city_csv(data_dir, market, city) else {
                warn!("missing source: dados_{}_{}_tratado(s).csv", market.file_kind(), city.slug());
                report
                    .missing
                    .push(format!("dados_{}_{}_tratado.csv", market.file_kind(), city.slug()));
                continue;
            };
            match load_city_file(&path, market, city) {
                Ok((frame, dropped)) if frame.height() > 0 => {
                    info!("  - {label}: {} rows", frame.height());
                    report.loaded.push(SourceLoad {
                        table: market.table(),
                        label,
                        path,
                        rows: frame.height(),
                        dropped_dates: dropped,
                    });
                    per_city.push(frame);
                }
                Ok(_) => {
                    warn!("{}: no rows with a valid date", path.display());
                    report.failures.push(format!("{}: no rows with a valid date", path.display()));
                }
                Err(e) => {
                    warn!("{e}");
                    report.failures.push(e.to_string());
                }
            }
        }
        if !per_city.is_empty() {
            match frame::union_by_name(per_city) {
                Ok(merged) => frames.push((market.table(), merged)),
                Err(e) => {
                    warn!("{}: {e}", market.table());
                    report.failures.push(format!("{}: {e}", market.table()));
                }
            }
        }
    }

    match find_indicator_csv(data_dir) {
        None => {
            warn!("missing source: {}", INDICATOR_FILE_NAMES[0]);
            report.missing.push(INDICATOR_FILE_NAMES[0].to_string());
        }
        Some(path) => match load_indicator_file(&path) {
            Ok((long, dropped)) if long.height() > 0 => {
                info!("  - bcb: {} rows", long.height());
                report.loaded.push(SourceLoad {
                    table: Table::Indicators,
                    label: "bcb".to_string(),
                    path,
                    rows: long.height(),
                    dropped_dates: dropped,
                });
                match pivot_indicators(&long) {
                    Ok(wide) if wide.width() > 1 => frames.push((Table::IndicatorsWide, wide)),
                    Ok(_) => {}
                    Err(e) => {
                        warn!("{}: {e}", Table::IndicatorsWide);
                        report.failures.push(format!("{}: {e}", Table::IndicatorsWide));
                    }
                }
                frames.push((Table::Indicators, long));
            }
            Ok(_) => {
                warn!("{}: no rows with a valid date", path.display());
                report.failures.push(format!("{}: no rows with a valid date", path.display()));
            }
            Err(e) => {
                warn!("{e}");
                report.failures.push(e.to_string());
            }
        },
    }

    let mut conn = store::open_rw(db_path)?;
    let mut rows: BTreeMap<String, usize> = BTreeMap::new();

    for table in [Table::Indicators, Table::IndicatorsWide, Table::Rental, Table::Sale] {
        let Some(idx) = frames.iter().position(|(t, _)| *t == table) else {
            // The rebuild is authoritative: a table without a source goes away.
            match store::drop_table(&conn, table.name()) {
                Ok(true) => warn!("  -> {table}: no source, dropped the previous table"),
                Ok(false) => {}
                Err(e) => {
                    warn!("{e}");
                    report.failures.push(e.to_string());
                }
            }
            report.tables.push((table, TableOutcome::Skipped));
            rows.insert(table.name().to_string(), 0);
            continue;
        };
        let (_, df) = frames.swap_remove(idx);
        let written = prepare_for_storage(df)
            .map_err(AppError::storage)
            .and_then(|df| store::replace_table(&mut conn, table.name(), &df, table_indexes(table)));
        match written {
            Ok(n) => {
                info!("  -> {table}: {n} rows");
                rows.insert(table.name().to_string(), n);
                report.tables.push((table, TableOutcome::Written { rows: n }));
            }
            Err(e) => {
                warn!("table {table} failed: {e}");
                // The replacement rolled back; whatever was there before is still there.
                let kept = match store::table_exists(&conn, table.name()) {
                    Ok(true) => store::count_rows(&conn, table.name()).unwrap_or(0),
                    _ => 0,
                };
                rows.insert(table.name().to_string(), kept);
                report.tables.push((
                    table,
                    TableOutcome::Failed {
                        message: e.to_string(),
                    },
                ));
            }
        }
    }
    drop(conn);

    let meta = WarehouseMeta {
        built_at: Utc::now(),
        rows,
        missing_sources: report.missing.clone(),
    };
    match write_meta(&report.meta_path, &meta) {
        Ok(()) => report.meta = Some(meta),
        Err(e) => {
            warn!("{e}");
            report.failures.push(e.to_string());
        }
    }

    Ok(report)
}

/// `dados_{kind}_{city}_tratado.csv`, then `_tratados.csv`, then the first
/// `dados_{kind}_{city}_tratad*.csv` in name order.
pub fn find_city_csv(data_dir: &Path, market: MarketType, city: City) -> Option<PathBuf> {
    let stem = format!("dados_{}_{}_tratad", market.file_kind(), city.slug());
    for suffix in ["o.csv", "os.csv"] {
        let path = data_dir.join(format!("{stem}{suffix}"));
        if path.is_file() {
            return Some(path);
        }
    }

    let mut matches: Vec<PathBuf> = std::fs::read_dir(data_dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&stem) && n.ends_with(".csv"))
        })
        .collect();
    matches.sort();
    matches.into_iter().next()
}

pub fn find_indicator_csv(data_dir: &Path) -> Option<PathBuf> {
    INDICATOR_FILE_NAMES
        .iter()
        .map(|n| data_dir.join(n))
        .find(|p| p.is_file())
}

fn load_city_file(path: &Path, market: MarketType, city: City) -> Result<(DataFrame, usize), AppError> {
    let raw = read_semicolon_csv(path)?;
    prepare_city_frame(raw.frame, market, city)
        .map_err(|e| AppError::partial(format!("{}: {e}", path.display())))
}

fn load_indicator_file(path: &Path) -> Result<(DataFrame, usize), AppError> {
    let raw = read_semicolon_csv(path)?;
    prepare_indicator_frame(raw.frame).map_err(|e| AppError::partial(format!("{}: {e}", path.display())))
}

/// Normalize one city's raw text frame. Returns the frame and the number of
/// rows dropped for an unparseable or repeated date.
pub fn prepare_city_frame(
    mut df: DataFrame,
    market: MarketType,
    city: City,
) -> Result<(DataFrame, usize), String> {
    let names = frame::column_names(&df);
    let roles = reconcile(&names, &[Role::Date, Role::Price], &[Role::City, Role::MarketType])
        .map_err(|e| e.to_string())?;

    for role in [Role::City, Role::MarketType] {
        if let Some(name) = roles.get(role) {
            frame::drop_column(&mut df, name);
        }
    }
    for name in [UF_COLUMN, CITY_COLUMN, MARKET_COLUMN] {
        frame::drop_column(&mut df, name);
    }
    if let Some(name) = roles.get(Role::Date) {
        frame::rename_column(&mut df, name, DATE_COLUMN)?;
    }
    if let Some(name) = roles.get(Role::Price) {
        frame::rename_column(&mut df, name, PRICE_COLUMN)?;
    }

    let (mut df, dropped) = keep_valid_dates(df, true)?;
    coerce_text_columns(&mut df, &[DATE_COLUMN])?;

    frame::set_constant_text(&mut df, CITY_COLUMN, Some(city.label()))?;
    frame::set_constant_text(&mut df, UF_COLUMN, Some(city.uf()))?;
    frame::set_constant_text(&mut df, MARKET_COLUMN, Some(market.label()))?;
    let df = frame::reorder_front(&df, &[DATE_COLUMN, CITY_COLUMN, UF_COLUMN, MARKET_COLUMN, PRICE_COLUMN])?;
    Ok((df, dropped))
}

/// Normalize the macro-indicator frame (long format).
pub fn prepare_indicator_frame(mut df: DataFrame) -> Result<(DataFrame, usize), String> {
    let names = frame::column_names(&df);
    let roles = reconcile(&names, &[Role::Date, Role::Indicator], &[]).map_err(|e| e.to_string())?;
    if let Some(name) = roles.get(Role::Date) {
        frame::rename_column(&mut df, name, DATE_COLUMN)?;
    }
    if let Some(name) = roles.get(Role::Indicator) {
        frame::rename_column(&mut df, name, INDICATOR_COLUMN)?;
    }

    let (mut df, dropped) = keep_valid_dates(df, false)?;

    for stat in INDICATOR_STATS {
        if let Some(values) = frame::text_values(&df, stat) {
            let parsed = values
                .iter()
                .map(|v| v.as_deref().and_then(parse_br_number))
                .collect();
            frame::set_column(&mut df, frame::real_column(stat, parsed))?;
        }
    }
    coerce_text_columns(&mut df, &[DATE_COLUMN, INDICATOR_COLUMN])?;

    let mut front = vec![DATE_COLUMN, INDICATOR_COLUMN];
    front.extend(INDICATOR_STATS);
    let df = frame::reorder_front(&df, &front)?;
    Ok((df, dropped))
}

/// Parse `Data` to ISO first-of-month text, dropping rows that fail. With
/// `unique`, only the first row per month survives.
fn keep_valid_dates(df: DataFrame, unique: bool) -> Result<(DataFrame, usize), String> {
    let raw = frame::cells_as_text(&df, DATE_COLUMN).ok_or_else(|| format!("no '{DATE_COLUMN}' column"))?;

    let mut seen: HashSet<NaiveDate> = HashSet::new();
    let mut keep = Vec::new();
    let mut dates = Vec::new();
    for (i, cell) in raw.iter().enumerate() {
        let Some(d) = cell.as_deref().and_then(parse_date).map(month_start) else {
            continue;
        };
        if unique && !seen.insert(d) {
            continue;
        }
        keep.push(i);
        dates.push(Some(d.format("%Y-%m-%d").to_string()));
    }
    let dropped = df.height() - keep.len();
    if dropped > 0 {
        warn!("dropped {dropped} row(s) with an invalid or repeated date");
    }

    let mut df = frame::take_rows(&df, &keep)?;
    frame::set_column(&mut df, frame::text_column(DATE_COLUMN, dates))?;
    Ok((df, dropped))
}

/// Apply the Brazilian-locale coercion to every text column not in `skip`.
fn coerce_text_columns(df: &mut DataFrame, skip: &[&str]) -> Result<(), String> {
    for name in frame::column_names(df) {
        if skip.contains(&name.as_str()) {
            continue;
        }
        if let Some(values) = frame::text_values(df, &name) {
            frame::set_column(df, coerce_column(&name, values))?;
        }
    }
    Ok(())
}

/// Reshape long indicators to one row per date and one column per indicator,
/// holding the mean of the `Media` statistic.
///
/// The mean per (date, indicator) is a polars group-by; the result is then
/// spread to wide form over the sorted dates and indicator names.
pub fn pivot_indicators(long: &DataFrame) -> Result<DataFrame, String> {
    let all_present = [DATE_COLUMN, INDICATOR_COLUMN, INDICATOR_MEAN]
        .iter()
        .all(|c| frame::has_column(long, c));
    if !all_present || frame::real_values(long, INDICATOR_MEAN).is_none() {
        return Ok(DataFrame::default());
    }

    let grouped = long
        .clone()
        .lazy()
        .filter(col(DATE_COLUMN).is_not_null().and(col(INDICATOR_COLUMN).is_not_null()))
        .group_by([col(DATE_COLUMN), col(INDICATOR_COLUMN)])
        .agg([col(INDICATOR_MEAN).mean()])
        .collect()
        .map_err(|e| e.to_string())?;

    let dates = frame::cells_as_text(&grouped, DATE_COLUMN).unwrap_or_default();
    let names = frame::cells_as_text(&grouped, INDICATOR_COLUMN).unwrap_or_default();
    let means = frame::real_values(&grouped, INDICATOR_MEAN).unwrap_or_default();

    let mut cells: HashMap<(String, String), Option<f64>> = HashMap::new();
    let mut all_dates: BTreeSet<String> = BTreeSet::new();
    let mut indicators: BTreeSet<String> = BTreeSet::new();
    for ((date, name), mean) in dates.into_iter().zip(names).zip(means) {
        let (Some(date), Some(name)) = (date, name) else {
            continue;
        };
        all_dates.insert(date.clone());
        indicators.insert(name.clone());
        cells.insert((date, name), mean);
    }

    let mut columns = vec![frame::text_column(DATE_COLUMN, all_dates.iter().cloned().map(Some).collect())];
    for ind in &indicators {
        let values = all_dates
            .iter()
            .map(|d| cells.get(&(d.clone(), ind.clone())).copied().flatten())
            .collect();
        columns.push(frame::real_column(ind, values));
    }
    frame::frame_from(columns)
}

/// Drop columns whose storage key collides with an earlier column.
pub fn prepare_for_storage(df: DataFrame) -> Result<DataFrame, String> {
    let names = frame::column_names(&df);
    let keep: Vec<String> = dedup_columns(&names).into_iter().map(|i| names[i].clone()).collect();
    if keep.len() < names.len() {
        warn!("dropping {} column(s) that collide in storage", names.len() - keep.len());
    }
    df.select(keep).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::frame::{column_names, frame_from, real_column, real_values, text_column, text_values};

    fn text(v: &[&str]) -> Vec<Option<String>> {
        v.iter().map(|s| (!s.is_empty()).then(|| s.to_string())).collect()
    }

    #[test]
    fn city_frame_is_normalized() {
        let raw = frame_from(vec![
            text_column("Data", text(&["15/01/2022", "bad", "2022-02-01", "2022-02-10"])),
            text_column("Preço médio (R$/m²)Total", text(&["1.000,50", "9", "1.010,00", "7"])),
            text_column("Observação", text(&["a", "b", "c", "d"])),
            text_column("Cidade", text(&["recife", "recife", "recife", "recife"])),
        ])
        .unwrap();

        let (f, dropped) = prepare_city_frame(raw, MarketType::Rental, City::Recife).unwrap();
        assert_eq!(dropped, 2);
        assert_eq!(
            column_names(&f),
            vec!["Data", "Cidade", "UF", "TipoMercado", PRICE_COLUMN, "Observação"]
        );
        assert_eq!(text_values(&f, "Data").unwrap(), text(&["2022-01-01", "2022-02-01"]));
        assert_eq!(real_values(&f, PRICE_COLUMN).unwrap(), vec![Some(1000.5), Some(1010.0)]);
        assert_eq!(text_values(&f, "UF").unwrap()[0].as_deref(), Some("PE"));
        assert_eq!(text_values(&f, "TipoMercado").unwrap()[0].as_deref(), Some("Locação"));
        assert!(text_values(&f, "Observação").is_some());
    }

    #[test]
    fn city_frame_without_price_is_unusable() {
        let raw = frame_from(vec![
            text_column("Data", text(&["2022-01-01"])),
            text_column("Outro", text(&["1"])),
        ])
        .unwrap();
        let err = prepare_city_frame(raw, MarketType::Sale, City::Natal).unwrap_err();
        assert!(err.contains("price"));
        assert!(err.contains("Outro"));
    }

    #[test]
    fn pivot_averages_mean_per_date() {
        let long = frame_from(vec![
            text_column(DATE_COLUMN, text(&["2022-01-01", "2022-01-01", "2022-01-01", "2022-02-01"])),
            text_column(INDICATOR_COLUMN, text(&["IPCA", "IPCA", "Selic", "IPCA"])),
            real_column(INDICATOR_MEAN, vec![Some(1.0), Some(3.0), Some(10.0), None]),
        ])
        .unwrap();

        let wide = pivot_indicators(&long).unwrap();
        assert_eq!(column_names(&wide), vec![DATE_COLUMN, "IPCA", "Selic"]);
        assert_eq!(text_values(&wide, DATE_COLUMN).unwrap(), text(&["2022-01-01", "2022-02-01"]));
        assert_eq!(real_values(&wide, "IPCA").unwrap(), vec![Some(2.0), None]);
        assert_eq!(real_values(&wide, "Selic").unwrap(), vec![Some(10.0), None]);
    }

    #[test]
    fn storage_prep_drops_colliding_columns() {
        let f = frame_from(vec![
            real_column("Var. Mensal (%)Total", vec![Some(1.0)]),
            real_column("Var Mensal Total", vec![Some(2.0)]),
        ])
        .unwrap();
        let f = prepare_for_storage(f).unwrap();
        assert_eq!(column_names(&f), vec!["Var. Mensal (%)Total"]);
    }

    #[test]
    fn missing_data_dir_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_warehouse(&dir.path().join("nope"), &dir.path().join("w.db")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
        assert!(err.message().contains("nope"));
    }

    #[test]
    fn rebuild_drops_tables_whose_source_disappeared() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let db = dir.path().join("w.db");
        std::fs::create_dir_all(&data).unwrap();
        let vendas = data.join("dados_vendas_natal_tratado.csv");
        std::fs::write(&vendas, "Data;preço médio\n2022-01-01;7.500,25\n2022-02-01;7.600,00\n").unwrap();

        let first = build_warehouse(&data, &db).unwrap();
        assert_eq!(first.meta.unwrap().rows.get("vendas"), Some(&2));

        std::fs::remove_file(&vendas).unwrap();
        let second = build_warehouse(&data, &db).unwrap();
        assert!(matches!(
            second.tables.iter().find(|(t, _)| *t == Table::Sale),
            Some((_, TableOutcome::Skipped))
        ));

        let meta = crate::warehouse::meta::read_meta(&second.meta_path).unwrap();
        let conn = store::open_ro(&db).unwrap().unwrap();
        for (table, rows) in &meta.rows {
            let stored = if store::table_exists(&conn, table).unwrap() {
                store::count_rows(&conn, table).unwrap()
            } else {
                0
            };
            assert_eq!(*rows, stored, "meta disagrees with the warehouse for {table}");
        }
        assert!(!store::table_exists(&conn, "vendas").unwrap());
    }

    #[test]
    fn city_file_lookup_tolerates_suffix_variants() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dados_vendas_recife_tratados.csv"), "Data;x\n").unwrap();
        std::fs::write(dir.path().join("dados_locacao_natal_tratado_v2.csv"), "Data;x\n").unwrap();

        let p = find_city_csv(dir.path(), MarketType::Sale, City::Recife).unwrap();
        assert!(p.ends_with("dados_vendas_recife_tratados.csv"));
        let p = find_city_csv(dir.path(), MarketType::Rental, City::Natal).unwrap();
        assert!(p.ends_with("dados_locacao_natal_tratado_v2.csv"));
        assert!(find_city_csv(dir.path(), MarketType::Rental, City::Recife).is_none());
    }
}

//! Plain-text terminal output.

use std::path::Path;

use crate::domain::{Series, Table};
use crate::forecast::{ForecastOutcome, MetricsOutcome, VALIDATION_R2};
use crate::models::ModelBundle;
use crate::warehouse::{BuildReport, CaptureOutcome, TableOutcome, WarehouseMeta};

/// Summary printed after `rw build`.
pub fn format_build_report(report: &BuildReport) -> String {
    let mut out = String::new();

    out.push_str("=== rw - warehouse build ===\n");
    out.push_str(&format!("Data: {}\n", report.data_dir.display()));
    out.push_str(&format!("DB  : {}\n", report.db_path.display()));

    out.push_str("\nSources:\n");
    for s in &report.loaded {
        out.push_str(&format!("  {:<28} {:>6} rows", truncate(&s.label, 28), s.rows));
        if s.dropped_dates > 0 {
            out.push_str(&format!("  ({} dropped: bad/repeated date)", s.dropped_dates));
        }
        out.push('\n');
    }
    for m in &report.missing {
        out.push_str(&format!("  (missing) {m}\n"));
    }
    for f in &report.failures {
        out.push_str(&format!("  (failed)  {f}\n"));
    }

    out.push_str("\nTables:\n");
    for (table, outcome) in &report.tables {
        let status = match outcome {
            TableOutcome::Written { rows } => format!("{rows} rows"),
            TableOutcome::Skipped => "skipped (no source rows; left unchanged)".to_string(),
            TableOutcome::Failed { message } => format!("FAILED: {message}"),
        };
        out.push_str(&format!("  {:<10} {status}\n", table.name()));
    }

    if report.meta.is_some() {
        out.push_str(&format!("\nMetadata: {}\n", report.meta_path.display()));
    }
    if !report.is_complete() {
        out.push_str("\nBuild finished with warnings.\n");
    }
    out
}

/// `rw status`: metadata of the last build, if any.
pub fn format_status(db_path: &Path, meta: Option<&WarehouseMeta>) -> String {
    let mut out = String::new();
    out.push_str(&format!("DB: {}", db_path.display()));
    if !db_path.exists() {
        out.push_str(" (not built yet; run `rw build`)\n");
        return out;
    }
    out.push('\n');

    let Some(meta) = meta else {
        out.push_str("No build metadata found.\n");
        return out;
    };
    out.push_str(&format!("Built at: {}\n", meta.built_at.format("%Y-%m-%d %H:%M:%S UTC")));
    for table in [Table::Rental, Table::Sale, Table::Indicators, Table::IndicatorsWide] {
        let rows = meta.rows.get(table.name()).copied().unwrap_or(0);
        out.push_str(&format!("  {:<10} {rows:>8} rows\n", table.name()));
    }
    if !meta.missing_sources.is_empty() {
        out.push_str(&format!("Missing sources: {}\n", meta.missing_sources.join(", ")));
    }
    out
}

/// One item per line under a title.
pub fn format_list(title: &str, items: &[String]) -> String {
    let mut out = format!("{title} ({}):\n", items.len());
    for item in items {
        out.push_str(&format!("  {item}\n"));
    }
    out
}

/// Date / value table for one metric of a series.
pub fn format_series(title: &str, series: &Series, metric: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("{title}\n"));
    out.push_str(&format!("{:<12} {:>16}\n", "date", truncate(metric, 16)));
    out.push_str(&format!("{:-<12} {:-<16}\n", "", ""));

    let values = series.values(metric);
    for (i, date) in series.dates.iter().enumerate() {
        let cell = values
            .as_ref()
            .and_then(|v| v.get(i).copied().flatten())
            .map(|v| format!("{v:.2}"))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!("{:<12} {cell:>16}\n", date.format("%Y-%m-%d")));
    }
    out
}

pub fn format_capture(outcome: &CaptureOutcome) -> String {
    let mut out = format!(
        "{} row(s) inserted into {} for {}",
        outcome.inserted, outcome.table, outcome.city
    );
    if outcome.deleted > 0 {
        out.push_str(&format!(" ({} existing row(s) replaced)", outcome.deleted));
    }
    out.push('\n');
    for w in &outcome.warnings {
        out.push_str(&format!("warning: {w}\n"));
    }
    out
}

pub fn format_forecast(title: &str, outcome: &ForecastOutcome) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== rw - {} forecast: {title} ===\n", outcome.model));
    out.push_str(&format!("Target: {}\n", outcome.target));
    if let (Some(first), Some(last)) = (outcome.dates.first(), outcome.dates.last()) {
        out.push_str(&format!("History: {} rows ({first} to {last})\n", outcome.dates.len()));
    }

    out.push_str("\nIn-sample fit:\n");
    match &outcome.metrics {
        MetricsOutcome::Computed(m) => {
            out.push_str(&format!("  MAE ={:>12.2}\n", m.mae));
            out.push_str(&format!("  RMSE={:>12.2}\n", m.rmse));
            out.push_str(&format!("  R²  ={:>12.4}\n", m.r2));
            match m.mape {
                Some(p) => out.push_str(&format!("  MAPE={p:>11.2}%\n")),
                None => out.push_str("  MAPE=         n/a (zero observation)\n"),
            }
            if m.is_validated() {
                out.push_str(&format!("  Verdict: pre-validated for consultation (R² ≥ {VALIDATION_R2})\n"));
            } else {
                out.push_str(&format!(
                    "  Verdict: low R² (< {VALIDATION_R2}); try another city, period or feature set\n"
                ));
            }
        }
        MetricsOutcome::Skipped { reason } => out.push_str(&format!("  (skipped) {reason}\n")),
    }

    out.push_str("\nForecast:\n");
    if outcome.future.is_empty() {
        out.push_str("  (none)\n");
    } else {
        out.push_str(&format!("  {:<12} {:>12}\n", "date", "yhat"));
        for (d, v) in outcome.future_dates.iter().zip(&outcome.future) {
            out.push_str(&format!("  {:<12} {v:>12.2}\n", d.format("%Y-%m-%d")));
        }
    }

    if !outcome.warnings.is_empty() {
        out.push('\n');
        for w in &outcome.warnings {
            out.push_str(&format!("warning: {w}\n"));
        }
    }
    out
}

/// `rw bundle`: coverage and load status of every entry.
pub fn format_bundle(path: &Path, bundle: &ModelBundle) -> String {
    let mut out = String::new();
    out.push_str(&format!("Bundle: {} ({} models)\n", path.display(), bundle.len()));
    out.push_str(&format!("{:<8} {:<14} {:<14} status\n", "market", "city", "family"));
    out.push_str(&format!("{:-<8} {:-<14} {:-<14} {:-<6}\n", "", "", "", ""));
    for (market, city, family, status) in bundle.summary() {
        let status = match status {
            Ok(()) => "ok".to_string(),
            Err(e) => format!("invalid: {e}"),
        };
        out.push_str(&format!(
            "{:<8} {:<14} {:<14} {status}\n",
            market.file_kind(),
            truncate(city.label(), 14),
            family.key()
        ));
    }
    for s in bundle.skipped() {
        out.push_str(&format!("(skipped) {s}\n"));
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::Metrics;
    use chrono::NaiveDate;

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate("Recife", 10), "Recife");
        assert_eq!(truncate("Preço médio (R$/m²)Total", 8), "Preço m.");
    }

    #[test]
    fn forecast_report_lists_metrics_and_future() {
        let d = |m| NaiveDate::from_ymd_opt(2024, m, 1).unwrap();
        let outcome = ForecastOutcome {
            model: "ARIMA",
            target: "Preço médio (R$/m²)Total".into(),
            dates: vec![d(1), d(2)],
            actual: vec![10.0, 11.0],
            historical: vec![10.0, 11.5],
            future_dates: vec![d(3)],
            future: vec![12.25],
            metrics: MetricsOutcome::Computed(Metrics {
                mae: 0.25,
                rmse: 0.35,
                r2: 0.5,
                mape: None,
            }),
            warnings: vec!["feature 'x' not found; filled with 0".into()],
        };
        let text = format_forecast("locacao / Recife", &outcome);
        assert!(text.contains("ARIMA forecast: locacao / Recife"));
        assert!(text.contains("2024-03-01"));
        assert!(text.contains("12.25"));
        assert!(text.contains("n/a"));
        assert!(text.contains("warning: feature 'x'"));
        // R² exactly at the threshold passes.
        assert!(text.contains("Verdict: pre-validated"));
    }

    #[test]
    fn low_r2_is_not_validated() {
        let d = |m| NaiveDate::from_ymd_opt(2024, m, 1).unwrap();
        let mut outcome = ForecastOutcome {
            model: "Prophet",
            target: "v".into(),
            dates: vec![d(1), d(2)],
            actual: vec![10.0, 11.0],
            historical: vec![11.0, 10.0],
            future_dates: vec![],
            future: vec![],
            metrics: MetricsOutcome::Computed(Metrics {
                mae: 1.0,
                rmse: 1.0,
                r2: 0.4999,
                mape: Some(9.5),
            }),
            warnings: vec![],
        };
        let text = format_forecast("t", &outcome);
        assert!(text.contains("Verdict: low R²"));
        assert!(!text.contains("pre-validated"));

        outcome.metrics = MetricsOutcome::Skipped {
            reason: "no observations to compare against".into(),
        };
        assert!(!format_forecast("t", &outcome).contains("Verdict"));
    }

    #[test]
    fn capture_mentions_replaced_rows() {
        let text = format_capture(&CaptureOutcome {
            table: Table::Rental,
            city: "Recife".into(),
            inserted: 3,
            deleted: 2,
            warnings: vec![],
        });
        assert_eq!(text, "3 row(s) inserted into locacao for Recife (2 existing row(s) replaced)\n");
    }
}

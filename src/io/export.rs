//! Export a forecast to CSV.
//!
//! One row per month: observed months carry `actual` and `fitted`, future
//! months carry `forecast`. Written with `;` like the source files, so the
//! export opens directly in the same spreadsheets.

use std::path::Path;

use crate::error::AppError;
use crate::forecast::ForecastOutcome;

pub fn write_forecast_csv(path: &Path, outcome: &ForecastOutcome) -> Result<(), AppError> {
    let mut w = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .map_err(|e| AppError::storage(format!("Failed to create export CSV '{}': {e}", path.display())))?;
    let row_err = |e: csv::Error| AppError::storage(format!("Failed to write export CSV row: {e}"));

    w.write_record(["Data", "kind", "actual", "fitted", "forecast"]).map_err(row_err)?;

    for (i, date) in outcome.dates.iter().enumerate() {
        let fitted = outcome.historical.get(i).map(|v| format!("{v:.4}")).unwrap_or_default();
        let actual = outcome.actual.get(i).map(|v| format!("{v:.4}")).unwrap_or_default();
        w.write_record([
            date.format("%Y-%m-%d").to_string(),
            "history".to_string(),
            actual,
            fitted,
            String::new(),
        ])
        .map_err(row_err)?;
    }
    for (date, v) in outcome.future_dates.iter().zip(&outcome.future) {
        w.write_record([
            date.format("%Y-%m-%d").to_string(),
            "forecast".to_string(),
            String::new(),
            String::new(),
            format!("{v:.4}"),
        ])
        .map_err(row_err)?;
    }

    w.flush()
        .map_err(|e| AppError::storage(format!("Failed to flush export CSV '{}': {e}", path.display())))?;
    Ok(())
}

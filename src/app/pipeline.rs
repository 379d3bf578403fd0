//! Shared "load, then forecast" logic behind the `series` and `forecast`
//! subcommands.
//!
//! Flow: warehouse series -> optional indicator join -> history -> future
//! months -> bundle lookup -> adapter.

use chrono::NaiveDate;

use crate::domain::{City, FillPolicy, MarketType, ModelFamily, Series};
use crate::error::AppError;
use crate::forecast::{future_months, run_forecast, ForecastOutcome};
use crate::models::History;
use crate::session::Session;

/// Stored label for a city argument: the canonical label for the nine known
/// cities, the trimmed input otherwise.
pub fn city_label(city: &str) -> String {
    City::from_key(city).map_or_else(|| city.trim().to_string(), |c| c.label().to_string())
}

/// A city's series, optionally joined with the wide indicators. Load warnings
/// are returned alongside; a missing table is not an error here.
pub fn city_series(
    session: &mut Session,
    market: MarketType,
    city: &str,
    with_indicators: bool,
) -> Result<(Series, Vec<String>), AppError> {
    let label = city_label(city);
    let loaded = session.loader().load(market.table(), &label)?;
    let mut warnings: Vec<String> = loaded.warning.into_iter().collect();
    let mut series = loaded.value;

    if with_indicators && !series.is_empty() {
        let wide = session.loader().indicators_wide()?;
        warnings.extend(wide.warning);
        if !wide.value.is_empty() {
            series = series.join(&wide.value).map_err(AppError::partial)?;
        }
    }
    Ok((series, warnings))
}

#[derive(Debug, Clone)]
pub struct ForecastRequest {
    pub market: MarketType,
    pub city: String,
    pub family: ModelFamily,
    pub target: String,
    pub end: NaiveDate,
    pub fill: FillPolicy,
    pub with_indicators: bool,
}

#[derive(Debug, Clone)]
pub struct ForecastRun {
    /// `market / city` heading for reports.
    pub title: String,
    pub outcome: ForecastOutcome,
}

pub fn forecast(session: &mut Session, req: &ForecastRequest) -> Result<ForecastRun, AppError> {
    let city = City::from_key(&req.city).ok_or_else(|| {
        AppError::validation(format!(
            "Unknown city '{}'. Forecasts cover: {}.",
            req.city,
            City::ALL.map(|c| c.label()).join(", ")
        ))
    })?;

    let (series, load_warnings) = city_series(session, req.market, city.label(), req.with_indicators)?;
    if series.is_empty() {
        let why = load_warnings.first().cloned().unwrap_or_default();
        return Err(AppError::partial(format!(
            "No history for {} in {}. {why}",
            city.label(),
            req.market.table()
        )));
    }

    let history = History::from_series(&series, &req.target, req.fill).map_err(AppError::validation)?;
    let Some(last) = history.last_date() else {
        return Err(AppError::partial(format!(
            "No rows with a value for '{}' for {}.",
            req.target,
            city.label()
        )));
    };
    let future = future_months(last, req.end);

    let context = format!("{}/{}/{}", req.market.file_kind(), city.slug(), req.family.key());
    let entry = session
        .bundle()?
        .get(req.market, city, req.family)
        .map_err(|e| AppError::model(e.to_string()))?;

    let mut outcome = run_forecast(entry, &history, &future, &context)?;
    let mut warnings = load_warnings;
    warnings.append(&mut outcome.warnings);
    outcome.warnings = warnings;

    Ok(ForecastRun {
        title: format!("{} / {}", req.market.label(), city.label()),
        outcome,
    })
}

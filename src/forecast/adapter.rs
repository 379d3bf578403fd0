//! Runs one model over one history and packages the result.
//!
//! Model failures stop here: whatever goes wrong inside prediction comes out
//! as a single `AppError` of kind `Model`, and no partial outcome is returned.

use chrono::NaiveDate;
use log::warn;

use crate::error::AppError;
use crate::forecast::metrics::{evaluate, MetricsOutcome};
use crate::models::{Forecaster, History, ModelError};

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastOutcome {
    pub model: &'static str,
    pub target: String,
    pub dates: Vec<NaiveDate>,
    pub actual: Vec<f64>,
    pub historical: Vec<f64>,
    pub future_dates: Vec<NaiveDate>,
    pub future: Vec<f64>,
    pub metrics: MetricsOutcome,
    pub warnings: Vec<String>,
}

fn check_finite(values: &[f64], what: &str) -> Result<(), ModelError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(ModelError::ComputationError(format!("non-finite {what} value at position {i}"))),
        None => Ok(()),
    }
}

fn predict<F: Forecaster + ?Sized>(
    model: &F,
    history: &History,
    future_dates: &[NaiveDate],
) -> Result<ForecastOutcome, ModelError> {
    if history.is_empty() {
        return Err(ModelError::EmptyData);
    }
    let mut warnings = Vec::new();

    let historical = model.predict_historical(history)?;
    check_finite(&historical.values, "in-sample")?;
    warnings.extend(historical.warnings);

    let future = if future_dates.is_empty() {
        warnings.push("no future months in the requested horizon".to_string());
        Vec::new()
    } else {
        let p = model.predict_future(history, future_dates)?;
        if p.values.len() != future_dates.len() {
            return Err(ModelError::DimensionMismatch {
                expected: future_dates.len(),
                got: p.values.len(),
            });
        }
        check_finite(&p.values, "forecast")?;
        for w in p.warnings {
            if !warnings.contains(&w) {
                warnings.push(w);
            }
        }
        p.values
    };

    let metrics = evaluate(&history.actual, &historical.values);
    if let MetricsOutcome::Skipped { reason } = &metrics {
        warnings.push(format!("metrics skipped: {reason}"));
    }

    Ok(ForecastOutcome {
        model: model.name(),
        target: history.target.clone(),
        dates: history.dates.clone(),
        actual: history.actual.clone(),
        historical: historical.values,
        future_dates: future_dates.to_vec(),
        future,
        metrics,
        warnings,
    })
}

/// Predict in-sample and over `future_dates`, then score the in-sample part.
/// `context` (market, city, family) prefixes any error message.
pub fn run_forecast<F: Forecaster + ?Sized>(
    model: &F,
    history: &History,
    future_dates: &[NaiveDate],
    context: &str,
) -> Result<ForecastOutcome, AppError> {
    let outcome = predict(model, history, future_dates)
        .map_err(|e| AppError::model(format!("{context}: {} forecast failed: {e}", model.name())))?;
    for w in &outcome.warnings {
        warn!("{context}: {w}");
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::frame::{frame_from, real_column, text_column};
    use crate::domain::{FillPolicy, Series, DATE_COLUMN, PRICE_COLUMN};
    use crate::error::ErrorKind;
    use crate::models::Prediction;

    struct Fixed {
        historical: Vec<f64>,
        future: Result<Vec<f64>, ModelError>,
    }

    impl Forecaster for Fixed {
        fn name(&self) -> &'static str {
            "Fixed"
        }

        fn predict_historical(&self, _: &History) -> Result<Prediction, ModelError> {
            Ok(Prediction::new(self.historical.clone()))
        }

        fn predict_future(&self, _: &History, _: &[NaiveDate]) -> Result<Prediction, ModelError> {
            self.future.clone().map(Prediction::new)
        }
    }

    fn history(n: usize) -> History {
        let frame = frame_from(vec![
            text_column(DATE_COLUMN, (0..n).map(|i| Some(format!("2023-{:02}-01", i + 1))).collect()),
            real_column(PRICE_COLUMN, (0..n).map(|i| Some(10.0 + i as f64)).collect()),
        ])
        .unwrap();
        History::from_series(&Series::from_frame(frame).unwrap(), PRICE_COLUMN, FillPolicy::Zero).unwrap()
    }

    fn month(m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, 1).unwrap()
    }

    #[test]
    fn length_mismatch_only_skips_metrics() {
        let model = Fixed {
            historical: vec![1.0; 11],
            future: Ok(vec![5.0]),
        };
        let out = run_forecast(&model, &history(10), &[month(1)], "locacao/Recife").unwrap();
        assert!(matches!(out.metrics, MetricsOutcome::Skipped { .. }));
        assert!(out.warnings.iter().any(|w| w.contains("metrics skipped")));
        assert_eq!(out.future, vec![5.0]);
    }

    #[test]
    fn model_errors_become_one_app_error() {
        let model = Fixed {
            historical: vec![1.0; 3],
            future: Err(ModelError::ComputationError("boom".into())),
        };
        let err = run_forecast(&model, &history(3), &[month(1)], "venda/Natal").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Model);
        assert!(err.message().contains("venda/Natal"));
        assert!(err.message().contains("boom"));
    }

    #[test]
    fn empty_horizon_is_a_warning() {
        let model = Fixed {
            historical: vec![10.0, 11.0],
            future: Ok(vec![]),
        };
        let out = run_forecast(&model, &history(2), &[], "x").unwrap();
        assert!(out.future.is_empty());
        assert_eq!(out.metrics.metrics().unwrap().mae, 0.0);
        assert!(out.warnings.iter().any(|w| w.contains("no future months")));
    }

    #[test]
    fn short_future_is_rejected() {
        let model = Fixed {
            historical: vec![10.0],
            future: Ok(vec![1.0]),
        };
        let err = run_forecast(&model, &history(1), &[month(1), month(2)], "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Model);
    }
}

//! Prophet-style additive model: piecewise-linear trend, yearly Fourier
//! seasonality and standardized extra regressors, all on a scaled target.

use std::f64::consts::PI;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::models::error::ModelError;
use crate::models::features::{future_column, historical_column};
use crate::models::history::{History, TrainingFrame};
use crate::models::{Forecaster, Prediction};

const YEAR_DAYS: f64 = 365.25;

fn one() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProphetRegressor {
    pub name: String,
    pub coef: f64,
    #[serde(default)]
    pub mu: f64,
    #[serde(default = "one")]
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProphetModel {
    /// Base growth rate.
    pub k: f64,
    /// Base offset.
    pub m: f64,
    #[serde(default)]
    pub changepoints: Vec<NaiveDate>,
    /// Rate adjustment at each changepoint.
    #[serde(default)]
    pub deltas: Vec<f64>,
    /// Date mapped to t = 0.
    pub start: NaiveDate,
    /// Days mapped to t = 1.
    pub t_scale_days: f64,
    #[serde(default = "one")]
    pub y_scale: f64,
    /// Yearly Fourier coefficients, `[sin_1, cos_1, sin_2, cos_2, ...]`.
    #[serde(default)]
    pub yearly: Vec<f64>,
    #[serde(default)]
    pub regressors: Vec<ProphetRegressor>,
    #[serde(default)]
    pub training: Option<TrainingFrame>,
}

impl ProphetModel {
    pub fn check(&self) -> Result<(), String> {
        if self.changepoints.len() != self.deltas.len() {
            return Err(format!(
                "{} changepoints but {} deltas",
                self.changepoints.len(),
                self.deltas.len()
            ));
        }
        if self.t_scale_days.is_nan() || self.t_scale_days <= 0.0 {
            return Err(format!("t_scale_days must be > 0 (got {})", self.t_scale_days));
        }
        if self.yearly.len() % 2 != 0 {
            return Err("yearly coefficients must come in sin/cos pairs".to_string());
        }
        if let Some(t) = &self.training {
            t.check()?;
        }
        Ok(())
    }

    fn scaled_time(&self, date: NaiveDate) -> f64 {
        (date - self.start).num_days() as f64 / self.t_scale_days
    }

    pub fn trend(&self, date: NaiveDate) -> f64 {
        let t = self.scaled_time(date);
        let mut rate = self.k;
        let mut offset = self.m;
        for (cp, delta) in self.changepoints.iter().zip(&self.deltas) {
            let s = self.scaled_time(*cp);
            if t >= s {
                rate += delta;
                offset -= s * delta;
            }
        }
        rate * t + offset
    }

    pub fn yearly_seasonality(&self, date: NaiveDate) -> f64 {
        let Some(epoch) = NaiveDate::from_ymd_opt(1970, 1, 1) else {
            return 0.0;
        };
        let days = (date - epoch).num_days() as f64;
        self.yearly
            .chunks(2)
            .enumerate()
            .map(|(i, pair)| {
                let x = 2.0 * PI * (i + 1) as f64 * days / YEAR_DAYS;
                pair[0] * x.sin() + pair.get(1).copied().unwrap_or(0.0) * x.cos()
            })
            .sum()
    }

    fn yhat(&self, dates: &[NaiveDate], regressors: &[Vec<Option<f64>>]) -> Result<Vec<f64>, ModelError> {
        dates
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let extra: f64 = self
                    .regressors
                    .iter()
                    .zip(regressors)
                    .map(|(r, col)| {
                        let std = if r.std == 0.0 { 1.0 } else { r.std };
                        // A missing cell takes the regressor mean and so adds nothing.
                        let x = col.get(i).copied().flatten().unwrap_or(r.mu);
                        r.coef * (x - r.mu) / std
                    })
                    .sum();
                let y = self.y_scale * (self.trend(*d) + self.yearly_seasonality(*d) + extra);
                if y.is_finite() {
                    Ok(y)
                } else {
                    Err(ModelError::ComputationError(format!("non-finite yhat at {d}")))
                }
            })
            .collect()
    }

    fn regressor_columns(
        &self,
        rows: usize,
        mut column: impl FnMut(&str) -> Option<Vec<Option<f64>>>,
    ) -> (Vec<Vec<Option<f64>>>, Vec<String>) {
        let mut warnings = Vec::new();
        let cols = self
            .regressors
            .iter()
            .map(|r| {
                column(&r.name).unwrap_or_else(|| {
                    warnings.push(format!("regressor '{}' not found; filled with 0", r.name));
                    vec![Some(0.0); rows]
                })
            })
            .collect();
        (cols, warnings)
    }
}

impl Forecaster for ProphetModel {
    fn name(&self) -> &'static str {
        "Prophet"
    }

    fn predict_historical(&self, history: &History) -> Result<Prediction, ModelError> {
        if history.is_empty() {
            return Err(ModelError::EmptyData);
        }
        let (cols, warnings) = self.regressor_columns(history.len(), |name| {
            historical_column(name, history, self.training.as_ref())
        });
        Ok(Prediction {
            values: self.yhat(&history.dates, &cols)?,
            warnings,
        })
    }

    fn predict_future(&self, history: &History, dates: &[NaiveDate]) -> Result<Prediction, ModelError> {
        let (cols, warnings) = self.regressor_columns(dates.len(), |name| {
            future_column(name, history, self.training.as_ref(), dates, history.fill)
        });
        Ok(Prediction {
            values: self.yhat(dates, &cols)?,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn linear() -> ProphetModel {
        ProphetModel {
            k: 1.0,
            m: 0.5,
            changepoints: vec![],
            deltas: vec![],
            start: d(2020, 1),
            t_scale_days: 366.0,
            y_scale: 1000.0,
            yearly: vec![],
            regressors: vec![],
            training: None,
        }
    }

    #[test]
    fn trend_is_linear_without_changepoints() {
        let m = linear();
        assert_relative_eq!(m.trend(d(2020, 1)), 0.5);
        assert_relative_eq!(m.trend(d(2021, 1)), 1.5);
    }

    #[test]
    fn changepoint_bends_the_trend_continuously() {
        let mut m = linear();
        m.changepoints = vec![d(2021, 1)];
        m.deltas = vec![-1.0];
        // Continuous at the changepoint, flat afterwards.
        assert_relative_eq!(m.trend(d(2021, 1)), 1.5, epsilon = 1e-12);
        assert_relative_eq!(m.trend(d(2022, 1)), 1.5, epsilon = 1e-12);
    }

    #[test]
    fn yearly_term_repeats_each_year() {
        let mut m = linear();
        m.yearly = vec![0.1, 0.2, 0.05, -0.03];
        let a = m.yearly_seasonality(d(2020, 3));
        let b = m.yearly_seasonality(d(2024, 3));
        assert_relative_eq!(a, b, epsilon = 1e-2);
    }

    #[test]
    fn invalid_shapes_are_reported() {
        let mut m = linear();
        m.deltas = vec![0.1];
        assert!(m.check().unwrap_err().contains("deltas"));
        let mut m = linear();
        m.t_scale_days = 0.0;
        assert!(m.check().is_err());
    }

    #[test]
    fn regressor_is_standardized_and_scaled() {
        let mut m = linear();
        m.regressors = vec![ProphetRegressor {
            name: "Selic".into(),
            coef: 0.2,
            mu: 10.0,
            std: 2.0,
        }];
        let y = m.yhat(&[d(2020, 1)], &[vec![Some(12.0)]]).unwrap();
        // (0.5 + 0.2 * (12 - 10) / 2) * 1000
        assert_relative_eq!(y[0], 700.0);
    }

    #[test]
    fn missing_regressor_cell_is_neutral() {
        let mut m = linear();
        m.regressors = vec![ProphetRegressor {
            name: "Selic".into(),
            coef: 0.2,
            mu: 10.0,
            std: 2.0,
        }];
        let y = m.yhat(&[d(2020, 1), d(2020, 1)], &[vec![None, Some(10.0)]]).unwrap();
        assert_relative_eq!(y[0], 500.0);
        assert_relative_eq!(y[0], y[1]);
    }
}

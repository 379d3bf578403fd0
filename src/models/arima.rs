//! ARIMA(p, d, q) evaluated from stored coefficients.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::models::error::ModelError;
use crate::models::history::History;
use crate::models::{Forecaster, Prediction};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArimaModel {
    #[serde(default)]
    pub ar: Vec<f64>,
    #[serde(default)]
    pub ma: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
    /// Differencing order.
    #[serde(default)]
    pub d: usize,
    /// Level the un-differencing starts from; the last observed value when absent.
    #[serde(default)]
    pub last_observed: Option<f64>,
    /// In-sample predictions recorded at training time.
    #[serde(default)]
    pub fitted: Option<Vec<f64>>,
    /// A precomputed forecast path on the differenced scale. When present it
    /// is used instead of running the recursion.
    #[serde(default, alias = "forecast_path")]
    pub forecast: Option<Vec<f64>>,
}

/// Difference `series` `d` times. Each pass loses one point, so a series of
/// `d` points or fewer differences to nothing.
pub fn difference(series: &[f64], d: usize) -> Vec<f64> {
    let mut out = series.to_vec();
    for _ in 0..d {
        out = out.windows(2).map(|w| w[1] - w[0]).collect();
    }
    out
}

/// Undo `d` levels of differencing on a forecast path by cumulative summation.
///
/// Level 0 starts from `seed` (or the last historical value); higher levels
/// start from the last value of the history differenced to that level.
pub fn undifference(path: &[f64], history: &[f64], d: usize, seed: Option<f64>) -> Vec<f64> {
    let mut out = path.to_vec();
    for level in (0..d).rev() {
        let start = if level == 0 {
            seed.or_else(|| history.last().copied()).unwrap_or(0.0)
        } else {
            difference(history, level).last().copied().unwrap_or(0.0)
        };
        let mut acc = start;
        for v in out.iter_mut() {
            acc += *v;
            *v = acc;
        }
    }
    out
}

fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

impl ArimaModel {
    /// One ARMA step on the differenced scale at position `t`.
    fn step(&self, diff: &[f64], resid: &[f64], t: usize) -> f64 {
        let mut pred = self.intercept;
        for (i, phi) in self.ar.iter().enumerate() {
            if t > i {
                pred += phi * (diff[t - 1 - i] - self.intercept);
            }
        }
        for (i, theta) in self.ma.iter().enumerate() {
            if t > i {
                pred += theta * resid[t - 1 - i];
            }
        }
        pred
    }

    /// One-step-ahead in-sample predictions on the differenced scale, with residuals.
    fn filter(&self, diff: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let mut preds = Vec::with_capacity(diff.len());
        let mut resid = Vec::with_capacity(diff.len());
        for t in 0..diff.len() {
            let p = self.step(diff, &resid, t);
            preds.push(p);
            resid.push(diff[t] - p);
        }
        (preds, resid)
    }

    /// In-sample predictions on the level scale. The first `d` points have no
    /// differenced prediction and echo the observations.
    pub fn one_step_in_sample(&self, y: &[f64]) -> Vec<f64> {
        if y.len() <= self.d {
            return y.to_vec();
        }
        let diff = difference(y, self.d);
        let (preds, _) = self.filter(&diff);

        let mut out: Vec<f64> = y[..self.d].to_vec();
        for (j, p) in preds.iter().enumerate() {
            let n = j + self.d;
            // y_n = Δ^d y_n - Σ_{k=1..d} (-1)^k C(d,k) y_{n-k}
            let carried: f64 = (1..=self.d)
                .map(|k| {
                    let sign = if k % 2 == 1 { 1.0 } else { -1.0 };
                    sign * binomial(self.d, k) * y[n - k]
                })
                .sum();
            out.push(p + carried);
        }
        out
    }

    /// Raw forecast path for `horizon` steps on the differenced scale.
    fn raw_path(&self, y: &[f64], horizon: usize) -> Result<Vec<f64>, ModelError> {
        if let Some(stored) = &self.forecast {
            if stored.len() < horizon {
                return Err(ModelError::DimensionMismatch {
                    expected: horizon,
                    got: stored.len(),
                });
            }
            return Ok(stored[..horizon].to_vec());
        }
        if y.len() <= self.d {
            // Nothing left after differencing: the path is the drift alone.
            return Ok(vec![self.intercept; horizon]);
        }

        let mut diff = difference(y, self.d);
        let (_, mut resid) = self.filter(&diff);
        let n = diff.len();
        for _ in 0..horizon {
            let p = self.step(&diff, &resid, diff.len());
            diff.push(p);
            resid.push(0.0);
        }
        Ok(diff[n..].to_vec())
    }
}

impl Forecaster for ArimaModel {
    fn name(&self) -> &'static str {
        "ARIMA"
    }

    fn predict_historical(&self, history: &History) -> Result<Prediction, ModelError> {
        if history.is_empty() {
            return Err(ModelError::EmptyData);
        }
        let values = match &self.fitted {
            Some(stored) => stored.clone(),
            None => self.one_step_in_sample(&history.actual),
        };
        Ok(Prediction::new(values))
    }

    fn predict_future(&self, history: &History, dates: &[NaiveDate]) -> Result<Prediction, ModelError> {
        if history.is_empty() {
            return Err(ModelError::EmptyData);
        }
        let raw = self.raw_path(&history.actual, dates.len())?;
        let values = if self.d > 0 {
            undifference(&raw, &history.actual, self.d, self.last_observed)
        } else {
            raw
        };
        Ok(Prediction::new(values))
    }
}

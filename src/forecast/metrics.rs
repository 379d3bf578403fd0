//! Accuracy of in-sample predictions.

/// Error measures of predictions against observations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub mae: f64,
    pub rmse: f64,
    /// 1 when the observations are constant and matched exactly.
    pub r2: f64,
    /// Percent. `None` when an observation is zero.
    pub mape: Option<f64>,
}

/// Minimum in-sample R² for a model to count as pre-validated.
pub const VALIDATION_R2: f64 = 0.5;

impl Metrics {
    pub fn is_validated(&self) -> bool {
        self.r2 >= VALIDATION_R2
    }
}

/// Metrics, or why they could not be computed. Never an error: a forecast is
/// still shown without them.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricsOutcome {
    Computed(Metrics),
    Skipped { reason: String },
}

impl MetricsOutcome {
    pub fn metrics(&self) -> Option<&Metrics> {
        match self {
            MetricsOutcome::Computed(m) => Some(m),
            MetricsOutcome::Skipped { .. } => None,
        }
    }
}

pub fn evaluate(actual: &[f64], predicted: &[f64]) -> MetricsOutcome {
    if actual.is_empty() || predicted.is_empty() {
        return MetricsOutcome::Skipped {
            reason: "no observations to compare against".to_string(),
        };
    }
    if actual.len() != predicted.len() {
        return MetricsOutcome::Skipped {
            reason: format!(
                "prediction length {} does not match {} observations",
                predicted.len(),
                actual.len()
            ),
        };
    }

    let n = actual.len() as f64;
    let pairs = || actual.iter().zip(predicted);

    let mae = pairs().map(|(a, p)| (a - p).abs()).sum::<f64>() / n;
    let sse: f64 = pairs().map(|(a, p)| (a - p).powi(2)).sum();
    let rmse = (sse / n).sqrt();

    let mean = actual.iter().sum::<f64>() / n;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let r2 = if ss_tot == 0.0 {
        if sse == 0.0 { 1.0 } else { 0.0 }
    } else {
        1.0 - sse / ss_tot
    };

    let mape = if actual.iter().any(|a| *a == 0.0) {
        None
    } else {
        Some(pairs().map(|(a, p)| ((a - p) / a).abs()).sum::<f64>() / n * 100.0)
    };

    MetricsOutcome::Computed(Metrics { mae, rmse, r2, mape })
}

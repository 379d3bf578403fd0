//! Pre-trained forecasting models read from a bundle.
//!
//! Nothing here trains. Each family evaluates stored parameters:
//!
//! - `prophet`: trend + yearly seasonality + regressors
//! - `arima`: ARMA recursion on a differenced series
//! - `regressor`: tree ensembles and elastic net over a feature matrix
//!
//! `bundle` turns the on-disk layouts into one lookup table of `ModelEntry`.

pub mod arima;
pub mod bundle;
pub mod error;
pub mod features;
pub mod history;
pub mod prophet;
pub mod regressor;

pub use bundle::{ModelBundle, ModelEntry};
pub use error::ModelError;
pub use history::{History, TrainingFrame};

use chrono::NaiveDate;

/// Model output plus degradations worth telling the operator about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prediction {
    pub values: Vec<f64>,
    pub warnings: Vec<String>,
}

impl Prediction {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            warnings: Vec::new(),
        }
    }
}

/// Common interface over the model families.
pub trait Forecaster {
    fn name(&self) -> &'static str;

    /// Predictions aligned with the history rows.
    fn predict_historical(&self, history: &History) -> Result<Prediction, ModelError>;

    /// Predictions for `dates`, all after the last history date.
    fn predict_future(&self, history: &History, dates: &[NaiveDate]) -> Result<Prediction, ModelError>;
}

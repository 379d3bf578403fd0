//! Forecasting over a loaded city series.
//!
//! - `horizon`: which future months to predict
//! - `adapter`: run a model, collect warnings, map failures to `AppError`
//! - `metrics`: MAE / RMSE / R² / MAPE of the in-sample fit

pub mod adapter;
pub mod horizon;
pub mod metrics;

pub use adapter::{run_forecast, ForecastOutcome};
pub use horizon::future_months;
pub use metrics::{evaluate, Metrics, MetricsOutcome, VALIDATION_R2};

//! One operator session: settings, the cached loader and the model bundle.
//!
//! Writes to the warehouse go through here so the loader cache is always
//! invalidated after them.

use chrono::NaiveDate;
use log::info;

use crate::config::Settings;
use crate::domain::{City, MarketType, PRICE_COLUMN};
use crate::error::AppError;
use crate::models::ModelBundle;
use crate::series::SeriesLoader;
use crate::warehouse::{self, BatchCapture, BuildReport, CaptureOutcome, SingleCapture};

#[derive(Debug)]
pub struct Session {
    settings: Settings,
    loader: SeriesLoader,
    bundle: Option<ModelBundle>,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        let loader = SeriesLoader::new(settings.db_path.clone(), settings.cache_ttl);
        Self {
            settings,
            loader,
            bundle: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn loader(&mut self) -> &mut SeriesLoader {
        &mut self.loader
    }

    /// The model bundle, read from disk on first use.
    pub fn bundle(&mut self) -> Result<&ModelBundle, AppError> {
        let bundle = match self.bundle.take() {
            Some(b) => b,
            None => {
                let path = self.settings.bundle_path.as_ref().ok_or_else(|| {
                    AppError::config("No model bundle configured. Set RW_BUNDLE or pass --bundle.")
                })?;
                let b = ModelBundle::load(path).map_err(|e| AppError::model(e.to_string()))?;
                info!("model bundle loaded from {} ({} models)", path.display(), b.len());
                b
            }
        };
        Ok(self.bundle.insert(bundle))
    }

    /// Rebuild the warehouse from the data directory and drop every cached read.
    pub fn build(&mut self) -> Result<BuildReport, AppError> {
        let report = warehouse::build_warehouse(&self.settings.data_dir, &self.settings.db_path)?;
        self.loader.clear();
        Ok(report)
    }

    pub fn capture_single(&mut self, capture: &SingleCapture) -> Result<CaptureOutcome, AppError> {
        let outcome = warehouse::insert_single(&self.settings.db_path, capture)?;
        self.loader.invalidate(outcome.table);
        Ok(outcome)
    }

    pub fn capture_batch(&mut self, capture: &BatchCapture) -> Result<CaptureOutcome, AppError> {
        let outcome = warehouse::insert_batch(&self.settings.db_path, capture)?;
        self.loader.invalidate(outcome.table);
        Ok(outcome)
    }

    /// Last stored price for a market and city, used as the default batch base.
    pub fn last_price(&mut self, market: MarketType, city: &str) -> Result<Option<f64>, AppError> {
        let label = City::from_key(city).map_or_else(|| city.trim().to_string(), |c| c.label().to_string());
        let loaded = self.loader.load(market.table(), &label)?;
        Ok(loaded.value.last_value(PRICE_COLUMN))
    }

    /// Last month a forecast should reach.
    pub fn forecast_end(&self) -> NaiveDate {
        self.settings.forecast_end
    }
}

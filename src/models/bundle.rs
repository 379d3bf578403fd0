//! Loading and normalizing a model bundle.
//!
//! Bundles are produced elsewhere and arrive in several JSON layouts:
//!
//! - flat: `{"locacao_recife": {"family": "arima", ...}}`, or a composite key
//!   holding several families (`{"models": {...}, "features": [...]}` or
//!   `{"prophet": {...}, "xgboost": {...}}`)
//! - nested by family: `{"locacao": {"prophet": {"recife": {...}}}}`
//! - nested by city: `{"locacao": {"recife": {...}}}`
//!
//! Any model value may be a `[model, artifacts]` pair, in which case the
//! artifact keys are merged into the model object. Keys not naming a family
//! next to family keys are shared artifacts of every family there.
//!
//! Everything is resolved here, once, into `(market, city) -> family -> entry`.
//! A malformed entry is kept as an error and reported when it is requested,
//! so one bad model does not take the rest of the bundle down.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::domain::{slugify, City, MarketType, ModelFamily};
use crate::models::arima::ArimaModel;
use crate::models::error::ModelError;
use crate::models::history::History;
use crate::models::prophet::ProphetModel;
use crate::models::regressor::TreeModel;
use crate::models::{Forecaster, Prediction};

#[derive(Debug, Clone, PartialEq)]
pub enum ModelEntry {
    Prophet(ProphetModel),
    Arima(ArimaModel),
    Tree(TreeModel),
}

impl ModelEntry {
    pub fn family(&self) -> ModelFamily {
        match self {
            ModelEntry::Prophet(_) => ModelFamily::Prophet,
            ModelEntry::Arima(_) => ModelFamily::Arima,
            ModelEntry::Tree(t) => t.family,
        }
    }

    fn model(&self) -> &dyn Forecaster {
        match self {
            ModelEntry::Prophet(m) => m,
            ModelEntry::Arima(m) => m,
            ModelEntry::Tree(m) => m,
        }
    }

    /// Parse and validate the JSON object of a `family` model found at `path`.
    pub fn from_json(path: &str, family: ModelFamily, value: &Value) -> Result<Self, ModelError> {
        let invalid = |message: String| ModelError::InvalidEntry {
            path: path.to_string(),
            message,
        };
        match family {
            ModelFamily::Prophet => {
                let m = ProphetModel::deserialize(value).map_err(|e| serde_error(path, e))?;
                m.check().map_err(invalid)?;
                Ok(ModelEntry::Prophet(m))
            }
            ModelFamily::Arima => {
                let m = ArimaModel::deserialize(value).map_err(|e| serde_error(path, e))?;
                Ok(ModelEntry::Arima(m))
            }
            _ => {
                let m = TreeModel::from_json(family, value).map_err(|e| serde_error(path, e))?;
                m.check().map_err(invalid)?;
                Ok(ModelEntry::Tree(m))
            }
        }
    }
}

impl Forecaster for ModelEntry {
    fn name(&self) -> &'static str {
        self.model().name()
    }

    fn predict_historical(&self, history: &History) -> Result<Prediction, ModelError> {
        self.model().predict_historical(history)
    }

    fn predict_future(&self, history: &History, dates: &[NaiveDate]) -> Result<Prediction, ModelError> {
        self.model().predict_future(history, dates)
    }
}

fn serde_error(path: &str, e: serde_json::Error) -> ModelError {
    let msg = e.to_string();
    match msg
        .strip_prefix("missing field `")
        .and_then(|rest| rest.split('`').next())
    {
        Some(field) => ModelError::MissingField {
            path: path.to_string(),
            field: field.to_string(),
        },
        None => ModelError::InvalidEntry {
            path: path.to_string(),
            message: msg,
        },
    }
}

/// Split `locacao_recife` / `recife_venda` style keys.
fn split_composite(key: &str) -> Option<(MarketType, City)> {
    let slug = slugify(key);
    slug.match_indices('_').find_map(|(i, _)| {
        let (a, b) = (&slug[..i], &slug[i + 1..]);
        match (MarketType::from_key(a), City::from_key(b)) {
            (Some(m), Some(c)) => Some((m, c)),
            _ => match (City::from_key(a), MarketType::from_key(b)) {
                (Some(c), Some(m)) => Some((m, c)),
                _ => None,
            },
        }
    })
}

/// An object, or the merge of a `[model, artifacts...]` array.
fn unwrap_tuple(value: &Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(m) => Some(m.clone()),
        Value::Array(items) => {
            let (first, rest) = items.split_first()?;
            let mut model = first.as_object()?.clone();
            for artifacts in rest.iter().filter_map(Value::as_object) {
                merge_missing(&mut model, artifacts);
            }
            Some(model)
        }
        _ => None,
    }
}

fn merge_missing(into: &mut Map<String, Value>, from: &Map<String, Value>) {
    for (k, v) in from {
        into.entry(k.clone()).or_insert_with(|| v.clone());
    }
}

type Families = BTreeMap<ModelFamily, Result<ModelEntry, ModelError>>;

#[derive(Debug, Clone, Default)]
pub struct ModelBundle {
    entries: BTreeMap<(MarketType, City), Families>,
    skipped: Vec<String>,
}

impl ModelBundle {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Unreadable(format!("{}: {e}", path.display())))?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| ModelError::Unreadable(format!("{}: {e}", path.display())))?;
        let bundle = Self::from_value(&value)?;
        debug!(
            "loaded bundle {}: {} city entries, {} skipped keys",
            path.display(),
            bundle.entries.len(),
            bundle.skipped.len()
        );
        Ok(bundle)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ModelError> {
        let value: Value = serde_json::from_str(text).map_err(|e| ModelError::Unreadable(e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn from_value(root: &Value) -> Result<Self, ModelError> {
        let Value::Object(top) = root else {
            return Err(ModelError::Unreadable("top level must be a JSON object".to_string()));
        };

        let mut bundle = Self::default();
        for (key, value) in top {
            if let Some(market) = MarketType::from_key(key) {
                bundle.read_market(market, key, value);
            } else if let Some((market, city)) = split_composite(key) {
                bundle.read_city(market, city, key, value, None);
            } else {
                bundle.skip(format!("unknown top-level key '{key}'"));
            }
        }
        Ok(bundle)
    }

    fn skip(&mut self, reason: String) {
        warn!("bundle: {reason}; skipped");
        self.skipped.push(reason);
    }

    fn insert(&mut self, market: MarketType, city: City, family: ModelFamily, entry: Result<ModelEntry, ModelError>) {
        if let Err(e) = &entry {
            warn!("bundle: {e}");
        }
        self.entries.entry((market, city)).or_default().insert(family, entry);
    }

    fn read_market(&mut self, market: MarketType, path: &str, value: &Value) {
        let Some(obj) = value.as_object() else {
            self.skip(format!("{path}: expected an object"));
            return;
        };
        for (key, inner) in obj {
            let p = format!("{path}/{key}");
            if let Some(family) = ModelFamily::from_key(key) {
                let Some(cities) = inner.as_object() else {
                    self.skip(format!("{p}: expected an object keyed by city"));
                    continue;
                };
                for (city_key, entry) in cities {
                    match City::from_key(city_key) {
                        Some(city) => self.read_city(market, city, &format!("{p}/{city_key}"), entry, Some(family)),
                        None => self.skip(format!("{p}/{city_key}: unknown city")),
                    }
                }
            } else if let Some(city) = City::from_key(key) {
                self.read_city(market, city, &p, inner, None);
            } else {
                self.skip(format!("{p}: neither a family nor a city"));
            }
        }
    }

    fn read_city(&mut self, market: MarketType, city: City, path: &str, value: &Value, hint: Option<ModelFamily>) {
        let Some(obj) = unwrap_tuple(value) else {
            let reason = format!("{path}: expected an object or [model, artifacts]");
            match hint {
                Some(family) => self.insert(
                    market,
                    city,
                    family,
                    Err(ModelError::InvalidEntry {
                        path: path.to_string(),
                        message: "expected an object or [model, artifacts]".to_string(),
                    }),
                ),
                None => self.skip(reason),
            }
            return;
        };

        if let Some(family) = hint {
            let entry = ModelEntry::from_json(path, family, &Value::Object(obj));
            self.insert(market, city, family, entry);
            return;
        }

        if let Some(name) = obj.get("family").and_then(Value::as_str) {
            match ModelFamily::from_key(name) {
                Some(family) => {
                    let entry = ModelEntry::from_json(path, family, &Value::Object(obj.clone()));
                    self.insert(market, city, family, entry);
                }
                None => self.skip(format!("{path}: unknown family '{name}'")),
            }
            return;
        }

        let models = match obj.get("models").and_then(Value::as_object) {
            Some(m) => m.clone(),
            None => obj.clone(),
        };
        let shared: Map<String, Value> = obj
            .iter()
            .filter(|(k, _)| k.as_str() != "models" && ModelFamily::from_key(k).is_none())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut found = false;
        for (key, model) in &models {
            let Some(family) = ModelFamily::from_key(key) else {
                continue;
            };
            found = true;
            let p = format!("{path}/{key}");
            let entry = match unwrap_tuple(model) {
                Some(mut m) => {
                    merge_missing(&mut m, &shared);
                    ModelEntry::from_json(&p, family, &Value::Object(m))
                }
                None => Err(ModelError::InvalidEntry {
                    path: p,
                    message: "expected an object or [model, artifacts]".to_string(),
                }),
            };
            self.insert(market, city, family, entry);
        }
        if !found {
            self.skip(format!("{path}: no model family found"));
        }
    }

    /// The model for `(market, city, family)`.
    pub fn get(&self, market: MarketType, city: City, family: ModelFamily) -> Result<&ModelEntry, ModelError> {
        let families = self.entries.get(&(market, city)).ok_or_else(|| ModelError::MissingEntry {
            market: market.file_kind().to_string(),
            city: city.label().to_string(),
        })?;
        match families.get(&family) {
            Some(Ok(entry)) => Ok(entry),
            Some(Err(e)) => Err(e.clone()),
            None => Err(ModelError::UnsupportedFamily {
                family: family.display_name().to_string(),
                key: format!("{}/{}", market.file_kind(), city.slug()),
                available: families.keys().map(|f| f.key()).collect::<Vec<_>>().join(", "),
            }),
        }
    }

    /// Families present for a market and city (valid or not).
    pub fn families(&self, market: MarketType, city: City) -> Vec<ModelFamily> {
        self.entries
            .get(&(market, city))
            .map(|f| f.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Every `(market, city, family)` with its load status.
    pub fn summary(&self) -> Vec<(MarketType, City, ModelFamily, Result<(), String>)> {
        self.entries
            .iter()
            .flat_map(|((market, city), families)| {
                families.iter().map(move |(family, entry)| {
                    (
                        *market,
                        *city,
                        *family,
                        entry.as_ref().map(|_| ()).map_err(|e| e.to_string()),
                    )
                })
            })
            .collect()
    }

    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! The observed data a model predicts over.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::domain::frame::{self, DataFrame};
use crate::domain::{FillPolicy, Series};

/// A city series reduced to the rows where the target is known.
#[derive(Debug, Clone, PartialEq)]
pub struct History {
    pub target: String,
    pub dates: Vec<NaiveDate>,
    pub actual: Vec<f64>,
    /// All loaded columns, row-aligned with `dates`.
    pub frame: DataFrame,
    /// How exogenous inputs are extended past the last observation.
    pub fill: FillPolicy,
}

impl History {
    pub fn from_series(series: &Series, target: &str, fill: FillPolicy) -> Result<Self, String> {
        let values = series
            .values(target)
            .ok_or_else(|| format!("target column '{target}' is missing or not numeric"))?;

        let keep: Vec<usize> = values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_some_and(f64::is_finite))
            .map(|(i, _)| i)
            .collect();
        let kept = series.take(&keep)?;

        Ok(Self {
            target: target.to_string(),
            actual: keep.iter().filter_map(|&i| values[i]).collect(),
            dates: kept.dates,
            frame: kept.frame,
            fill,
        })
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// A numeric column by exact name, falling back to a case-insensitive match.
    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        if let Some(v) = frame::real_values(&self.frame, name) {
            return Some(v);
        }
        let found = frame::column_names(&self.frame)
            .into_iter()
            .find(|c| c.eq_ignore_ascii_case(name))?;
        frame::real_values(&self.frame, &found)
    }
}

/// Training data a bundle ships alongside a model, used for exogenous inputs.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TrainingFrame {
    pub dates: Vec<NaiveDate>,
    #[serde(default)]
    pub columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl TrainingFrame {
    pub fn check(&self) -> Result<(), String> {
        for (name, values) in &self.columns {
            if values.len() != self.dates.len() {
                return Err(format!(
                    "training column '{name}' has {} values for {} dates",
                    values.len(),
                    self.dates.len()
                ));
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .get(name)
            .or_else(|| {
                self.columns
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .map(Vec::as_slice)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn value_at(&self, name: &str, date: NaiveDate) -> Option<f64> {
        let values = self.lookup(name)?;
        let i = self.dates.iter().position(|d| *d == date)?;
        values.get(i).copied().flatten()
    }

    pub fn last_value(&self, name: &str) -> Option<f64> {
        self.lookup(name)?.iter().rev().find_map(|v| *v)
    }
}

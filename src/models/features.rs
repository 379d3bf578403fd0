//! Named model inputs resolved against a history.
//!
//! A name is looked up, in order, as:
//! - a calendar feature derived from the date (`ano`, `mes`, `trimestre`, `t`)
//! - a column of the bundle's training frame (matched by date)
//! - a column of the loaded history frame
//!
//! The same precedence holds past the history: forward-fill carries the last
//! value of the column as resolved above. Names found nowhere are zero-filled
//! and reported as warnings.

use chrono::{Datelike, NaiveDate};
use nalgebra::DMatrix;

use crate::domain::FillPolicy;
use crate::models::history::{History, TrainingFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Calendar {
    Year,
    Month,
    Quarter,
    /// Months elapsed since the first training (or history) date.
    Index,
}

fn calendar(name: &str) -> Option<Calendar> {
    match name.trim().to_ascii_lowercase().as_str() {
        "ano" | "year" => Some(Calendar::Year),
        "mes" | "month" => Some(Calendar::Month),
        "trimestre" | "quarter" => Some(Calendar::Quarter),
        "t" | "time_index" | "t_index" => Some(Calendar::Index),
        _ => None,
    }
}

fn months_between(from: NaiveDate, to: NaiveDate) -> f64 {
    ((to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32) as f64
}

fn calendar_value(kind: Calendar, date: NaiveDate, anchor: NaiveDate) -> f64 {
    match kind {
        Calendar::Year => date.year() as f64,
        Calendar::Month => date.month() as f64,
        Calendar::Quarter => ((date.month() - 1) / 3 + 1) as f64,
        Calendar::Index => months_between(anchor, date),
    }
}

fn anchor(history: &History, training: Option<&TrainingFrame>) -> NaiveDate {
    training
        .and_then(|t| t.dates.first().copied())
        .or_else(|| history.dates.first().copied())
        .unwrap_or_default()
}

/// Values of `name` on every history date, or `None` when no source has it.
pub fn historical_column(
    name: &str,
    history: &History,
    training: Option<&TrainingFrame>,
) -> Option<Vec<Option<f64>>> {
    if let Some(kind) = calendar(name) {
        let a = anchor(history, training);
        return Some(history.dates.iter().map(|d| Some(calendar_value(kind, *d, a))).collect());
    }

    let in_training = training.filter(|t| t.has_column(name));
    let in_frame = history.column(name);
    if in_training.is_none() && in_frame.is_none() {
        return None;
    }

    Some(
        history
            .dates
            .iter()
            .enumerate()
            .map(|(i, d)| {
                in_training
                    .and_then(|t| t.value_at(name, *d))
                    .or_else(|| in_frame.as_ref().and_then(|v| v.get(i).copied().flatten()))
            })
            .collect(),
    )
}

/// Values of `name` on `dates` past the history, extended by `fill`.
pub fn future_column(
    name: &str,
    history: &History,
    training: Option<&TrainingFrame>,
    dates: &[NaiveDate],
    fill: FillPolicy,
) -> Option<Vec<Option<f64>>> {
    if let Some(kind) = calendar(name) {
        let a = anchor(history, training);
        return Some(dates.iter().map(|d| Some(calendar_value(kind, *d, a))).collect());
    }

    let resolved = historical_column(name, history, training)?;
    let value = match fill {
        FillPolicy::Zero => 0.0,
        FillPolicy::Ffill => resolved
            .into_iter()
            .rev()
            .flatten()
            .next()
            .or_else(|| training.and_then(|t| t.last_value(name)))
            .unwrap_or(0.0),
    };
    Some(vec![Some(value); dates.len()])
}

/// A feature matrix (rows = dates, columns = features). Unknown cells are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub values: DMatrix<f64>,
    pub warnings: Vec<String>,
}

fn assemble(features: &[String], rows: usize, mut column: impl FnMut(&str) -> Option<Vec<Option<f64>>>) -> FeatureMatrix {
    let mut warnings = Vec::new();
    let columns: Vec<Vec<Option<f64>>> = features
        .iter()
        .map(|name| {
            column(name).unwrap_or_else(|| {
                warnings.push(format!("feature '{name}' not found; filled with 0"));
                vec![Some(0.0); rows]
            })
        })
        .collect();

    let values = DMatrix::from_fn(rows, features.len(), |i, j| {
        columns[j].get(i).copied().flatten().unwrap_or(f64::NAN)
    });
    FeatureMatrix { values, warnings }
}

pub fn historical_matrix(features: &[String], history: &History, training: Option<&TrainingFrame>) -> FeatureMatrix {
    assemble(features, history.len(), |name| historical_column(name, history, training))
}

pub fn future_matrix(
    features: &[String],
    history: &History,
    training: Option<&TrainingFrame>,
    dates: &[NaiveDate],
) -> FeatureMatrix {
    assemble(features, dates.len(), |name| {
        future_column(name, history, training, dates, history.fill)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::frame::{frame_from, real_column, text_column};
    use crate::domain::{Series, DATE_COLUMN, PRICE_COLUMN};

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn history(fill: FillPolicy) -> History {
        let frame = frame_from(vec![
            text_column(DATE_COLUMN, vec![Some("2022-11-01".into()), Some("2022-12-01".into())]),
            real_column(PRICE_COLUMN, vec![Some(10.0), Some(11.0)]),
            real_column("IPCA", vec![Some(0.4), Some(0.6)]),
        ])
        .unwrap();
        History::from_series(&Series::from_frame(frame).unwrap(), PRICE_COLUMN, fill).unwrap()
    }

    #[test]
    fn calendar_features_are_derived() {
        let h = history(FillPolicy::Zero);
        let names: Vec<String> = ["ano", "Mes", "trimestre", "t"].iter().map(|s| s.to_string()).collect();
        let m = historical_matrix(&names, &h, None);
        assert_eq!(m.values.row(1).iter().copied().collect::<Vec<_>>(), vec![2022.0, 12.0, 4.0, 1.0]);

        let f = future_matrix(&names, &h, None, &[d(2023, 2)]);
        assert_eq!(f.values.row(0).iter().copied().collect::<Vec<_>>(), vec![2023.0, 2.0, 1.0, 3.0]);
        assert!(f.warnings.is_empty());
    }

    #[test]
    fn missing_features_are_zero_filled_with_warning() {
        let h = history(FillPolicy::Zero);
        let names = vec!["IPCA".to_string(), "Selic".to_string()];
        let m = historical_matrix(&names, &h, None);
        assert_eq!(m.values[(0, 0)], 0.4);
        assert_eq!(m.values[(1, 1)], 0.0);
        assert_eq!(m.warnings.len(), 1);
        assert!(m.warnings[0].contains("Selic"));
    }

    #[test]
    fn future_exogenous_values_follow_fill_policy() {
        let dates = [d(2023, 1), d(2023, 2)];
        assert_eq!(
            future_column("IPCA", &history(FillPolicy::Ffill), None, &dates, FillPolicy::Ffill).unwrap(),
            vec![Some(0.6), Some(0.6)]
        );
        assert_eq!(
            future_column("IPCA", &history(FillPolicy::Zero), None, &dates, FillPolicy::Zero).unwrap(),
            vec![Some(0.0), Some(0.0)]
        );
    }

    #[test]
    fn training_frame_takes_precedence_by_date() {
        let h = history(FillPolicy::Zero);
        let tf = TrainingFrame {
            dates: vec![d(2022, 11)],
            columns: [("IPCA".to_string(), vec![Some(9.9)])].into_iter().collect(),
        };
        // November comes from the training frame; December falls back to the history.
        assert_eq!(historical_column("IPCA", &h, Some(&tf)).unwrap(), vec![Some(9.9), Some(0.6)]);
    }

    #[test]
    fn forward_fill_uses_the_same_source_as_the_history() {
        let h = history(FillPolicy::Ffill);
        let tf = TrainingFrame {
            dates: vec![d(2022, 12)],
            columns: [("IPCA".to_string(), vec![Some(9.9)])].into_iter().collect(),
        };
        let past = historical_column("IPCA", &h, Some(&tf)).unwrap();
        assert_eq!(past, vec![Some(0.4), Some(9.9)]);

        // December resolves to the training frame, so that is what carries forward.
        let future = future_column("IPCA", &h, Some(&tf), &[d(2023, 1)], FillPolicy::Ffill).unwrap();
        assert_eq!(future, vec![past[1]]);
    }
}

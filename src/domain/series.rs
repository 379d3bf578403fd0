//! Date-indexed view over a `DataFrame`.

use std::collections::HashSet;

use chrono::NaiveDate;
use polars::prelude::{col, IntoLazy, JoinArgs, JoinType};

use crate::domain::frame::{self, DataFrame};
use crate::domain::types::DATE_COLUMN;
use crate::io::locale::parse_date;

/// Rows of a frame ordered by date. `dates[i]` belongs to row `i` of `frame`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub dates: Vec<NaiveDate>,
    pub frame: DataFrame,
}

impl Series {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse the `Data` column, drop rows whose date does not parse and sort
    /// ascending (stable, so same-date rows keep their stored order). `Data`
    /// is rewritten as ISO text so joins compare like with like.
    pub fn from_frame(frame: DataFrame) -> Result<Self, String> {
        let Some(raw) = frame::cells_as_text(&frame, DATE_COLUMN) else {
            return Ok(Self::empty());
        };

        let mut keyed: Vec<(NaiveDate, usize)> = raw
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_deref().and_then(parse_date).map(|d| (d, i)))
            .collect();
        keyed.sort_by_key(|(d, _)| *d);

        let indices: Vec<usize> = keyed.iter().map(|(_, i)| *i).collect();
        let dates: Vec<NaiveDate> = keyed.into_iter().map(|(d, _)| d).collect();
        let mut frame = frame::take_rows(&frame, &indices)?;
        frame::set_column(
            &mut frame,
            frame::text_column(DATE_COLUMN, dates.iter().map(|d| Some(d.format("%Y-%m-%d").to_string())).collect()),
        )?;
        Ok(Self { dates, frame })
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Numeric values of a column (None if absent or text).
    pub fn values(&self, column: &str) -> Option<Vec<Option<f64>>> {
        frame::real_values(&self.frame, column)
    }

    /// Last non-null value of a numeric column.
    pub fn last_value(&self, column: &str) -> Option<f64> {
        self.values(column)?.into_iter().rev().flatten().next()
    }

    /// Numeric columns worth charting: calendar helper columns are left out.
    pub fn metric_columns(&self) -> Vec<String> {
        frame::numeric_columns(&self.frame)
            .into_iter()
            .filter(|c| !matches!(c.as_str(), "Ano" | "Mes" | "Trimestre"))
            .collect()
    }

    /// Rows within `[from, to]` (either bound optional).
    pub fn between(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Series, String> {
        let mask: Vec<bool> = self
            .dates
            .iter()
            .map(|d| from.is_none_or(|f| *d >= f) && to.is_none_or(|t| *d <= t))
            .collect();
        Ok(Series {
            dates: self.dates.iter().zip(&mask).filter(|(_, keep)| **keep).map(|(d, _)| *d).collect(),
            frame: frame::filter_rows(&self.frame, &mask)?,
        })
    }

    /// Last `n` rows.
    pub fn tail(&self, n: usize) -> Series {
        let start = self.len().saturating_sub(n);
        Series {
            dates: self.dates[start..].to_vec(),
            frame: self.frame.tail(Some(n)),
        }
    }

    pub fn take(&self, indices: &[usize]) -> Result<Series, String> {
        Ok(Series {
            dates: indices.iter().filter_map(|&i| self.dates.get(i).copied()).collect(),
            frame: frame::take_rows(&self.frame, indices)?,
        })
    }

    /// Left join by date: every column of `other` not already present here is
    /// attached, null where `other` has no row for the date. When `other` has
    /// several rows for a date, the first one wins.
    pub fn join(&self, other: &Series) -> Result<Series, String> {
        let present = frame::column_names(&self.frame);
        let attach: Vec<String> = frame::column_names(&other.frame)
            .into_iter()
            .filter(|n| n == DATE_COLUMN || !present.contains(n))
            .collect();
        if attach.len() <= 1 || self.is_empty() {
            return Ok(self.clone());
        }

        let mut seen = HashSet::new();
        let first_rows: Vec<usize> = (0..other.len()).filter(|&i| seen.insert(other.dates[i])).collect();
        let right = frame::take_rows(&other.frame, &first_rows)?
            .select(attach)
            .map_err(|e| e.to_string())?;

        let joined = self
            .frame
            .clone()
            .lazy()
            .join(right.lazy(), [col(DATE_COLUMN)], [col(DATE_COLUMN)], JoinArgs::new(JoinType::Left))
            .collect()
            .map_err(|e| e.to_string())?;
        Series::from_frame(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::frame::{frame_from, real_column, text_column};

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn text(v: &[&str]) -> Vec<Option<String>> {
        v.iter().map(|s| Some(s.to_string())).collect()
    }

    #[test]
    fn from_frame_sorts_and_drops_bad_dates() {
        let frame = frame_from(vec![
            text_column(DATE_COLUMN, text(&["2022-03-01", "garbage", "01/01/2022"])),
            real_column("v", vec![Some(3.0), Some(9.0), Some(1.0)]),
        ])
        .unwrap();

        let s = Series::from_frame(frame).unwrap();
        assert_eq!(s.dates, vec![d(2022, 1), d(2022, 3)]);
        assert_eq!(s.values("v").unwrap(), vec![Some(1.0), Some(3.0)]);
        assert_eq!(
            frame::text_values(&s.frame, DATE_COLUMN).unwrap(),
            text(&["2022-01-01", "2022-03-01"])
        );
    }

    #[test]
    fn join_attaches_by_date() {
        let left = Series::from_frame(
            frame_from(vec![
                text_column(DATE_COLUMN, text(&["2022-01-01", "2022-02-01"])),
                real_column("IPCA", vec![Some(9.0), Some(9.0)]),
            ])
            .unwrap(),
        )
        .unwrap();
        let right = Series::from_frame(
            frame_from(vec![
                text_column(DATE_COLUMN, text(&["2022-02-01", "2022-02-01"])),
                real_column("Selic", vec![Some(0.5), Some(0.7)]),
                real_column("IPCA", vec![Some(1.0), Some(1.0)]),
            ])
            .unwrap(),
        )
        .unwrap();

        let joined = left.join(&right).unwrap();
        assert_eq!(joined.dates, vec![d(2022, 1), d(2022, 2)]);
        assert_eq!(joined.values("Selic").unwrap(), vec![None, Some(0.5)]);
        assert_eq!(joined.values("IPCA").unwrap(), vec![Some(9.0), Some(9.0)]);
    }

    #[test]
    fn views_filter_and_tail() {
        let s = Series::from_frame(
            frame_from(vec![
                text_column(DATE_COLUMN, text(&["2022-01-01", "2022-02-01", "2022-03-01"])),
                real_column("v", vec![Some(1.0), None, Some(3.0)]),
            ])
            .unwrap(),
        )
        .unwrap();

        let window = s.between(Some(d(2022, 2)), None).unwrap();
        assert_eq!(window.dates, vec![d(2022, 2), d(2022, 3)]);
        assert_eq!(window.values("v").unwrap(), vec![None, Some(3.0)]);

        let last = s.tail(1);
        assert_eq!(last.dates, vec![d(2022, 3)]);
        assert_eq!(last.last_value("v"), Some(3.0));
        assert_eq!(s.tail(10).len(), 3);
        assert_eq!(s.metric_columns(), vec!["v"]);
    }
}

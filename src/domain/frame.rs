//! Helpers over polars `DataFrame` for variable-schema source data.
//!
//! Source exports carry a handful of known columns plus whatever else the
//! spreadsheet had. Columns are either `Float64` (numeric) or `String`; the
//! helpers here read and write them as plain `Vec<Option<_>>` so the rest of
//! the crate does not deal with chunked arrays directly.

use polars::prelude::{BooleanChunked, Column, DataType, IdxCa, IdxSize, NewChunkedArray, PolarsError};

pub use polars::prelude::DataFrame;

fn msg(e: PolarsError) -> String {
    e.to_string()
}

pub fn real_column(name: &str, values: Vec<Option<f64>>) -> Column {
    Column::new(name.into(), values)
}

pub fn text_column(name: &str, values: Vec<Option<String>>) -> Column {
    Column::new(name.into(), values)
}

/// Build a frame; every column must have the same length.
pub fn frame_from(columns: Vec<Column>) -> Result<DataFrame, String> {
    DataFrame::new(columns).map_err(msg)
}

pub fn column_names(frame: &DataFrame) -> Vec<String> {
    frame.get_column_names().into_iter().map(|n| n.to_string()).collect()
}

pub fn has_column(frame: &DataFrame, name: &str) -> bool {
    frame.column(name).is_ok()
}

pub fn is_real(column: &Column) -> bool {
    matches!(column.dtype(), DataType::Float64)
}

/// Values of a numeric column (`None` if absent or text).
pub fn real_values(frame: &DataFrame, name: &str) -> Option<Vec<Option<f64>>> {
    let column = frame.column(name).ok()?;
    if !is_real(column) {
        return None;
    }
    Some(column.f64().ok()?.into_iter().collect())
}

/// Values of a text column (`None` if absent or numeric).
pub fn text_values(frame: &DataFrame, name: &str) -> Option<Vec<Option<String>>> {
    let column = frame.column(name).ok()?;
    if !matches!(column.dtype(), DataType::String) {
        return None;
    }
    Some(column.str().ok()?.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// Cells of any column rendered as text.
pub fn cells_as_text(frame: &DataFrame, name: &str) -> Option<Vec<Option<String>>> {
    let column = frame.column(name).ok()?;
    let text = column.cast(&DataType::String).ok()?;
    Some(text.str().ok()?.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// Names of `Float64` columns, in frame order.
pub fn numeric_columns(frame: &DataFrame) -> Vec<String> {
    frame
        .get_columns()
        .iter()
        .filter(|c| is_real(c))
        .map(|c| c.name().to_string())
        .collect()
}

/// Insert or replace a column in place.
pub fn set_column(frame: &mut DataFrame, column: Column) -> Result<(), String> {
    frame.with_column(column).map(|_| ()).map_err(msg)
}

/// Add (or replace) a text column holding `value` on every row.
pub fn set_constant_text(frame: &mut DataFrame, name: &str, value: Option<&str>) -> Result<(), String> {
    let height = frame.height();
    set_column(frame, text_column(name, vec![value.map(str::to_string); height]))
}

pub fn drop_column(frame: &mut DataFrame, name: &str) -> bool {
    frame.drop_in_place(name).is_ok()
}

pub fn rename_column(frame: &mut DataFrame, from: &str, to: &str) -> Result<(), String> {
    if from == to {
        return Ok(());
    }
    if has_column(frame, to) {
        return Err(format!("cannot rename '{from}' to '{to}': column already exists"));
    }
    frame.rename(from, to.into()).map(|_| ()).map_err(msg)
}

/// Move the named columns (those present) to the front, in the given order.
pub fn reorder_front(frame: &DataFrame, names: &[&str]) -> Result<DataFrame, String> {
    let mut order: Vec<String> = names
        .iter()
        .filter(|n| has_column(frame, n))
        .map(|n| n.to_string())
        .collect();
    for name in column_names(frame) {
        if !order.contains(&name) {
            order.push(name);
        }
    }
    frame.select(order).map_err(msg)
}

/// Rows at `indices`, in that order.
pub fn take_rows(frame: &DataFrame, indices: &[usize]) -> Result<DataFrame, String> {
    let idx = IdxCa::from_vec("idx".into(), indices.iter().map(|&i| i as IdxSize).collect());
    frame.take(&idx).map_err(msg)
}

/// Rows where `mask` is true.
pub fn filter_rows(frame: &DataFrame, mask: &[bool]) -> Result<DataFrame, String> {
    frame.filter(&BooleanChunked::from_slice("mask".into(), mask)).map_err(msg)
}

/// Stack frames, unioning columns by name.
///
/// A column missing from one frame is null there. A column that is numeric in
/// one frame and text in another is widened to text everywhere.
pub fn union_by_name(frames: Vec<DataFrame>) -> Result<DataFrame, String> {
    let mut schema: Vec<(String, DataType)> = Vec::new();
    for column in frames.iter().flat_map(|f| f.get_columns()) {
        let name = column.name().as_str();
        match schema.iter_mut().find(|(n, _)| n.as_str() == name) {
            Some((_, dtype)) if *dtype != *column.dtype() => *dtype = DataType::String,
            Some(_) => {}
            None => schema.push((name.to_string(), column.dtype().clone())),
        }
    }

    let mut out: Option<DataFrame> = None;
    for frame in frames {
        let columns = schema
            .iter()
            .map(|(name, dtype)| match frame.column(name) {
                Ok(c) => c.cast(dtype).map_err(msg),
                Err(_) => Ok(Column::full_null(name.as_str().into(), frame.height(), dtype)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let aligned = frame_from(columns)?;
        match out.as_mut() {
            None => out = Some(aligned),
            Some(acc) => {
                acc.vstack_mut(&aligned).map_err(msg)?;
            }
        }
    }
    Ok(out.unwrap_or_default())
}

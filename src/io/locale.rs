//! Brazilian-locale value parsing.
//!
//! Source spreadsheets format numbers as `1.234,56`, prefix currency with
//! `R$`, suffix `%`, and sometimes carry non-breaking spaces or typographic
//! dashes. Dates come in ISO or day-first forms.

use chrono::{Datelike, NaiveDate};

use polars::prelude::Column;

use crate::domain::frame::{real_column, text_column};

/// Minimum share of non-null values that must parse for a column to become numeric.
pub const COERCE_THRESHOLD: f64 = 0.6;

/// Parse a Brazilian-formatted number.
///
/// Only values ending in `,<digits>` have their dots treated as thousands
/// separators; `"1.234"` stays `1.234` (ambiguous input is not corrected).
pub fn parse_br_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .replace('\u{00A0}', " ")
        .replace("R$", "")
        .replace('%', "")
        .replace(['\u{2013}', '\u{2014}'], "-")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    let normalized = if has_decimal_comma(&cleaned) {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `true` when the value ends with a comma followed by at least one digit.
fn has_decimal_comma(s: &str) -> bool {
    let Some(pos) = s.rfind(',') else {
        return false;
    };
    let tail = &s[pos + 1..];
    !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit())
}

/// Coerce raw text cells into a `Float64` column when at least
/// [`COERCE_THRESHOLD`] of the non-null cells parse; otherwise keep text.
pub fn coerce_column(name: &str, values: Vec<Option<String>>) -> Column {
    let non_null = values.iter().filter(|v| v.is_some()).count();
    if non_null == 0 {
        return text_column(name, values);
    }

    let parsed: Vec<Option<f64>> = values
        .iter()
        .map(|v| v.as_deref().and_then(parse_br_number))
        .collect();
    let ok = parsed.iter().filter(|v| v.is_some()).count();

    if ok as f64 / non_null as f64 >= COERCE_THRESHOLD {
        real_column(name, parsed)
    } else {
        text_column(name, values)
    }
}

/// Parse a date in one of the formats seen in source exports.
///
/// A trailing time component (`2022-01-01 00:00:00`, `2022-01-01T00:00:00`) is
/// ignored. Month-only forms resolve to the first day of the month.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let s = s.split(['T', ' ']).next().unwrap_or(s);

    const FMTS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];
    for fmt in FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }

    // Month-only: `mm/yyyy` or `yyyy-mm`.
    const MONTH_FMTS: [&str; 2] = ["%d/%m/%Y", "%Y-%m-%d"];
    let candidates = [format!("01/{s}"), format!("{s}-01")];
    for (fmt, candidate) in MONTH_FMTS.iter().zip(candidates.iter()) {
        if let Ok(d) = NaiveDate::parse_from_str(candidate, fmt) {
            return Some(d);
        }
    }
    None
}

/// First day of the month containing `d`.
pub fn month_start(d: NaiveDate) -> NaiveDate {
    d.with_day(1).unwrap_or(d)
}

/// Month starts `m` with `start <= m <= end`.
pub fn month_starts_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    if start > end {
        return out;
    }
    let mut cur = month_start(start);
    if cur < start {
        cur = add_months(cur, 1);
    }
    while cur <= end {
        out.push(cur);
        cur = add_months(cur, 1);
    }
    out
}

/// Add `n` months to a first-of-month date.
pub fn add_months(d: NaiveDate, n: u32) -> NaiveDate {
    d.checked_add_months(chrono::Months::new(n)).unwrap_or(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::frame::is_real;

    #[test]
    fn parses_brazilian_numbers() {
        assert_eq!(parse_br_number("1.234,56"), Some(1234.56));
        assert_eq!(parse_br_number("12,5%"), Some(12.5));
        assert_eq!(parse_br_number("R$\u{00A0}3.100,00"), Some(3100.0));
        assert_eq!(parse_br_number("\u{2013}0,8"), Some(-0.8));
        assert_eq!(parse_br_number("abc"), None);
        assert_eq!(parse_br_number(""), None);
        assert_eq!(parse_br_number("   "), None);
    }

    #[test]
    fn dots_without_decimal_comma_are_left_alone() {
        assert_eq!(parse_br_number("1234"), Some(1234.0));
        assert_eq!(parse_br_number("1.234"), Some(1.234));
    }

    fn cells(v: &[&str]) -> Vec<Option<String>> {
        v.iter().map(|s| Some(s.to_string())).collect()
    }

    #[test]
    fn coerces_when_seventy_percent_parse() {
        let values = cells(&["1,0", "2,0", "3,0", "4,0", "5,0", "6,0", "7,0", "x", "y", "z"]);
        let column = coerce_column("v", values);
        assert!(is_real(&column));
        let v: Vec<Option<f64>> = column.f64().unwrap().into_iter().collect();
        assert_eq!(v[0], Some(1.0));
        assert_eq!(v[7], None);
        assert_eq!(v.iter().filter(|x| x.is_some()).count(), 7);
    }

    #[test]
    fn keeps_text_when_forty_percent_parse() {
        let values = cells(&["1,0", "2,0", "3,0", "4,0", "a", "b", "c", "d", "e", "f"]);
        assert!(!is_real(&coerce_column("v", values)));
    }

    #[test]
    fn nulls_do_not_count_against_threshold() {
        let mut values = cells(&["1,0", "2,0"]);
        values.extend([None, None, None]);
        assert!(is_real(&coerce_column("v", values)));
        assert!(!is_real(&coerce_column("v", vec![None, None])));
    }

    #[test]
    fn parses_common_date_forms() {
        let jan = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        assert_eq!(parse_date("2022-01-01"), Some(jan));
        assert_eq!(parse_date("01/01/2022"), Some(jan));
        assert_eq!(parse_date("2022-01-01 00:00:00"), Some(jan));
        assert_eq!(parse_date("01/2022"), Some(jan));
        assert_eq!(parse_date("2022-01"), Some(jan));
        assert_eq!(parse_date("31/02/2022"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn month_starts_follow_first_of_month_frequency() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert_eq!(
            month_starts_between(d(2022, 1, 1), d(2022, 3, 1)),
            vec![d(2022, 1, 1), d(2022, 2, 1), d(2022, 3, 1)]
        );
        assert_eq!(
            month_starts_between(d(2022, 1, 15), d(2022, 3, 10)),
            vec![d(2022, 2, 1), d(2022, 3, 1)]
        );
        assert!(month_starts_between(d(2022, 3, 1), d(2022, 1, 1)).is_empty());
    }
}

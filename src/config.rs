//! Runtime settings.
//!
//! Values come from the environment (a `.env` file in the working directory
//! is loaded first), then command-line flags override them. Every setting has
//! a default, so an empty environment is valid.
//!
//! | variable            | default              |
//! |---------------------|----------------------|
//! | `RW_DATA_DIR`       | `data`               |
//! | `RW_DB_PATH`        | `db/warehouse.db`    |
//! | `RW_BUNDLE`         | (none)               |
//! | `RW_CACHE_TTL_SECS` | `300`                |
//! | `RW_FORECAST_END`   | `2026-12-01`         |
//! | `RW_EXOG_FILL`      | `ffill`              |

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;

use crate::domain::FillPolicy;
use crate::error::AppError;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_DB_PATH: &str = "db/warehouse.db";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_FORECAST_END: &str = "2026-12-01";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub bundle_path: Option<PathBuf>,
    pub cache_ttl: Duration,
    /// Last month (inclusive) a forecast extends to.
    pub forecast_end: NaiveDate,
    pub exog_fill: FillPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            bundle_path: None,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            forecast_end: NaiveDate::from_ymd_opt(2026, 12, 1).unwrap_or_default(),
            exog_fill: FillPolicy::Ffill,
        }
    }
}

pub fn parse_fill(s: &str) -> Option<FillPolicy> {
    match s.trim().to_ascii_lowercase().as_str() {
        "zero" | "0" => Some(FillPolicy::Zero),
        "ffill" | "forward" => Some(FillPolicy::Ffill),
        _ => None,
    }
}

pub fn parse_end_date(s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::config(format!("Invalid forecast end date '{s}'. Expected YYYY-MM-DD.")))
}

impl Settings {
    /// Read `.env` (if present) and the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut s = Self::default();

        if let Some(v) = get("RW_DATA_DIR") {
            s.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("RW_DB_PATH") {
            s.db_path = PathBuf::from(v);
        }
        s.bundle_path = get("RW_BUNDLE").map(PathBuf::from);

        if let Some(v) = get("RW_CACHE_TTL_SECS") {
            let secs: u64 = v
                .trim()
                .parse()
                .map_err(|_| AppError::config(format!("RW_CACHE_TTL_SECS must be a whole number of seconds (got '{v}')")))?;
            s.cache_ttl = Duration::from_secs(secs);
        }
        s.forecast_end = parse_end_date(&get("RW_FORECAST_END").unwrap_or_else(|| DEFAULT_FORECAST_END.to_string()))?;
        if let Some(v) = get("RW_EXOG_FILL") {
            s.exog_fill =
                parse_fill(&v).ok_or_else(|| AppError::config(format!("RW_EXOG_FILL must be 'zero' or 'ffill' (got '{v}')")))?;
        }
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let s = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.forecast_end, NaiveDate::from_ymd_opt(2026, 12, 1).unwrap());
    }

    #[test]
    fn environment_overrides_defaults() {
        let s = Settings::from_lookup(lookup(&[
            ("RW_DB_PATH", "/tmp/w.db"),
            ("RW_BUNDLE", "models.json"),
            ("RW_CACHE_TTL_SECS", "5"),
            ("RW_EXOG_FILL", "zero"),
            ("RW_DATA_DIR", "  "),
        ]))
        .unwrap();
        assert_eq!(s.db_path, PathBuf::from("/tmp/w.db"));
        assert_eq!(s.bundle_path, Some(PathBuf::from("models.json")));
        assert_eq!(s.cache_ttl, Duration::from_secs(5));
        assert_eq!(s.exog_fill, FillPolicy::Zero);
        assert_eq!(s.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for pairs in [
            [("RW_CACHE_TTL_SECS", "soon")],
            [("RW_EXOG_FILL", "mean")],
            [("RW_FORECAST_END", "12/2026")],
        ] {
            let err = Settings::from_lookup(lookup(&pairs)).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::Config);
        }
    }
}

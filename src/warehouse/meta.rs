//! Sidecar build metadata (`warehouse_meta.json`).

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const META_FILE_NAME: &str = "warehouse_meta.json";

/// What the last build produced, for operator visibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseMeta {
    pub built_at: DateTime<Utc>,
    /// Rows per table name.
    pub rows: BTreeMap<String, usize>,
    /// Source files that were expected but not found.
    #[serde(default)]
    pub missing_sources: Vec<String>,
}

/// Metadata file path: next to the database file.
pub fn meta_path(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .map(|p| p.join(META_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(META_FILE_NAME))
}

pub fn write_meta(path: &Path, meta: &WarehouseMeta) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::storage(format!("Failed to create metadata '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, meta)
        .map_err(|e| AppError::storage(format!("Failed to write metadata: {e}")))?;
    Ok(())
}

pub fn read_meta(path: &Path) -> Result<WarehouseMeta, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::config(format!("Failed to open metadata '{}': {e}", path.display())))?;
    serde_json::from_reader(file).map_err(|e| AppError::storage(format!("Invalid metadata JSON: {e}")))
}

//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - market/city/table identifiers and the persisted column names (`types`)
//! - polars `DataFrame` helpers for variable-schema source data (`frame`)
//! - a date-indexed `Series` built on top of it (`series`)

pub mod frame;
pub mod series;
pub mod types;

pub use frame::*;
pub use series::*;
pub use types::*;

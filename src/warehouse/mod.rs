//! The SQLite warehouse.
//!
//! - full rebuild from source CSVs (`builder`)
//! - manual single/batch capture (`capture`)
//! - sidecar build metadata (`meta`)
//! - connection + table helpers (`store`)

pub mod builder;
pub mod capture;
pub mod meta;
pub mod store;

pub use builder::{build_warehouse, BuildReport, TableOutcome};
pub use capture::{insert_batch, insert_single, BatchCapture, CaptureOutcome, SingleCapture};
pub use meta::{meta_path, read_meta, WarehouseMeta};

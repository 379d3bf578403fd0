//! Terminal reports for every subcommand.
//!
//! Formatting lives in one place so:
//! - library modules return data, never printed text
//! - output changes are localized

pub mod format;

pub use format::*;

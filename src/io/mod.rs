//! Input/output helpers.
//!
//! - Brazilian-locale numbers and dates (`locale`)
//! - header normalization + semantic role matching (`columns`)
//! - `;`-delimited CSV ingest with encoding fallback (`ingest`)
//! - forecast exports (`export`)

pub mod columns;
pub mod export;
pub mod ingest;
pub mod locale;

pub use columns::*;
pub use export::*;
pub use ingest::*;
pub use locale::*;

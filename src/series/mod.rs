//! Cached series access over the warehouse.
//!
//! - TTL memoization keyed by call arguments (`cache`)
//! - graceful, cached table/city reads (`loader`)

pub mod cache;
pub mod loader;

pub use cache::TtlCache;
pub use loader::{Loaded, SeriesLoader};

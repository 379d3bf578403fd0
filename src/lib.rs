//! `realty-warehouse` library crate.
//!
//! The binary (`rw`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the warehouse, loader and forecast layers can be reused by other front-ends
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod io;
pub mod models;
pub mod report;
pub mod series;
pub mod session;
pub mod warehouse;

//! Command-line parsing for the real-estate warehouse.
//!
//! Argument parsing stays here; dispatch lives in `app`, and the work itself
//! in the library modules.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{FillPolicy, MarketType, ModelFamily};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "rw", version, about = "Real-estate price warehouse and forecasts")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Overrides for environment settings, accepted by every subcommand.
#[derive(Debug, Args, Clone, Default)]
pub struct GlobalArgs {
    /// Directory holding the source CSVs (overrides RW_DATA_DIR).
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Warehouse database file (overrides RW_DB_PATH).
    #[arg(long, global = true, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Model bundle JSON (overrides RW_BUNDLE).
    #[arg(long, global = true, value_name = "FILE")]
    pub bundle: Option<PathBuf>,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the last build's metadata and table sizes.
    Status,
    /// Rebuild the warehouse from the data directory.
    Build,
    /// List the cities stored for a market.
    Cities(MarketArgs),
    /// Print a city's monthly series.
    Series(SeriesArgs),
    /// List macro indicators, or print one indicator's series.
    Indicators(IndicatorArgs),
    /// Insert prices by hand.
    #[command(subcommand)]
    Capture(CaptureCommand),
    /// Forecast a city's series with a model from the bundle.
    Forecast(ForecastArgs),
    /// Inspect a model bundle: which markets, cities and families it covers.
    Bundle,
}

#[derive(Debug, Args, Clone)]
pub struct MarketArgs {
    /// Market: rental (locacao) or sale (venda).
    #[arg(short, long, value_enum, default_value_t = MarketType::Rental)]
    pub market: MarketType,
}

#[derive(Debug, Args, Clone)]
pub struct SeriesArgs {
    #[arg(short, long, value_enum, default_value_t = MarketType::Rental)]
    pub market: MarketType,

    /// City name or slug (e.g. "João Pessoa", joao_pessoa).
    #[arg(short, long)]
    pub city: String,

    /// Metric column to show (defaults to the average price per m²).
    #[arg(long)]
    pub metric: Option<String>,

    /// First date to show (YYYY-MM-DD).
    #[arg(long)]
    pub from: Option<String>,

    /// Last date to show (YYYY-MM-DD).
    #[arg(long)]
    pub to: Option<String>,

    /// Only the last N rows.
    #[arg(long)]
    pub tail: Option<usize>,

    /// Join the wide macro indicators by date.
    #[arg(long)]
    pub with_indicators: bool,

    /// List the available metric columns instead of printing values.
    #[arg(long)]
    pub list_metrics: bool,
}

#[derive(Debug, Args, Clone)]
pub struct IndicatorArgs {
    /// Indicator to print; lists the names when omitted.
    #[arg(short, long)]
    pub name: Option<String>,

    /// Only the last N rows.
    #[arg(long)]
    pub tail: Option<usize>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CaptureCommand {
    /// One price for one month.
    Single(SingleArgs),
    /// A constant or linearly ramped price over a month range. Existing rows
    /// for the city in that range are replaced.
    Batch(BatchArgs),
}

#[derive(Debug, Args, Clone)]
pub struct SingleArgs {
    #[arg(short, long, value_enum, default_value_t = MarketType::Rental)]
    pub market: MarketType,

    #[arg(short, long)]
    pub city: String,

    /// Date (YYYY-MM-DD).
    #[arg(short, long)]
    pub date: String,

    /// Price per m² (R$), > 0.
    #[arg(short, long)]
    pub price: f64,
}

#[derive(Debug, Args, Clone)]
pub struct BatchArgs {
    #[arg(short, long, value_enum, default_value_t = MarketType::Rental)]
    pub market: MarketType,

    #[arg(short, long)]
    pub city: String,

    /// First date (YYYY-MM-DD).
    #[arg(long)]
    pub start: String,

    /// Last date (YYYY-MM-DD).
    #[arg(long)]
    pub end: String,

    /// Base price; defaults to the last stored price for the city.
    #[arg(long)]
    pub base: Option<f64>,

    /// Total change spread linearly from the first to the last month.
    #[arg(long, allow_negative_numbers = true)]
    pub ramp: Option<f64>,
}

#[derive(Debug, Args, Clone)]
pub struct ForecastArgs {
    #[arg(short, long, value_enum, default_value_t = MarketType::Rental)]
    pub market: MarketType,

    #[arg(short, long)]
    pub city: String,

    /// Model family.
    #[arg(long, value_enum, default_value_t = ModelFamily::Prophet)]
    pub model: ModelFamily,

    /// Target column (defaults to the average price per m²).
    #[arg(long)]
    pub target: Option<String>,

    /// Last forecast month, YYYY-MM-DD (overrides RW_FORECAST_END).
    #[arg(long)]
    pub end: Option<String>,

    /// How exogenous inputs are extended into the future (overrides RW_EXOG_FILL).
    #[arg(long, value_enum)]
    pub fill: Option<FillPolicy>,

    /// Join the wide macro indicators into the history before predicting.
    #[arg(long)]
    pub with_indicators: bool,

    /// Write observed, fitted and forecast values to a CSV file.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,
}

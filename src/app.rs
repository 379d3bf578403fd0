//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - initializes logging
//! - parses CLI arguments and layers them over environment settings
//! - dispatches each subcommand against one `Session`
//! - prints reports and writes optional exports

use clap::Parser;

use crate::cli::{BatchArgs, CaptureCommand, Command, ForecastArgs, GlobalArgs, IndicatorArgs, SeriesArgs, SingleArgs};
use crate::config::{parse_end_date, Settings};
use crate::domain::{MarketType, PRICE_COLUMN};
use crate::error::AppError;
use crate::io::parse_date;
use crate::session::Session;
use crate::warehouse::{meta_path, read_meta, BatchCapture, SingleCapture, TableOutcome};

pub mod pipeline;

const SUBCOMMANDS: [&str; 9] = [
    "status", "build", "cities", "series", "indicators", "capture", "forecast", "bundle", "help",
];

/// Entry point for the `rw` binary.
pub fn run() -> Result<(), AppError> {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();

    // `rw` on its own (or with only global flags) shows the warehouse status.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    let settings = apply_overrides(Settings::from_env()?, &cli.global);
    let mut session = Session::new(settings);

    match cli.command {
        Command::Status => handle_status(&session),
        Command::Build => handle_build(&mut session),
        Command::Cities(args) => handle_cities(&mut session, args.market),
        Command::Series(args) => handle_series(&mut session, args),
        Command::Indicators(args) => handle_indicators(&mut session, args),
        Command::Capture(CaptureCommand::Single(args)) => handle_capture_single(&mut session, args),
        Command::Capture(CaptureCommand::Batch(args)) => handle_capture_batch(&mut session, args),
        Command::Forecast(args) => handle_forecast(&mut session, args),
        Command::Bundle => handle_bundle(&mut session),
    }
}

/// Command-line flags win over the environment.
pub fn apply_overrides(mut settings: Settings, global: &GlobalArgs) -> Settings {
    if let Some(dir) = &global.data_dir {
        settings.data_dir = dir.clone();
    }
    if let Some(db) = &global.db {
        settings.db_path = db.clone();
    }
    if let Some(bundle) = &global.bundle {
        settings.bundle_path = Some(bundle.clone());
    }
    settings
}

fn handle_status(session: &Session) -> Result<(), AppError> {
    let db = &session.settings().db_path;
    let meta_file = meta_path(db);
    let meta = if meta_file.is_file() { Some(read_meta(&meta_file)?) } else { None };
    print!("{}", crate::report::format_status(db, meta.as_ref()));
    Ok(())
}

fn handle_build(session: &mut Session) -> Result<(), AppError> {
    let report = session.build()?;
    print!("{}", crate::report::format_build_report(&report));

    let failed: Vec<String> = report
        .tables
        .iter()
        .filter(|(_, o)| matches!(o, TableOutcome::Failed { .. }))
        .map(|(t, _)| t.name().to_string())
        .collect();
    if !failed.is_empty() {
        return Err(AppError::storage(format!("Failed to write table(s): {}", failed.join(", "))));
    }
    Ok(())
}

fn handle_cities(session: &mut Session, market: MarketType) -> Result<(), AppError> {
    let loaded = session.loader().cities(market.table())?;
    print!("{}", crate::report::format_list(&format!("Cities in {}", market.table()), &loaded.value));
    Ok(())
}

fn parse_bound(s: Option<&str>) -> Result<Option<chrono::NaiveDate>, AppError> {
    s.map(|raw| parse_date(raw).ok_or_else(|| AppError::validation(format!("Invalid date '{raw}'."))))
        .transpose()
}

fn handle_series(session: &mut Session, args: SeriesArgs) -> Result<(), AppError> {
    let (series, _) = pipeline::city_series(session, args.market, &args.city, args.with_indicators)?;
    let title = format!("{} / {}", args.market.label(), pipeline::city_label(&args.city));

    if args.list_metrics {
        print!("{}", crate::report::format_list(&format!("Metrics for {title}"), &series.metric_columns()));
        return Ok(());
    }
    if series.is_empty() {
        println!("{title}: no data");
        return Ok(());
    }

    let metric = args.metric.as_deref().unwrap_or(PRICE_COLUMN);
    if series.values(metric).is_none() {
        return Err(AppError::validation(format!(
            "'{metric}' is not a numeric column here. Available: {}",
            series.metric_columns().join(", ")
        )));
    }

    let from = parse_bound(args.from.as_deref())?;
    let to = parse_bound(args.to.as_deref())?;
    let mut view = series.between(from, to).map_err(AppError::storage)?;
    if let Some(n) = args.tail {
        view = view.tail(n);
    }
    print!("{}", crate::report::format_series(&title, &view, metric));
    Ok(())
}

fn handle_indicators(session: &mut Session, args: IndicatorArgs) -> Result<(), AppError> {
    let Some(name) = args.name else {
        let names = session.loader().indicator_names()?;
        print!("{}", crate::report::format_list("Indicators", &names.value));
        return Ok(());
    };

    let wide = session.loader().indicators_wide()?.value;
    if wide.is_empty() {
        println!("No indicator data.");
        return Ok(());
    }
    if wide.values(&name).is_none() {
        return Err(AppError::validation(format!(
            "Unknown indicator '{name}'. Available: {}",
            wide.metric_columns().join(", ")
        )));
    }
    let view = match args.tail {
        Some(n) => wide.tail(n),
        None => wide,
    };
    print!("{}", crate::report::format_series(&name, &view, &name));
    Ok(())
}

fn handle_capture_single(session: &mut Session, args: SingleArgs) -> Result<(), AppError> {
    let outcome = session.capture_single(&SingleCapture {
        market: args.market,
        city: args.city,
        date: args.date,
        price: args.price,
    })?;
    print!("{}", crate::report::format_capture(&outcome));
    Ok(())
}

fn handle_capture_batch(session: &mut Session, args: BatchArgs) -> Result<(), AppError> {
    let base_price = match args.base {
        Some(b) => b,
        None => session.last_price(args.market, &args.city)?.ok_or_else(|| {
            AppError::validation(format!(
                "No stored price for '{}' in {}; pass --base.",
                args.city,
                args.market.table()
            ))
        })?,
    };
    let outcome = session.capture_batch(&BatchCapture {
        market: args.market,
        city: args.city,
        start: args.start,
        end: args.end,
        base_price,
        ramp_total: args.ramp,
    })?;
    print!("{}", crate::report::format_capture(&outcome));
    Ok(())
}

fn handle_forecast(session: &mut Session, args: ForecastArgs) -> Result<(), AppError> {
    let end = match &args.end {
        Some(s) => parse_end_date(s)?,
        None => session.forecast_end(),
    };
    let request = pipeline::ForecastRequest {
        market: args.market,
        city: args.city,
        family: args.model,
        target: args.target.unwrap_or_else(|| PRICE_COLUMN.to_string()),
        end,
        fill: args.fill.unwrap_or(session.settings().exog_fill),
        with_indicators: args.with_indicators,
    };
    let run = pipeline::forecast(session, &request)?;
    print!("{}", crate::report::format_forecast(&run.title, &run.outcome));

    if let Some(path) = &args.export {
        crate::io::export::write_forecast_csv(path, &run.outcome)?;
        println!("Exported to {}", path.display());
    }
    Ok(())
}

fn handle_bundle(session: &mut Session) -> Result<(), AppError> {
    let path = session
        .settings()
        .bundle_path
        .clone()
        .ok_or_else(|| AppError::config("No model bundle configured. Set RW_BUNDLE or pass --bundle."))?;
    let bundle = session.bundle()?;
    print!("{}", crate::report::format_bundle(&path, bundle));
    Ok(())
}

/// Rewrite argv so `rw` defaults to `rw status`.
///
/// Rules:
/// - `rw`                      -> `rw status`
/// - `rw --db w.db`            -> `rw --db w.db status`
/// - `rw --help/--version/-h`  -> unchanged
/// - anything naming a subcommand -> unchanged
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let has_command_or_help = argv.iter().skip(1).any(|a| {
        SUBCOMMANDS.contains(&a.as_str()) || matches!(a.as_str(), "-h" | "--help" | "-V" | "--version")
    });
    if !has_command_or_help {
        argv.push("status".to_string());
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_invocation_defaults_to_status() {
        assert_eq!(rewrite_args(args(&["rw"])), args(&["rw", "status"]));
        assert_eq!(rewrite_args(args(&["rw", "--db", "w.db"])), args(&["rw", "--db", "w.db", "status"]));
        assert_eq!(rewrite_args(args(&["rw", "--db", "w.db", "build"])), args(&["rw", "--db", "w.db", "build"]));
        assert_eq!(rewrite_args(args(&["rw", "--help"])), args(&["rw", "--help"]));
    }

    #[test]
    fn flags_override_environment() {
        let global = GlobalArgs {
            data_dir: None,
            db: Some(PathBuf::from("other.db")),
            bundle: Some(PathBuf::from("b.json")),
        };
        let s = apply_overrides(Settings::default(), &global);
        assert_eq!(s.db_path, PathBuf::from("other.db"));
        assert_eq!(s.bundle_path, Some(PathBuf::from("b.json")));
        assert_eq!(s.data_dir, Settings::default().data_dir);
    }
}

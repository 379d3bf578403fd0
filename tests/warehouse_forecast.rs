//! End to end: source CSVs -> warehouse -> capture -> forecast -> export.

use std::path::Path;

use approx::assert_relative_eq;
use chrono::NaiveDate;
use realty_warehouse::app::pipeline::{self, ForecastRequest};
use realty_warehouse::config::Settings;
use realty_warehouse::domain::{FillPolicy, MarketType, ModelFamily, Table, PRICE_COLUMN};
use realty_warehouse::error::ErrorKind;
use realty_warehouse::forecast::MetricsOutcome;
use realty_warehouse::io::export::write_forecast_csv;
use realty_warehouse::session::Session;
use realty_warehouse::warehouse::{store, BatchCapture, TableOutcome};

fn d(y: i32, m: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, 1).unwrap()
}

fn write_sources(data: &Path) {
    std::fs::create_dir_all(data).unwrap();
    std::fs::write(
        data.join("dados_locacao_recife_tratado.csv"),
        "Data;Preço médio (R$/m²)Total;Amostras\n\
         01/01/2022;50,0;10\n\
         01/02/2022;53,0;12\n\
         2022-03-01;56,0;9\n\
         2022-04-01;59,0;11\n\
         sem data;1,0;1\n",
    )
    .unwrap();
    std::fs::write(
        data.join("dados_vendas_natal_tratados.csv"),
        "Data;preço médio\n2022-01-01;7.500,25\n",
    )
    .unwrap();
    std::fs::write(
        data.join("dados_banco_central.csv"),
        "Data;Indicador;Media;Mediana\n\
         2022-01-01;selic;10,0;10,0\n\
         2022-02-01;selic;11,0;11,0\n\
         2022-03-01;selic;12,0;12,0\n\
         2022-04-01;selic;13,0;13,0\n",
    )
    .unwrap();
}

fn session(root: &Path, bundle: Option<&Path>) -> Session {
    Session::new(Settings {
        data_dir: root.join("data"),
        db_path: root.join("db").join("warehouse.db"),
        bundle_path: bundle.map(Path::to_path_buf),
        ..Settings::default()
    })
}

fn request(family: ModelFamily, with_indicators: bool) -> ForecastRequest {
    ForecastRequest {
        market: MarketType::Rental,
        city: "recife".into(),
        family,
        target: PRICE_COLUMN.into(),
        end: d(2022, 6),
        fill: FillPolicy::Ffill,
        with_indicators,
    }
}

#[test]
fn build_is_idempotent_and_indexes_tables() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(&dir.path().join("data"));
    let mut s = session(dir.path(), None);

    let first = s.build().unwrap();
    let second = s.build().unwrap();
    for report in [&first, &second] {
        assert_eq!(report.rows_written(Table::Rental), Some(4));
        assert_eq!(report.rows_written(Table::Sale), Some(1));
        assert_eq!(report.rows_written(Table::Indicators), Some(4));
        assert_eq!(report.rows_written(Table::IndicatorsWide), Some(4));
        assert!(!report.is_complete(), "most city files are missing");
    }
    assert!(
        second
            .tables
            .iter()
            .all(|(_, o)| matches!(o, TableOutcome::Written { .. }))
    );

    let conn = store::open_ro(&s.settings().db_path).unwrap().unwrap();
    assert!(store::index_names(&conn, "locacao").unwrap().contains(&"idx_locacao".to_string()));
    assert!(store::index_names(&conn, "vendas").unwrap().contains(&"idx_vendas".to_string()));
    assert!(store::index_names(&conn, "bcb").unwrap().contains(&"idx_bcb".to_string()));

    let meta = second.meta.as_ref().unwrap();
    assert_eq!(meta.rows.get("locacao"), Some(&4));
    assert!(second.meta_path.is_file());

    assert_eq!(s.last_price(MarketType::Sale, "natal").unwrap(), Some(7500.25));
}

#[test]
fn batch_capture_replaces_the_month_range() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(&dir.path().join("data"));
    let mut s = session(dir.path(), None);
    s.build().unwrap();

    let outcome = s
        .capture_batch(&BatchCapture {
            market: MarketType::Rental,
            city: "Recife".into(),
            start: "2022-01-01".into(),
            end: "2022-03-01".into(),
            base_price: 1000.0,
            ramp_total: Some(60.0),
        })
        .unwrap();
    assert_eq!(outcome.inserted, 3);
    assert_eq!(outcome.deleted, 3);

    let series = s.loader().load(Table::Rental, "Recife").unwrap().value;
    assert_eq!(series.len(), 4);
    let prices: Vec<f64> = series.values(PRICE_COLUMN).unwrap().iter().map(|v| v.unwrap()).collect();
    assert_eq!(prices, vec![1000.0, 1030.0, 1060.0, 59.0]);
}

#[test]
fn unbuilt_warehouse_reads_as_empty_with_warning() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path(), None);
    let loaded = s.loader().load(Table::Rental, "Recife").unwrap();
    assert!(loaded.value.is_empty());
    assert!(loaded.warning.unwrap().contains("rw build"));

    let err = pipeline::forecast(&mut s, &request(ModelFamily::Arima, false)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PartialData);
}

#[test]
fn arima_forecast_continues_from_the_last_level() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(&dir.path().join("data"));
    let bundle = dir.path().join("bundle.json");
    std::fs::write(&bundle, r#"{"locacao": {"recife": {"sarima": {"ar": [0.5], "d": 1}}}}"#).unwrap();

    let mut s = session(dir.path(), Some(&bundle));
    s.build().unwrap();
    let run = pipeline::forecast(&mut s, &request(ModelFamily::Arima, false)).unwrap();

    assert_eq!(run.title, "Locação / Recife");
    assert_eq!(run.outcome.future_dates, vec![d(2022, 5), d(2022, 6)]);
    assert_relative_eq!(run.outcome.future[0], 60.5);
    assert_relative_eq!(run.outcome.future[1], 61.25);
    assert_eq!(run.outcome.historical.len(), 4);
}

#[test]
fn linear_model_uses_joined_indicators_and_exports() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(&dir.path().join("data"));
    let bundle = dir.path().join("bundle.json");
    std::fs::write(
        &bundle,
        r#"{"locacao": {"recife": {"elastic_net": {
            "features": ["t", "selic"], "coef": [2.0, 1.0], "intercept": 40.0
        }}}}"#,
    )
    .unwrap();

    let mut s = session(dir.path(), Some(&bundle));
    s.build().unwrap();
    let run = pipeline::forecast(&mut s, &request(ModelFamily::ElasticNet, true)).unwrap();

    assert_eq!(run.outcome.historical, vec![50.0, 53.0, 56.0, 59.0]);
    let MetricsOutcome::Computed(m) = &run.outcome.metrics else {
        panic!("metrics should be computed");
    };
    assert_relative_eq!(m.mae, 0.0);
    assert_relative_eq!(m.r2, 1.0);

    // selic carried forward at 13.
    assert_eq!(run.outcome.future, vec![61.0, 63.0]);
    assert!(run.outcome.warnings.is_empty());

    let out = dir.path().join("forecast.csv");
    write_forecast_csv(&out, &run.outcome).unwrap();
    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.starts_with("Data;kind;actual;fitted;forecast\n"));
    assert!(text.contains("2022-06-01;forecast;;;63.0000"));
}

#[test]
fn absent_family_is_a_model_error() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(&dir.path().join("data"));
    let bundle = dir.path().join("bundle.json");
    std::fs::write(&bundle, r#"{"locacao": {"recife": {"arima": {"ar": [0.5]}}}}"#).unwrap();

    let mut s = session(dir.path(), Some(&bundle));
    s.build().unwrap();
    let err = pipeline::forecast(&mut s, &request(ModelFamily::Prophet, false)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Model);
    assert!(err.message().contains("arima"));

    let mut unknown = request(ModelFamily::Arima, false);
    unknown.city = "Curitiba".into();
    let err = pipeline::forecast(&mut s, &unknown).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

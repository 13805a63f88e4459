use std::path::PathBuf;

use chrono::{NaiveDate, TimeZone, Utc};
use se3_pipeline::{
    read_raw_table, write_table_csv, CsvTableSource, FetchWindow, Pipeline, PipelineConfig,
    RawTimestamp, TableSource, TimestampNormalizer,
};
use tempfile::tempdir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

#[test]
fn market_fixture_parses_missing_markers() {
    let raw = read_raw_table(fixture("market_sample.csv"), "market").expect("fixture parses");

    assert_eq!(raw.len(), 10);
    assert!(raw
        .timestamps()
        .iter()
        .all(|ts| matches!(ts, RawTimestamp::Naive(_))));
    let names: Vec<&str> = raw.columns().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["price", "load_forecast", "wind_forecast", "solar_forecast"]
    );
    assert_eq!(raw.columns()[0].values[6], None);
    assert_eq!(raw.columns()[1].values[7], None);
}

#[test]
fn autumn_fold_rows_map_to_consecutive_utc_hours() {
    let raw = read_raw_table(fixture("market_sample.csv"), "market").expect("fixture parses");
    let (table, report) = TimestampNormalizer::new(chrono_tz::Europe::Stockholm).normalize(raw);

    assert_eq!(report.ambiguous_resolved, 2);
    assert_eq!(report.duplicates_dropped, 1);
    assert_eq!(report.invalid_timestamps, 0);
    assert_eq!(table.len(), 9);
    assert_eq!(
        table.timestamps()[0],
        Utc.with_ymd_and_hms(2024, 10, 26, 20, 0, 0).unwrap()
    );
    assert_eq!(
        table.timestamps()[4],
        Utc.with_ymd_and_hms(2024, 10, 27, 0, 0, 0).unwrap()
    );
    assert_eq!(table.value_at("price", 4), Some(38.5));
    assert_eq!(table.value_at("price", 5), Some(37.9));
    // First occurrence of 05:00 wins.
    assert_eq!(table.value_at("price", 8), Some(37.5));
}

#[test]
fn full_run_over_fixtures_is_gap_free() {
    let market = read_raw_table(fixture("market_sample.csv"), "market").expect("market parses");
    let weather =
        read_raw_table(fixture("weather_sample.csv"), "weather").expect("weather parses");
    let pipeline = Pipeline::new(PipelineConfig::default()).expect("default config is valid");

    let output = pipeline.run(market, Some(weather)).expect("run succeeds");

    assert_eq!(output.cleaned.len(), 9);
    for column in output.cleaned.columns() {
        assert_eq!(column.missing_count(), 0, "{} has gaps", column.name);
    }
    let bridged = output.cleaned.value_at("temperature_avg", 5).unwrap();
    assert!((bridged - 5.5).abs() < 1e-9);
    assert_eq!(output.cleaned.value_at("price", 6), Some(37.9 + (36.0 - 37.9) / 2.0));
    assert!(output.features.table.has_column("temp_load_interaction"));
    assert!(output.features.table.has_column("wind_efficiency"));
    assert!(output.report.features.skipped.is_empty());
}

#[test]
fn csv_source_filters_by_source_wall_date() {
    let source = CsvTableSource::new("market", fixture("market_sample.csv"));
    let window = FetchWindow::new(date(2024, 10, 27), date(2024, 10, 28)).unwrap();

    let raw = source.fetch(&window).expect("fetch succeeds");
    assert_eq!(source.name(), "market");
    assert_eq!(raw.len(), 8);
    assert!(raw
        .timestamps()
        .iter()
        .all(|ts| ts.wall_date() == date(2024, 10, 27)));
}

#[test]
fn missing_file_is_an_io_error() {
    let source = CsvTableSource::new("market", "/nonexistent/market.csv");
    let window = FetchWindow::new(date(2024, 1, 1), date(2024, 1, 2)).unwrap();
    let err = source.fetch(&window).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/market.csv"));
}

#[test]
fn exported_table_reads_back_to_the_same_instants() {
    let market = read_raw_table(fixture("market_sample.csv"), "market").expect("market parses");
    let pipeline = Pipeline::new(PipelineConfig::default()).expect("default config is valid");
    let output = pipeline.run(market, None).expect("run succeeds");

    let dir = tempdir().unwrap();
    let path = dir.path().join("cleaned.csv");
    write_table_csv(&output.cleaned, &path, chrono_tz::Europe::Stockholm).unwrap();

    let reread = read_raw_table(&path, "export").expect("export parses");
    assert!(reread
        .timestamps()
        .iter()
        .all(|ts| matches!(ts, RawTimestamp::Aware(_))));
    let (table, report) = TimestampNormalizer::new(chrono_tz::UTC).normalize(reread);
    assert_eq!(report.duplicates_dropped, 0);
    assert_eq!(table, output.cleaned);
}

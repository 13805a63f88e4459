use chrono::{Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use se3_pipeline::{
    repair_strategy, Column, ContinuityEnforcer, GapRepairer, InterpolationMethod, Pipeline,
    PipelineConfig, RawTable, RawTimestamp, RepairStrategy, TimeSeriesTable, TimestampNormalizer,
};

fn jan_first(hour: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .expect("valid date")
        .and_hms_opt(0, 0, 0)
        .expect("valid time")
        + Duration::hours(hour)
}

/// Naive Stockholm wall-clock rows at the given hour offsets.
fn market(hours: &[i64], columns: Vec<(&str, Vec<Option<f64>>)>) -> RawTable {
    let timestamps = hours
        .iter()
        .map(|h| RawTimestamp::Naive(jan_first(*h)))
        .collect();
    let columns = columns
        .into_iter()
        .map(|(name, values)| Column::new(name, values))
        .collect();
    RawTable::new("market", timestamps, columns).expect("well-formed market table")
}

fn present_hours(missing: std::ops::RangeInclusive<i64>) -> Vec<i64> {
    (0..=10).filter(|h| !missing.contains(h)).collect()
}

fn price_at(hour: i64) -> f64 {
    // Deliberately non-linear so interpolation and forward-fill disagree.
    match hour {
        2 => 20.0,
        6 => 60.0,
        10 => 100.0,
        h => 10.0 + (h * h) as f64,
    }
}

fn run_price_series(hours: &[i64], prices: Vec<Option<f64>>) -> TimeSeriesTable {
    let pipeline = Pipeline::new(PipelineConfig::default()).expect("default config is valid");
    pipeline
        .run(market(hours, vec![("price", prices)]), None)
        .expect("pipeline run succeeds")
        .cleaned
}

#[test]
fn three_hour_gap_is_interpolated_between_bounding_values() {
    let hours = present_hours(3..=5);
    let prices = hours.iter().map(|h| Some(price_at(*h))).collect();
    let cleaned = run_price_series(&hours, prices);

    assert_eq!(cleaned.len(), 11);
    let values = cleaned.column_values("price").expect("price column");
    assert_eq!(values[2], Some(20.0));
    assert_eq!(values[3], Some(30.0));
    assert_eq!(values[4], Some(40.0));
    assert_eq!(values[5], Some(50.0));
    assert_eq!(values[6], Some(60.0));
}

#[test]
fn seven_hour_gap_is_forward_filled_from_last_observation() {
    let hours = present_hours(3..=9);
    let prices = hours.iter().map(|h| Some(price_at(*h))).collect();
    let cleaned = run_price_series(&hours, prices);

    assert_eq!(cleaned.len(), 11);
    let values = cleaned.column_values("price").expect("price column");
    for row in 3..=9 {
        assert_eq!(values[row], Some(20.0), "row {row} should carry the 02:00 value");
    }
    assert_eq!(values[10], Some(100.0));
}

#[test]
fn implausible_price_is_nulled_then_repaired() {
    let hours: Vec<i64> = (0..=10).collect();
    let mut prices: Vec<Option<f64>> = hours.iter().map(|h| Some(10.0 * *h as f64)).collect();
    prices[5] = Some(5_000.0);

    let pipeline = Pipeline::new(PipelineConfig::default()).expect("default config is valid");
    let output = pipeline
        .run(market(&hours, vec![("price", prices)]), None)
        .expect("pipeline run succeeds");

    assert_eq!(output.cleaned.value_at("price", 5), Some(50.0));
    assert_eq!(output.report.cleaning.range.total_invalidated(), 1);
    let price_repair = output
        .report
        .cleaning
        .repair
        .column("price")
        .expect("price repair report");
    assert_eq!(price_repair.interpolated, 1);
    assert_eq!(price_repair.forward_filled, 0);
}

#[test]
fn threshold_boundary_switches_strategy() {
    assert_eq!(
        repair_strategy(6, 6, InterpolationMethod::Linear),
        RepairStrategy::Interpolate(InterpolationMethod::Linear)
    );
    assert_eq!(
        repair_strategy(7, 6, InterpolationMethod::Linear),
        RepairStrategy::ForwardFill
    );

    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let timestamps = (0..9).map(|h| start + Duration::hours(h)).collect();
    let mut values = vec![None; 9];
    values[0] = Some(0.0);
    values[7] = Some(70.0);
    values[8] = Some(80.0);
    let mut table =
        TimeSeriesTable::new(timestamps, vec![Column::new("price", values)]).unwrap();

    let report = GapRepairer::new(6, InterpolationMethod::Linear).repair(&mut table);
    let bridged = table.value_at("price", 3).expect("interpolated value");
    assert!((bridged - 30.0).abs() < 1e-9);
    assert_eq!(report.total_interpolated(), 6);
    assert_eq!(report.total_forward_filled(), 0);
}

#[test]
fn continuity_yields_one_row_per_hour_between_extremes() {
    let normalizer = TimestampNormalizer::new(chrono_tz::Europe::Stockholm);
    for hours in [vec![0, 1, 2], vec![0, 5], vec![3, 4, 9, 30, 31], vec![12]] {
        let raw = market(&hours, vec![("price", vec![Some(1.0); hours.len()])]);
        let (table, _) = normalizer.normalize(raw);
        let (grid, _) = ContinuityEnforcer::new().enforce(&table).unwrap();

        let span = hours.last().unwrap() - hours.first().unwrap();
        assert_eq!(grid.len() as i64, span + 1);
        assert!(grid
            .timestamps()
            .windows(2)
            .all(|pair| pair[1] - pair[0] == Duration::hours(1)));
    }
}

#[test]
fn normalizer_is_idempotent_on_duplicate_free_input() {
    let normalizer = TimestampNormalizer::new(chrono_tz::Europe::Stockholm);
    let raw = market(
        &[5, 1, 3, 2],
        vec![("price", vec![Some(5.0), Some(1.0), None, Some(2.0)])],
    );

    let (once, _) = normalizer.normalize(raw);
    let (twice, report) = normalizer.normalize(RawTable::from(once.clone()));
    assert_eq!(once, twice);
    assert_eq!(report.duplicates_dropped, 0);
}

#[test]
fn repair_leaves_no_nulls_in_columns_with_data() {
    let hours: Vec<i64> = vec![0, 1, 4, 12, 13];
    let raw = market(
        &hours,
        vec![
            ("price", vec![None, Some(30.0), None, Some(35.0), None]),
            ("load_forecast", vec![Some(1_000.0), None, None, None, Some(1_100.0)]),
        ],
    );
    let pipeline = Pipeline::new(PipelineConfig::default()).expect("default config is valid");
    let output = pipeline.run(raw, None).expect("pipeline run succeeds");

    for column in output.cleaned.columns() {
        assert_eq!(column.missing_count(), 0, "{} still has gaps", column.name);
    }
}

fn populated_market(rows: usize) -> (Vec<i64>, Vec<(&'static str, Vec<Option<f64>>)>) {
    let hours: Vec<i64> = (0..rows as i64).collect();
    let wave = |base: f64, amp: f64| -> Vec<Option<f64>> {
        hours
            .iter()
            .map(|h| Some(base + amp * ((*h as f64) * std::f64::consts::PI / 12.0).sin()))
            .collect()
    };
    let columns = vec![
        ("price", wave(45.0, 15.0)),
        ("load_forecast", wave(12_000.0, 2_000.0)),
        ("wind_forecast", wave(2_500.0, 800.0)),
        ("solar_forecast", wave(300.0, 100.0)),
    ];
    (hours, columns)
}

#[test]
fn clean_continuous_input_passes_through_unchanged() {
    let (hours, columns) = populated_market(48);
    let raw = market(&hours, columns.clone());
    let pipeline = Pipeline::new(PipelineConfig::default()).expect("default config is valid");
    let output = pipeline.run(raw, None).expect("pipeline run succeeds");

    assert_eq!(output.cleaned.len(), 48);
    for (name, values) in &columns {
        assert_eq!(output.cleaned.column_values(name).unwrap(), values.as_slice());
        assert_eq!(output.features.table.column_values(name).unwrap(), values.as_slice());
    }
    assert_eq!(output.report.cleaning.outliers.total_clipped(), 0);
    assert!(output.features.table.has_column("residual_load"));
    assert!(output.features.table.has_column("hour_load_interaction"));
}

#[test]
fn extreme_price_never_leaks_into_its_own_row() {
    let (hours, mut columns) = populated_market(48);
    columns[0].1[30] = Some(950.0);
    let pipeline = Pipeline::new(PipelineConfig::default()).expect("default config is valid");
    let output = pipeline
        .run(market(&hours, columns), None)
        .expect("pipeline run succeeds");
    let features = &output.features.table;

    assert_eq!(output.cleaned.value_at("price", 30), Some(950.0));
    let own_max = features.value_at("price_rolling_max_24h", 30).unwrap();
    assert!(own_max < 100.0, "row 30 rolling max saw its own spike: {own_max}");
    let own_mean = features.value_at("price_rolling_mean_24h", 30).unwrap();
    assert!(own_mean < 100.0);
    assert_eq!(features.value_at("price_rolling_max_24h", 31), Some(950.0));
    assert_eq!(features.value_at("price_lag_1h", 31), Some(950.0));
    assert_ne!(features.value_at("price_lag_1h", 30), Some(950.0));
}

use std::io;
use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use se3_pipeline::{
    log_app_start, Column, LoggingConfig, Pipeline, PipelineConfig, RawTable, RawTimestamp,
};
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

fn naive(day: u32, hour: u32) -> RawTimestamp {
    RawTimestamp::Naive(
        NaiveDate::from_ymd_opt(2024, 1, day)
            .expect("valid date")
            .and_hms_opt(hour, 0, 0)
            .expect("valid time"),
    )
}

/// Duplicate hour, a 7 hour hole, one out-of-range price, no supply columns.
fn messy_market() -> RawTable {
    let mut timestamps = vec![naive(1, 0), naive(1, 0)];
    let mut prices = vec![Some(10.0), Some(99.0)];
    for hour in 1..=3 {
        timestamps.push(naive(1, hour));
        prices.push(Some(10.0 + hour as f64));
    }
    for hour in 11..=15 {
        timestamps.push(naive(1, hour));
        prices.push(Some(20.0));
    }
    prices[3] = Some(5_000.0);

    RawTable::new("market", timestamps, vec![Column::new("price", prices)])
        .expect("market table should be well-formed")
}

#[test]
fn pipeline_run_emits_stage_diagnostics() {
    let pipeline = Pipeline::new(PipelineConfig::default()).expect("default config is valid");

    let logs = capture_logs(Level::INFO, || {
        let output = pipeline
            .run(messy_market(), None)
            .expect("non-empty market batch should run");
        assert_eq!(output.cleaned.len(), 16);
    });

    assert!(logs.contains("\"event\":\"pipeline.run.start\""));
    assert!(logs.contains("\"event\":\"normalize.duplicates_dropped\""));
    assert!(logs.contains("\"event\":\"continuity.rows_introduced\""));
    assert!(logs.contains("\"event\":\"range.values_invalidated\""));
    assert!(logs.contains("\"event\":\"repair.long_gap\""));
    assert!(logs.contains("\"event\":\"features.family_skipped\""));
    assert!(logs.contains("\"event\":\"pipeline.run.finish\""));
    assert!(logs.contains("\"component\":\"pipeline\""));
}

#[test]
fn debug_level_surfaces_skipped_range_rules() {
    let mut cfg = PipelineConfig::default();
    cfg.range_rules
        .push(se3_pipeline::RangeRule::new("irradiance_avg", 0.0, 1_500.0));
    let pipeline = Pipeline::new(cfg).expect("config is valid");

    let info_logs = capture_logs(Level::INFO, || {
        pipeline.run(messy_market(), None).expect("run succeeds");
    });
    let debug_logs = capture_logs(Level::DEBUG, || {
        pipeline.run(messy_market(), None).expect("run succeeds");
    });

    assert!(!info_logs.contains("\"event\":\"range.column_absent\""));
    assert!(debug_logs.contains("\"event\":\"range.column_absent\""));
}

#[test]
fn app_start_helper_emits_baseline_event() {
    let logs = capture_logs(Level::INFO, || {
        log_app_start(&LoggingConfig::default());
    });

    assert!(logs.contains("\"event\":\"app.start\""));
    assert!(logs.contains("\"component\":\"feature_backfill\""));
}

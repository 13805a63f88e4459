//! Timestamp normalization: localize naive wall-clock times, convert to UTC,
//! drop duplicate instants, sort.
//!
//! DST handling for naive timestamps in the source zone:
//! - ambiguous (autumn fold): the first occurrence of the wall-clock time in
//!   fetch order maps to the earlier instant, the second to the later one.
//!   A fold time seen only once cannot be inferred and is dropped as invalid;
//!   continuity enforcement re-introduces the hour as a gap.
//! - nonexistent (spring gap): shifted forward to the first valid instant.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::table::{Column, RawTable, RawTimestamp, TimeSeriesTable};

const MAX_DUPLICATE_SAMPLES: usize = 5;
const MAX_SHIFT_MINUTES: i64 = 180;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeReport {
    pub source: String,
    pub input_rows: u64,
    pub output_rows: u64,
    pub localized_rows: u64,
    pub ambiguous_resolved: u64,
    pub nonexistent_shifted: u64,
    pub invalid_timestamps: u64,
    pub duplicates_dropped: u64,
    pub duplicate_samples: Vec<DateTime<Utc>>,
}

impl NormalizeReport {
    fn new(source: &str, input_rows: usize) -> Self {
        Self {
            source: source.to_string(),
            input_rows: input_rows as u64,
            output_rows: 0,
            localized_rows: 0,
            ambiguous_resolved: 0,
            nonexistent_shifted: 0,
            invalid_timestamps: 0,
            duplicates_dropped: 0,
            duplicate_samples: Vec::new(),
        }
    }
}

/// Outcome of localizing one naive wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Localized {
    Resolved(DateTime<Utc>),
    AmbiguousResolved(DateTime<Utc>),
    Shifted(DateTime<Utc>),
    Invalid,
}

#[derive(Debug, Clone, Copy)]
pub struct TimestampNormalizer {
    source_tz: Tz,
}

impl TimestampNormalizer {
    pub fn new(source_tz: Tz) -> Self {
        Self { source_tz }
    }

    pub fn source_timezone(&self) -> Tz {
        self.source_tz
    }

    /// `occurrence` is how many times this exact wall-clock value was seen
    /// earlier in the batch; `total` is how often it appears overall.
    pub fn localize_naive(&self, naive: NaiveDateTime, occurrence: usize, total: usize) -> Localized {
        match self.source_tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => Localized::Resolved(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(a, b) => {
                if total < 2 {
                    return Localized::Invalid;
                }
                let (earlier, later) = if a <= b { (a, b) } else { (b, a) };
                let chosen = if occurrence == 0 { earlier } else { later };
                Localized::AmbiguousResolved(chosen.with_timezone(&Utc))
            }
            LocalResult::None => match self.shift_forward(naive) {
                Some(dt) => Localized::Shifted(dt),
                None => Localized::Invalid,
            },
        }
    }

    fn shift_forward(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        let base = naive.with_second(0)?.with_nanosecond(0)?;
        (1..=MAX_SHIFT_MINUTES).find_map(|minutes| {
            let candidate = base + Duration::minutes(minutes);
            self.source_tz
                .from_local_datetime(&candidate)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
        })
    }

    pub fn normalize(&self, raw: RawTable) -> (TimeSeriesTable, NormalizeReport) {
        let (source, timestamps, columns) = raw.into_parts();
        let mut report = NormalizeReport::new(&source, timestamps.len());

        let mut naive_totals: HashMap<NaiveDateTime, usize> = HashMap::new();
        for ts in &timestamps {
            if let RawTimestamp::Naive(naive) = ts {
                *naive_totals.entry(*naive).or_default() += 1;
            }
        }

        let mut naive_seen: HashMap<NaiveDateTime, usize> = HashMap::new();
        let mut resolved: Vec<(DateTime<Utc>, usize)> = Vec::with_capacity(timestamps.len());
        for (row, ts) in timestamps.iter().enumerate() {
            let instant = match ts {
                RawTimestamp::Aware(dt) => Some(dt.with_timezone(&Utc)),
                RawTimestamp::Naive(naive) => {
                    report.localized_rows += 1;
                    let seen = naive_seen.entry(*naive).or_default();
                    let occurrence = *seen;
                    *seen += 1;
                    let total = naive_totals.get(naive).copied().unwrap_or(1);

                    match self.localize_naive(*naive, occurrence, total) {
                        Localized::Resolved(dt) => Some(dt),
                        Localized::AmbiguousResolved(dt) => {
                            report.ambiguous_resolved += 1;
                            Some(dt)
                        }
                        Localized::Shifted(dt) => {
                            report.nonexistent_shifted += 1;
                            debug!(
                                component = "normalize",
                                event = "normalize.nonexistent_shifted",
                                source = %source,
                                local = %naive,
                                shifted_utc = %dt
                            );
                            Some(dt)
                        }
                        Localized::Invalid => {
                            report.invalid_timestamps += 1;
                            None
                        }
                    }
                }
            };
            if let Some(instant) = instant {
                resolved.push((instant, row));
            }
        }

        let mut seen = HashSet::with_capacity(resolved.len());
        let mut kept = Vec::with_capacity(resolved.len());
        for (instant, row) in resolved {
            if seen.insert(instant) {
                kept.push((instant, row));
            } else {
                report.duplicates_dropped += 1;
                if report.duplicate_samples.len() < MAX_DUPLICATE_SAMPLES {
                    report.duplicate_samples.push(instant);
                }
            }
        }
        kept.sort_by_key(|(instant, _)| *instant);

        let out_timestamps: Vec<DateTime<Utc>> = kept.iter().map(|(instant, _)| *instant).collect();
        let out_columns = columns
            .into_iter()
            .map(|column| {
                let values = kept.iter().map(|(_, row)| column.values[*row]).collect();
                Column::new(column.name, values)
            })
            .collect();
        report.output_rows = out_timestamps.len() as u64;

        if report.invalid_timestamps > 0 {
            warn!(
                component = "normalize",
                event = "normalize.invalid_timestamps",
                source = %source,
                invalid_timestamps = report.invalid_timestamps,
                source_tz = %self.source_tz
            );
        }
        if report.duplicates_dropped > 0 {
            warn!(
                component = "normalize",
                event = "normalize.duplicates_dropped",
                source = %source,
                duplicates_dropped = report.duplicates_dropped,
                samples = ?report.duplicate_samples
            );
        }
        info!(
            component = "normalize",
            event = "normalize.finish",
            source = %source,
            input_rows = report.input_rows,
            output_rows = report.output_rows,
            localized_rows = report.localized_rows,
            ambiguous_resolved = report.ambiguous_resolved,
            nonexistent_shifted = report.nonexistent_shifted
        );

        (TimeSeriesTable::from_parts(out_timestamps, out_columns), report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};
    use chrono_tz::Europe::Stockholm;

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn raw(timestamps: Vec<RawTimestamp>, values: Vec<Option<f64>>) -> RawTable {
        RawTable::new("test", timestamps, vec![Column::new("price", values)]).unwrap()
    }

    #[test]
    fn naive_winter_time_is_localized_to_utc() {
        let normalizer = TimestampNormalizer::new(Stockholm);
        let table = raw(
            vec![RawTimestamp::Naive(naive(2024, 1, 1, 1, 0))],
            vec![Some(10.0)],
        );

        let (out, report) = normalizer.normalize(table);
        assert_eq!(out.timestamps(), &[utc(2024, 1, 1, 0, 0)]);
        assert_eq!(report.localized_rows, 1);
    }

    #[test]
    fn aware_timestamps_are_converted_and_sorted() {
        let normalizer = TimestampNormalizer::new(Stockholm);
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let table = raw(
            vec![
                RawTimestamp::Aware(plus_two.with_ymd_and_hms(2024, 6, 1, 5, 0, 0).unwrap()),
                RawTimestamp::Aware(plus_two.with_ymd_and_hms(2024, 6, 1, 4, 0, 0).unwrap()),
            ],
            vec![Some(2.0), Some(1.0)],
        );

        let (out, _) = normalizer.normalize(table);
        assert_eq!(out.timestamps(), &[utc(2024, 6, 1, 2, 0), utc(2024, 6, 1, 3, 0)]);
        assert_eq!(out.column_values("price").unwrap(), &[Some(1.0), Some(2.0)]);
    }

    #[test]
    fn autumn_fold_is_inferred_from_occurrence_order() {
        let normalizer = TimestampNormalizer::new(Stockholm);
        // 2024-10-27 02:00 local happens twice (CEST then CET).
        let fold = naive(2024, 10, 27, 2, 0);
        let table = raw(
            vec![RawTimestamp::Naive(fold), RawTimestamp::Naive(fold)],
            vec![Some(1.0), Some(2.0)],
        );

        let (out, report) = normalizer.normalize(table);
        assert_eq!(
            out.timestamps(),
            &[utc(2024, 10, 27, 0, 0), utc(2024, 10, 27, 1, 0)]
        );
        assert_eq!(out.column_values("price").unwrap(), &[Some(1.0), Some(2.0)]);
        assert_eq!(report.ambiguous_resolved, 2);
        assert_eq!(report.duplicates_dropped, 0);
    }

    #[test]
    fn single_fold_occurrence_is_marked_invalid() {
        let normalizer = TimestampNormalizer::new(Stockholm);
        let table = raw(
            vec![
                RawTimestamp::Naive(naive(2024, 10, 27, 1, 0)),
                RawTimestamp::Naive(naive(2024, 10, 27, 2, 0)),
                RawTimestamp::Naive(naive(2024, 10, 27, 3, 0)),
            ],
            vec![Some(1.0), Some(2.0), Some(3.0)],
        );

        let (out, report) = normalizer.normalize(table);
        assert_eq!(report.invalid_timestamps, 1);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn spring_gap_is_shifted_forward() {
        let normalizer = TimestampNormalizer::new(Stockholm);
        // 2024-03-31 02:30 local does not exist; next valid instant is 03:00 CEST.
        assert_eq!(
            normalizer.localize_naive(naive(2024, 3, 31, 2, 30), 0, 1),
            Localized::Shifted(utc(2024, 3, 31, 1, 0))
        );
    }

    #[test]
    fn duplicates_keep_first_fetch_order_occurrence() {
        let normalizer = TimestampNormalizer::new(Stockholm);
        let t = utc(2024, 1, 1, 0, 0).fixed_offset();
        let table = raw(
            vec![
                RawTimestamp::Aware(t),
                RawTimestamp::Aware(t),
                RawTimestamp::Aware(t),
            ],
            vec![Some(1.0), Some(2.0), Some(3.0)],
        );

        let (out, report) = normalizer.normalize(table);
        assert_eq!(out.column_values("price").unwrap(), &[Some(1.0)]);
        assert_eq!(report.duplicates_dropped, 2);
        assert_eq!(report.duplicate_samples, vec![utc(2024, 1, 1, 0, 0); 2]);
    }

    #[test]
    fn normalization_is_idempotent_without_duplicates() {
        let normalizer = TimestampNormalizer::new(Stockholm);
        let table = raw(
            vec![
                RawTimestamp::Naive(naive(2024, 1, 1, 3, 0)),
                RawTimestamp::Naive(naive(2024, 1, 1, 1, 0)),
                RawTimestamp::Naive(naive(2024, 1, 1, 2, 0)),
            ],
            vec![Some(3.0), Some(1.0), None],
        );

        let (once, _) = normalizer.normalize(table);
        let (twice, report) = normalizer.normalize(RawTable::from(once.clone()));
        assert_eq!(once, twice);
        assert_eq!(report.duplicates_dropped, 0);
    }
}

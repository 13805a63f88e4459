//! Missing-value repair with a length-dependent policy.
//!
//! Short runs (`len <= threshold`) are interpolated between the values that
//! bound them. Long runs carry the last observed value forward instead of
//! bridging the gap with a trend line. Whatever is left at the table edges is
//! back-filled, then forward-filled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::table::TimeSeriesTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InterpolationMethod {
    /// Straight line by row position.
    Linear,
    /// Lagrange polynomial through the `order + 1` known values nearest the run.
    Polynomial { order: usize },
    /// Straight line by elapsed time between the bounding timestamps.
    TimeWeighted,
}

impl InterpolationMethod {
    /// Accepts `linear`, `time`/`time_weighted`, `polynomial` (order 2) and
    /// `polynomial:<order>`.
    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "linear" => Some(Self::Linear),
            "time" | "time_weighted" | "time-weighted" => Some(Self::TimeWeighted),
            "polynomial" => Some(Self::Polynomial { order: 2 }),
            other => other
                .strip_prefix("polynomial:")
                .and_then(|order| order.parse().ok())
                .map(|order| Self::Polynomial { order }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepairStrategy {
    Interpolate(InterpolationMethod),
    ForwardFill,
}

pub fn repair_strategy(
    run_len: usize,
    threshold: usize,
    method: InterpolationMethod,
) -> RepairStrategy {
    if run_len <= threshold {
        RepairStrategy::Interpolate(method)
    } else {
        RepairStrategy::ForwardFill
    }
}

/// Maximal run of consecutive missing values in one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingRun {
    pub start: usize,
    pub len: usize,
}

impl MissingRun {
    pub fn end_exclusive(&self) -> usize {
        self.start + self.len
    }
}

pub fn find_missing_runs(values: &[Option<f64>]) -> Vec<MissingRun> {
    let mut runs = Vec::new();
    let mut current: Option<MissingRun> = None;

    for (idx, value) in values.iter().enumerate() {
        if value.is_none() {
            match current.as_mut() {
                Some(run) => run.len += 1,
                None => current = Some(MissingRun { start: idx, len: 1 }),
            }
        } else if let Some(run) = current.take() {
            runs.push(run);
        }
    }
    runs.extend(current);
    runs
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRepairReport {
    pub column: String,
    pub interpolated: u64,
    pub forward_filled: u64,
    pub edge_filled: u64,
    pub long_gaps: Vec<MissingRun>,
    pub all_missing: bool,
}

impl ColumnRepairReport {
    fn new(column: &str) -> Self {
        Self {
            column: column.to_string(),
            interpolated: 0,
            forward_filled: 0,
            edge_filled: 0,
            long_gaps: Vec::new(),
            all_missing: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GapRepairReport {
    pub columns: Vec<ColumnRepairReport>,
}

impl GapRepairReport {
    pub fn column(&self, name: &str) -> Option<&ColumnRepairReport> {
        self.columns.iter().find(|c| c.column == name)
    }

    pub fn total_interpolated(&self) -> u64 {
        self.columns.iter().map(|c| c.interpolated).sum()
    }

    pub fn total_forward_filled(&self) -> u64 {
        self.columns.iter().map(|c| c.forward_filled).sum()
    }

    pub fn total_edge_filled(&self) -> u64 {
        self.columns.iter().map(|c| c.edge_filled).sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GapRepairer {
    max_gap: usize,
    method: InterpolationMethod,
}

impl GapRepairer {
    pub fn new(max_gap_hours: usize, method: InterpolationMethod) -> Self {
        Self {
            max_gap: max_gap_hours,
            method,
        }
    }

    pub fn repair(&self, table: &mut TimeSeriesTable) -> GapRepairReport {
        let timestamps: Vec<DateTime<Utc>> = table.timestamps().to_vec();
        let mut report = GapRepairReport::default();

        for name in table.column_names() {
            let Some(values) = table.column_values_mut(&name) else {
                continue;
            };
            let column_report = self.repair_column(&name, &timestamps, values);

            if column_report.all_missing {
                warn!(
                    component = "repair",
                    event = "repair.column_all_missing",
                    column = %name
                );
            } else if column_report.interpolated + column_report.forward_filled + column_report.edge_filled > 0 {
                info!(
                    component = "repair",
                    event = "repair.column_repaired",
                    column = %name,
                    interpolated = column_report.interpolated,
                    forward_filled = column_report.forward_filled,
                    edge_filled = column_report.edge_filled
                );
            }
            report.columns.push(column_report);
        }

        report
    }

    fn repair_column(
        &self,
        name: &str,
        timestamps: &[DateTime<Utc>],
        values: &mut [Option<f64>],
    ) -> ColumnRepairReport {
        let mut report = ColumnRepairReport::new(name);
        if values.iter().all(Option::is_none) {
            report.all_missing = !values.is_empty();
            return report;
        }

        // Anchors always come from the unrepaired column.
        let original = values.to_vec();

        for run in find_missing_runs(&original) {
            let left = run.start.checked_sub(1);
            let right = Some(run.end_exclusive()).filter(|idx| *idx < original.len());

            match repair_strategy(run.len, self.max_gap, self.method) {
                RepairStrategy::Interpolate(method) => {
                    let (Some(left), Some(right)) = (left, right) else {
                        continue;
                    };
                    for idx in run.start..run.end_exclusive() {
                        values[idx] = interpolate(method, &original, timestamps, left, right, idx);
                    }
                    report.interpolated += run.len as u64;
                }
                RepairStrategy::ForwardFill => {
                    warn!(
                        component = "repair",
                        event = "repair.long_gap",
                        column = name,
                        start = %timestamps[run.start],
                        missing_hours = run.len,
                        threshold = self.max_gap
                    );
                    report.long_gaps.push(run);
                    let Some(left) = left else {
                        continue;
                    };
                    let carried = original[left];
                    for slot in &mut values[run.start..run.end_exclusive()] {
                        *slot = carried;
                    }
                    report.forward_filled += run.len as u64;
                }
            }
        }

        report.edge_filled = fill_edges(values);
        report
    }
}

fn interpolate(
    method: InterpolationMethod,
    original: &[Option<f64>],
    timestamps: &[DateTime<Utc>],
    left: usize,
    right: usize,
    idx: usize,
) -> Option<f64> {
    let lv = original[left]?;
    let rv = original[right]?;
    match method {
        InterpolationMethod::Linear => {
            let frac = (idx - left) as f64 / (right - left) as f64;
            Some(lv + (rv - lv) * frac)
        }
        InterpolationMethod::TimeWeighted => {
            let total = (timestamps[right] - timestamps[left]).num_milliseconds() as f64;
            if total <= 0.0 {
                return Some(lv);
            }
            let elapsed = (timestamps[idx] - timestamps[left]).num_milliseconds() as f64;
            Some(lv + (rv - lv) * elapsed / total)
        }
        InterpolationMethod::Polynomial { order } => {
            let anchors = polynomial_anchors(original, left, right, order + 1);
            Some(lagrange(&anchors, idx as f64))
        }
    }
}

/// Nearest known points around a run, alternating outward from each side.
fn polynomial_anchors(
    original: &[Option<f64>],
    left: usize,
    right: usize,
    wanted: usize,
) -> Vec<(f64, f64)> {
    let mut anchors = Vec::with_capacity(wanted);
    let mut lower = Some(left);
    let mut upper = Some(right);

    while anchors.len() < wanted && (lower.is_some() || upper.is_some()) {
        if let Some(i) = lower {
            if let Some(v) = original[i] {
                anchors.push((i as f64, v));
            }
            lower = next_known_below(original, i);
        }
        if anchors.len() >= wanted {
            break;
        }
        if let Some(i) = upper {
            if let Some(v) = original[i] {
                anchors.push((i as f64, v));
            }
            upper = next_known_above(original, i);
        }
    }

    anchors
}

fn next_known_below(original: &[Option<f64>], from: usize) -> Option<usize> {
    (0..from).rev().find(|i| original[*i].is_some())
}

fn next_known_above(original: &[Option<f64>], from: usize) -> Option<usize> {
    (from + 1..original.len()).find(|i| original[*i].is_some())
}

fn lagrange(points: &[(f64, f64)], x: f64) -> f64 {
    points
        .iter()
        .enumerate()
        .map(|(i, (xi, yi))| {
            let basis = points
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .fold(1.0, |acc, (_, (xj, _))| acc * (x - xj) / (xi - xj));
            yi * basis
        })
        .sum()
}

/// Backward fill, then forward fill. Returns how many slots were filled.
fn fill_edges(values: &mut [Option<f64>]) -> u64 {
    let mut filled = 0u64;

    let mut next = None;
    for slot in values.iter_mut().rev() {
        match slot {
            Some(v) => next = Some(*v),
            None if next.is_some() => {
                *slot = next;
                filled += 1;
            }
            None => {}
        }
    }

    let mut prev = None;
    for slot in values.iter_mut() {
        match slot {
            Some(v) => prev = Some(*v),
            None if prev.is_some() => {
                *slot = prev;
                filled += 1;
            }
            None => {}
        }
    }

    filled
}

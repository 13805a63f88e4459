//! Stage orchestration: normalize, grid, validate, repair, clip, derive.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::{ConfigError, PipelineConfig};
use crate::continuity::{ContinuityEnforcer, ContinuityError, ContinuityReport};
use crate::features::{FeatureDeriver, FeatureMatrix, FeatureReport};
use crate::normalize::{NormalizeReport, TimestampNormalizer};
use crate::observability::{log_pipeline_finish, log_pipeline_start};
use crate::outliers::{OutlierClipper, OutlierReport};
use crate::repair::{GapRepairReport, GapRepairer};
use crate::table::{missing_summary, MissingStat, RawTable, TableError, TimeSeriesTable};
use crate::validate::{RangeReport, RangeValidator};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Continuity(#[from] ContinuityError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    /// Missing counts after range validation, before repair.
    pub missing_before_repair: Vec<MissingStat>,
    pub continuity: ContinuityReport,
    pub range: RangeReport,
    pub repair: GapRepairReport,
    pub outliers: OutlierReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub normalize: Vec<NormalizeReport>,
    pub cleaning: CleaningReport,
    pub features: FeatureReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub cleaned: TimeSeriesTable,
    pub features: FeatureMatrix,
    pub report: PipelineReport,
}

/// Holds only validated, immutable configuration; every call is independent.
#[derive(Debug, Clone)]
pub struct Pipeline {
    cfg: PipelineConfig,
    normalizer: TimestampNormalizer,
    continuity: ContinuityEnforcer,
    validator: RangeValidator,
    repairer: GapRepairer,
    clipper: OutlierClipper,
    deriver: FeatureDeriver,
}

impl Pipeline {
    pub fn new(cfg: PipelineConfig) -> Result<Self, PipelineError> {
        cfg.validate()?;
        let deriver = FeatureDeriver::new(cfg.features.clone(), cfg.display_timezone)?;
        Ok(Self {
            normalizer: TimestampNormalizer::new(cfg.source_timezone),
            continuity: ContinuityEnforcer::new(),
            validator: RangeValidator::new(cfg.range_rules.clone()),
            repairer: GapRepairer::new(cfg.max_interpolation_gap_hours, cfg.interpolation),
            clipper: OutlierClipper::new(
                cfg.outlier_std_multiplier,
                cfg.outlier_exclude_columns.clone(),
            ),
            deriver,
            cfg,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn normalize(&self, raw: RawTable) -> (TimeSeriesTable, NormalizeReport) {
        self.normalizer.normalize(raw)
    }

    /// Grid, range-check, repair and clip an already normalized table.
    pub fn clean(
        &self,
        table: &TimeSeriesTable,
    ) -> Result<(TimeSeriesTable, CleaningReport), PipelineError> {
        self.clean_with(table, None)
    }

    pub fn derive_features(&self, cleaned: TimeSeriesTable) -> (FeatureMatrix, FeatureReport) {
        self.deriver.derive(cleaned)
    }

    /// Full run over one market batch and an optional aggregated weather batch.
    /// Weather is left-joined onto the market's hourly grid.
    pub fn run(
        &self,
        market: RawTable,
        weather: Option<RawTable>,
    ) -> Result<PipelineOutput, PipelineError> {
        log_pipeline_start(market.len(), weather.as_ref().map(RawTable::len));

        let mut normalize_reports = Vec::with_capacity(2);
        let (market, market_report) = self.normalize(market);
        normalize_reports.push(market_report);
        let weather = weather.map(|raw| {
            let (table, report) = self.normalize(raw);
            normalize_reports.push(report);
            table
        });

        let (cleaned, cleaning) = self.clean_with(&market, weather.as_ref())?;
        let (features, feature_report) = self.derive_features(cleaned.clone());

        let report = PipelineReport {
            normalize: normalize_reports,
            cleaning,
            features: feature_report,
        };
        log_pipeline_finish(&report, cleaned.len(), features.table.columns().len());

        Ok(PipelineOutput {
            cleaned,
            features,
            report,
        })
    }

    fn clean_with(
        &self,
        table: &TimeSeriesTable,
        weather: Option<&TimeSeriesTable>,
    ) -> Result<(TimeSeriesTable, CleaningReport), PipelineError> {
        let (gridded, continuity) = self.continuity.enforce(table)?;
        let mut table = match weather {
            Some(weather) => gridded.merge_left(weather)?,
            None => gridded,
        };

        let range = self.validator.apply(&mut table);
        let missing_before_repair = missing_summary(&table);
        for stat in &missing_before_repair {
            debug!(
                component = "pipeline",
                event = "pipeline.missing_before_repair",
                column = %stat.column,
                count = stat.count,
                percentage = stat.percentage
            );
        }
        let repair = self.repairer.repair(&mut table);
        let outliers = self.clipper.clip(&mut table);

        Ok((
            table,
            CleaningReport {
                missing_before_repair,
                continuity,
                range,
                repair,
                outliers,
            },
        ))
    }
}

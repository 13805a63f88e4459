//! SE3 core crate.
//!
//! Current implemented scope:
//! - timestamp normalization (DST-aware localization, dedup, sort)
//! - hourly grid continuity, range validation, gap repair, outlier clipping
//! - causal feature derivation with a fingerprinted schema
//! - CSV sources, SE3 weather aggregation, SQLite feature store

mod config;
mod continuity;
mod csv_io;
mod features;
mod normalize;
mod observability;
mod outliers;
mod pipeline;
mod repair;
mod source;
mod store;
mod table;
mod validate;

pub use config::{apply_env_overrides, pipeline_config_from_env, ConfigError, PipelineConfig};
pub use continuity::{ContinuityEnforcer, ContinuityError, ContinuityReport};
pub use csv_io::{
    location_csv_env_key, parse_timestamp, read_raw_table, read_raw_table_from,
    weighted_csv_weather, write_table_csv, write_table_csv_to, CsvTableSource,
};
pub use features::{
    assert_schema_compatible, build_feature_schema, FeatureColumn, FeatureConfig, FeatureDType,
    FeatureDeriver, FeatureFamily, FeatureMatrix, FeatureReport, FeatureSchema, SchemaError,
    SkippedFamily, FEATURE_SCHEMA_VERSION, LOAD_FORECAST, SOLAR_FORECAST,
    SWEDISH_FIXED_HOLIDAYS, TEMPERATURE_AVG, WIND_FORECAST, WIND_SPEED_80M_AVG,
};
pub use normalize::{Localized, NormalizeReport, TimestampNormalizer};
pub use observability::{
    init_logging, log_app_start, log_pipeline_finish, log_pipeline_start,
    logging_config_from_env, LogFormat, LoggingConfig, LoggingInitError,
};
pub use outliers::{ColumnClipReport, OutlierClipper, OutlierReport};
pub use pipeline::{CleaningReport, Pipeline, PipelineError, PipelineOutput, PipelineReport};
pub use repair::{
    find_missing_runs, repair_strategy, ColumnRepairReport, GapRepairReport, GapRepairer,
    InterpolationMethod, MissingRun, RepairStrategy,
};
pub use source::{
    aggregate_weighted_weather, se3_locations, FetchWindow, RetrievalError, TableSource,
    WeatherLocation, WeightedWeatherSource,
};
pub use store::{FeatureStore, StoreError, StoredSchema};
pub use table::{
    missing_summary, Column, MissingStat, RawTable, RawTimestamp, TableError, TimeSeriesTable,
};
pub use validate::{ColumnInvalidation, RangeReport, RangeRule, RangeValidator};

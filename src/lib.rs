//! revcast core crate.
//!
//! Current implemented scope:
//! - JSON transaction loading with schema normalization
//! - daily per-country aggregation and country selection
//! - 30-day-forward revenue feature engineering
//! - SQLite aggregate cache and CSV feature export

mod aggregate;
mod export;
mod features;
mod loader;
mod observability;
mod store;

pub use aggregate::{
    aggregate_daily, countries_by_revenue, select_country, CountrySelection, DailyAggregate,
};
pub use export::{write_features_csv, ExportError};
pub use features::{
    assert_schema_compatible, build_feature_schema, engineer_features,
    engineer_features_for_inference, engineer_features_for_training,
    engineer_features_with_config, EmptyWindowFill, EngineeredFeatures, FeatureColumn,
    FeatureConfig, FeatureDType, FeatureError, FeatureMode, FeatureReport, FeatureSchema,
    FEATURE_SCHEMA_VERSION,
};
pub use loader::{
    load_json_dir, load_json_dir_with_config, LoadError, LoaderConfig, Transaction,
    CANONICAL_COLUMNS, COLUMN_ALIASES,
};
pub use observability::{
    init_logging, log_app_start, log_input_selected, logging_config_from_env,
    logging_config_from_lookup, LogFormat, LoggingConfig, LoggingInitError, LOG_FORMAT_VAR,
    LOG_LEVEL_VAR, LOG_TARGET_VAR,
};
pub use store::{AggregateStore, StoreError};

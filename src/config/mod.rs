//! Configuration module for funnel-sql.
//!
//! Handles the JSON funnel definition and the TOML tool settings.

mod funnel;
mod settings;

pub use funnel::{
    FunnelConfig, PercentileSource, RawFunnelConfig, RawStep, SegmentField, Step,
    DEFAULT_PERCENTILES_TABLE, DEFAULT_PROPERTIES_COLUMN, FUNNEL_TABLE_PREFIX,
};
pub use settings::{
    expand_env_vars, CompileSettings, Settings, SettingsError, WarehouseSettings,
};

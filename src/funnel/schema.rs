//! Fixed output schemas.
//!
//! Every funnel variant emits the same columns with the same types, so the
//! percentile compiler and any dashboard can read any funnel table.

use serde::{Deserialize, Serialize};

use crate::sql::DataType;

/// Column of an output table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputColumn {
    pub name: &'static str,
    pub data_type: DataType,
}

const fn column(name: &'static str, data_type: DataType) -> OutputColumn {
    OutputColumn { name, data_type }
}

/// Columns of the funnel table, in projection order.
pub const FUNNEL_COLUMNS: [OutputColumn; 18] = [
    column("actor_id", DataType::String),
    column("current_tier", DataType::String),
    column("affluence_v11_flag", DataType::String),
    column("gender", DataType::String),
    column("income_range", DataType::String),
    column("session_id", DataType::String),
    column("app_version", DataType::String),
    column("operating_system", DataType::String),
    column("entry_point", DataType::String),
    column("screen_name", DataType::String),
    column("screen_entry_time", DataType::Timestamp),
    column("step", DataType::String),
    column("step_stage", DataType::Int64),
    column("previous_screen_name", DataType::String),
    column("screen_success_time", DataType::Timestamp),
    column("is_conversion_session", DataType::Int64),
    column("time_to_convert", DataType::Int64),
    column("table_created_at", DataType::Timestamp),
];

/// Columns of the percentile table, in projection order.
pub const PERCENTILE_COLUMNS: [OutputColumn; 6] = [
    column("screen_name", DataType::String),
    column("ordered_screen_name", DataType::String),
    column("step_order", DataType::Int64),
    column("percentile_25", DataType::Int64),
    column("percentile_50", DataType::Int64),
    column("percentile_75", DataType::Int64),
];

/// Step order of screen names not in the funnel.
pub const UNKNOWN_STEP_ORDER: i64 = 999;

/// One row of the funnel table. Timestamps are kept as the warehouse
/// renders them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledFunnelRow {
    pub actor_id: String,
    pub current_tier: Option<String>,
    pub affluence_v11_flag: Option<String>,
    pub gender: Option<String>,
    pub income_range: Option<String>,
    pub session_id: String,
    pub app_version: Option<String>,
    pub operating_system: Option<String>,
    pub entry_point: Option<String>,
    pub screen_name: String,
    pub screen_entry_time: String,
    pub step: String,
    pub step_stage: i64,
    pub previous_screen_name: Option<String>,
    pub screen_success_time: Option<String>,
    pub is_conversion_session: i64,
    pub time_to_convert: Option<i64>,
    pub table_created_at: String,
}

/// One row of the percentile table, latencies in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PercentileRow {
    pub screen_name: String,
    pub ordered_screen_name: String,
    pub step_order: i64,
    pub percentile_25: Option<i64>,
    pub percentile_50: Option<i64>,
    pub percentile_75: Option<i64>,
}

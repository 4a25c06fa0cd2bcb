//! Funnel definition: the JSON document a caller supplies, and the
//! validated, immutable form the compilers consume.
//!
//! Deserialization goes through [`RawFunnelConfig`], where every field is
//! optional so that a missing field is reported by name rather than as a
//! serde error. [`crate::validation::validate`] turns it into a
//! [`FunnelConfig`].

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use inflector::Inflector;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sql::TableRef;

/// Prefix of the derived funnel table name.
pub const FUNNEL_TABLE_PREFIX: &str = "STANDARD_FUNNEL_";

/// Default name of the percentile table.
pub const DEFAULT_PERCENTILES_TABLE: &str = "percentiles_by_stage";

/// Default structured payload column read by extraction paths.
pub const DEFAULT_PROPERTIES_COLUMN: &str = "properties";

// ============================================================================
// Raw (as supplied)
// ============================================================================

/// A funnel configuration exactly as deserialized from JSON.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RawFunnelConfig {
    pub funnel_name: Option<String>,
    pub project_id: Option<String>,
    pub source_dataset: Option<String>,
    pub destination_dataset: Option<String>,
    pub data_source: Option<String>,
    pub user_id_column: Option<String>,
    pub session_id_column: Option<String>,
    pub event_column: Option<String>,
    pub timestamp_column: Option<String>,
    pub partition_column: Option<String>,
    pub time_period_days: Option<i64>,
    pub steps: Option<Vec<RawStep>>,
    pub filters: Option<Vec<String>>,
    pub user_base_table: Option<String>,
    pub user_segmentation_fields: Option<Vec<String>>,
    pub app_version_extraction: Option<String>,
    pub os_extraction: Option<String>,
    pub entry_point_extraction: Option<String>,
    pub properties_column: Option<String>,
    pub create_percentiles_table: Option<bool>,
    pub percentiles_table_name: Option<String>,
    pub funnel_table_name: Option<String>,
    pub percentile_source: Option<PercentileSource>,
}

/// A funnel step as supplied.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RawStep {
    pub rank: Option<i64>,
    pub screen_name: Option<String>,
    pub loaded_events: Option<Vec<String>>,
}

impl RawFunnelConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }
}

// ============================================================================
// Validated
// ============================================================================

/// One stage of the funnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Dense, 1-based position in the funnel.
    pub rank: u32,
    /// Display label, emitted as a string literal.
    pub screen_name: String,
    /// Raw event names that satisfy this step.
    pub loaded_events: Vec<String>,
    /// Declared events before availability filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_events: Option<Vec<String>>,
    /// Occurrences of the available events in the lookback window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_count: Option<u64>,
}

impl Step {
    pub fn new(rank: u32, screen_name: impl Into<String>, loaded_events: Vec<String>) -> Self {
        Self {
            rank,
            screen_name: screen_name.into(),
            loaded_events,
            original_events: None,
            event_count: None,
        }
    }

    /// `"<rank> - <screen_name>"`, the human-ordered label.
    pub fn ordered_label(&self) -> String {
        format!("{} - {}", self.rank, self.screen_name)
    }
}

/// User attribute columns of the fixed output schema, resolved from the
/// user base table when configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SegmentField {
    #[serde(rename = "current_tier")]
    CurrentTier,
    #[serde(rename = "affluence_v11_flag")]
    AffluenceV11Flag,
    #[serde(rename = "gender")]
    Gender,
    #[serde(rename = "income_range")]
    IncomeRange,
}

impl SegmentField {
    /// Output schema order.
    pub const ALL: [SegmentField; 4] = [
        SegmentField::CurrentTier,
        SegmentField::AffluenceV11Flag,
        SegmentField::Gender,
        SegmentField::IncomeRange,
    ];

    pub fn column_name(&self) -> &'static str {
        match self {
            SegmentField::CurrentTier => "current_tier",
            SegmentField::AffluenceV11Flag => "affluence_v11_flag",
            SegmentField::Gender => "gender",
            SegmentField::IncomeRange => "income_range",
        }
    }
}

impl fmt::Display for SegmentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

impl FromStr for SegmentField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        SegmentField::ALL
            .into_iter()
            .find(|field| field.column_name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                format!(
                    "unknown segmentation field '{}', expected one of: current_tier, affluence_v11_flag, gender, income_range",
                    trimmed
                )
            })
    }
}

/// Which funnel rows feed the percentile computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentileSource {
    /// Every row, backfilled ones included. Latencies are biased towards the
    /// synthetic one-minute spacing of backfilled steps.
    #[default]
    AllRows,
    /// Only observed transitions: the gap from each deduplicated visit to
    /// the next event of the same session. Backfilled rows never contribute.
    ObservedOnly,
}

impl FromStr for PercentileSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "all_rows" | "all" => Ok(PercentileSource::AllRows),
            "observed_only" | "observed" => Ok(PercentileSource::ObservedOnly),
            other => Err(format!(
                "unknown percentile source '{}', expected all_rows or observed_only",
                other
            )),
        }
    }
}

/// A validated funnel run. Immutable once built; availability filtering
/// produces a new step list instead of editing this one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelConfig {
    pub funnel_name: String,
    pub project_id: String,
    pub source_dataset: String,
    pub destination_dataset: String,
    /// Fully-qualified source table (`project.dataset.table`).
    pub data_source: String,
    pub user_id_column: String,
    pub session_id_column: String,
    pub event_column: String,
    pub timestamp_column: String,
    pub partition_column: String,
    pub time_period_days: u32,
    /// Ordered by rank, ranks `1..=K`.
    pub steps: Vec<Step>,
    /// Boolean predicates, ANDed.
    pub filters: Vec<String>,
    /// Left joined as `u`. When set, unqualified columns in the source column
    /// expressions and filters are bound to the event table `e`; reference
    /// user base columns as `u.<column>`.
    pub user_base_table: Option<String>,
    pub user_segmentation_fields: Vec<SegmentField>,
    pub app_version_extraction: Option<String>,
    pub os_extraction: Option<String>,
    pub entry_point_extraction: Option<String>,
    pub properties_column: String,
    pub create_percentiles_table: bool,
    pub percentiles_table_name: String,
    pub funnel_table_name: String,
    pub percentile_source: PercentileSource,
}

impl FunnelConfig {
    /// `STANDARD_FUNNEL_<FUNNEL_NAME>` with the name in SCREAMING_SNAKE_CASE.
    pub fn default_funnel_table_name(funnel_name: &str) -> String {
        format!(
            "{}{}",
            FUNNEL_TABLE_PREFIX,
            funnel_name.to_screaming_snake_case()
        )
    }

    /// `<project>.<destination_dataset>.<table>`
    pub fn destination_table(&self, table: &str) -> TableRef {
        TableRef::from_parts(vec![
            self.project_id.clone(),
            self.destination_dataset.clone(),
            table.to_string(),
        ])
    }

    pub fn funnel_table(&self) -> TableRef {
        self.destination_table(&self.funnel_table_name)
    }

    pub fn percentiles_table(&self) -> TableRef {
        self.destination_table(&self.percentiles_table_name)
    }

    /// Every declared event, in step order, first occurrence kept.
    pub fn declared_events(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.steps
            .iter()
            .flat_map(|step| step.loaded_events.iter())
            .filter(|event| seen.insert(event.as_str()))
            .cloned()
            .collect()
    }

    /// A copy with the warehouse project replaced.
    pub fn with_project_id(&self, project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..self.clone()
        }
    }

    /// A copy with a different percentile source.
    pub fn with_percentile_source(&self, percentile_source: PercentileSource) -> Self {
        Self {
            percentile_source,
            ..self.clone()
        }
    }
}

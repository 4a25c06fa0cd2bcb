//! Validation of funnel configurations.
//!
//! Checks presence and structural well-formedness only. Whether tables and
//! columns exist is discovered by the warehouse at execution time.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::config::{
    FunnelConfig, PercentileSource, RawFunnelConfig, RawStep, SegmentField, Step,
    DEFAULT_PERCENTILES_TABLE, DEFAULT_PROPERTIES_COLUMN,
};
use crate::error::{ConfigError, FunnelError, FunnelResult};

/// Validate a raw configuration into an immutable [`FunnelConfig`].
///
/// Fails with the first problem found, checking required fields in the
/// order they appear in the schema.
pub fn validate(raw: &RawFunnelConfig) -> FunnelResult<FunnelConfig> {
    let funnel_name = required_str(&raw.funnel_name, "funnel_name")?;
    let project_id = required_str(&raw.project_id, "project_id")?;
    let source_dataset = required_str(&raw.source_dataset, "source_dataset")?;
    let destination_dataset = required_str(&raw.destination_dataset, "destination_dataset")?;
    let data_source = required_str(&raw.data_source, "data_source")?;
    let user_id_column = required_str(&raw.user_id_column, "user_id_column")?;
    let session_id_column = required_str(&raw.session_id_column, "session_id_column")?;
    let event_column = required_str(&raw.event_column, "event_column")?;
    let timestamp_column = required_str(&raw.timestamp_column, "timestamp_column")?;
    let partition_column = required_str(&raw.partition_column, "partition_column")?;
    let time_period_days = validate_time_period(raw.time_period_days)?;
    let raw_steps = raw
        .steps
        .as_ref()
        .ok_or_else(|| ConfigError::MissingField("steps".into()))?;

    let steps = validate_steps(raw_steps)?;
    check_unique_screen_names(&steps)?;
    check_event_mapping(&steps)?;

    let filters = validate_filters(raw.filters.as_deref().unwrap_or_default())?;
    let user_base_table = optional_str(&raw.user_base_table);
    let user_segmentation_fields = validate_segmentation(
        raw.user_segmentation_fields.as_deref().unwrap_or_default(),
        user_base_table.is_some(),
    )?;

    let funnel_table_name = optional_str(&raw.funnel_table_name)
        .unwrap_or_else(|| FunnelConfig::default_funnel_table_name(&funnel_name));
    let percentiles_table_name = optional_str(&raw.percentiles_table_name)
        .unwrap_or_else(|| DEFAULT_PERCENTILES_TABLE.to_string());

    let config = FunnelConfig {
        funnel_name,
        project_id,
        source_dataset,
        destination_dataset,
        data_source,
        user_id_column,
        session_id_column,
        event_column,
        timestamp_column,
        partition_column,
        time_period_days,
        steps,
        filters,
        user_base_table,
        user_segmentation_fields,
        app_version_extraction: optional_str(&raw.app_version_extraction),
        os_extraction: optional_str(&raw.os_extraction),
        entry_point_extraction: optional_str(&raw.entry_point_extraction),
        properties_column: optional_str(&raw.properties_column)
            .unwrap_or_else(|| DEFAULT_PROPERTIES_COLUMN.to_string()),
        create_percentiles_table: raw.create_percentiles_table.unwrap_or(false),
        percentiles_table_name,
        funnel_table_name,
        percentile_source: raw.percentile_source.unwrap_or(PercentileSource::AllRows),
    };

    debug!(
        funnel = %config.funnel_name,
        steps = config.steps.len(),
        filters = config.filters.len(),
        "Funnel configuration validated"
    );

    Ok(config)
}

fn required_str(value: &Option<String>, field: &str) -> Result<String, ConfigError> {
    optional_str(value).ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

/// Blank strings count as absent.
fn optional_str(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn validate_time_period(days: Option<i64>) -> Result<u32, ConfigError> {
    let days = days.ok_or_else(|| ConfigError::MissingField("time_period_days".into()))?;
    if days < 1 {
        return Err(ConfigError::invalid(
            "time_period_days",
            format!("must be at least 1, got {}", days),
        ));
    }
    u32::try_from(days).map_err(|_| {
        ConfigError::invalid("time_period_days", format!("{} is out of range", days))
    })
}

/// Steps sorted by rank, ranks checked to be exactly `1..=K`.
fn validate_steps(raw_steps: &[RawStep]) -> Result<Vec<Step>, ConfigError> {
    if raw_steps.is_empty() {
        return Err(ConfigError::invalid("steps", "must be a non-empty array"));
    }

    let mut steps = raw_steps
        .iter()
        .enumerate()
        .map(|(index, raw)| validate_step(index, raw))
        .collect::<Result<Vec<_>, _>>()?;

    steps.sort_by_key(|step| step.rank);

    for (position, step) in steps.iter().enumerate() {
        let expected = position as u32 + 1;
        if step.rank != expected {
            let reason = if position > 0 && steps[position - 1].rank == step.rank {
                format!("rank {} is declared more than once", step.rank)
            } else {
                format!(
                    "ranks must be contiguous starting at 1; expected {}, found {}",
                    expected, step.rank
                )
            };
            return Err(ConfigError::invalid("steps", reason));
        }
    }

    Ok(steps)
}

fn validate_step(index: usize, raw: &RawStep) -> Result<Step, ConfigError> {
    let field = |name: &str| format!("steps[{}].{}", index, name);

    let rank = raw.rank.ok_or_else(|| ConfigError::MissingField(field("rank")))?;
    let rank = u32::try_from(rank)
        .ok()
        .filter(|r| *r > 0)
        .ok_or_else(|| ConfigError::invalid(field("rank"), format!("must be positive, got {}", rank)))?;

    let screen_name = required_str(&raw.screen_name, &field("screen_name"))?;

    let declared = raw
        .loaded_events
        .as_ref()
        .ok_or_else(|| ConfigError::MissingField(field("loaded_events")))?;

    let mut seen = HashSet::new();
    let mut loaded_events = Vec::with_capacity(declared.len());
    for event in declared {
        let event = event.trim();
        if event.is_empty() {
            return Err(ConfigError::invalid(field("loaded_events"), "event names must not be blank"));
        }
        // Duplicates within one step collapse onto the first occurrence.
        if seen.insert(event) {
            loaded_events.push(event.to_string());
        }
    }
    if loaded_events.is_empty() {
        return Err(ConfigError::invalid(field("loaded_events"), "must list at least one event"));
    }

    Ok(Step::new(rank, screen_name, loaded_events))
}

fn check_unique_screen_names(steps: &[Step]) -> Result<(), ConfigError> {
    let mut seen: HashMap<&str, u32> = HashMap::new();
    for step in steps {
        if let Some(first) = seen.insert(step.screen_name.as_str(), step.rank) {
            return Err(ConfigError::invalid(
                "steps",
                format!(
                    "screen name '{}' is used by step {} and step {}",
                    step.screen_name, first, step.rank
                ),
            ));
        }
    }
    Ok(())
}

/// Every event must label exactly one step.
pub fn check_event_mapping(steps: &[Step]) -> FunnelResult<()> {
    let mut owner: HashMap<&str, u32> = HashMap::new();
    for step in steps {
        for event in &step.loaded_events {
            match owner.get(event.as_str()) {
                Some(&first_rank) if first_rank != step.rank => {
                    return Err(FunnelError::AmbiguousEventMapping {
                        event: event.clone(),
                        first_rank,
                        second_rank: step.rank,
                    });
                }
                Some(_) => {}
                None => {
                    owner.insert(event.as_str(), step.rank);
                }
            }
        }
    }
    Ok(())
}

fn validate_filters(filters: &[String]) -> Result<Vec<String>, ConfigError> {
    filters
        .iter()
        .enumerate()
        .map(|(index, filter)| {
            let trimmed = filter.trim();
            if trimmed.is_empty() {
                Err(ConfigError::invalid(
                    format!("filters[{}]", index),
                    "predicate must not be blank",
                ))
            } else {
                Ok(trimmed.to_string())
            }
        })
        .collect()
}

fn validate_segmentation(
    fields: &[String],
    has_user_base_table: bool,
) -> Result<Vec<SegmentField>, ConfigError> {
    if fields.is_empty() {
        return Ok(Vec::new());
    }
    if !has_user_base_table {
        return Err(ConfigError::invalid(
            "user_segmentation_fields",
            "requires user_base_table to be set",
        ));
    }

    let mut parsed = Vec::with_capacity(fields.len());
    for name in fields.iter().filter(|name| !name.trim().is_empty()) {
        let field: SegmentField = name
            .parse()
            .map_err(|reason: String| ConfigError::invalid("user_segmentation_fields", reason))?;
        if !parsed.contains(&field) {
            parsed.push(field);
        }
    }
    Ok(parsed)
}

//! Event availability filtering.
//!
//! Steps whose declared events never occur in the lookback window are
//! dropped, and the survivors are renumbered `1..=K`. This is the only place
//! ranks are ever reassigned; every compiler downstream treats them as dense
//! and 1-based.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{FunnelConfig, Step};
use crate::error::{ConfigError, ExecutionError, FunnelError, FunnelResult};
use crate::funnel::SourceColumns;
use crate::orchestrator::ResultSet;
use crate::sql::{col, count_star, lit_str, Dialect, ExprExt, OrderByExpr, Query};
use crate::validation::check_event_mapping;

// ============================================================================
// Availability report
// ============================================================================

/// Observed occurrences per event name within the lookback window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventAvailabilityReport {
    counts: BTreeMap<String, u64>,
}

impl EventAvailabilityReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record occurrences of `event`, adding to any earlier count.
    pub fn record(&mut self, event: impl Into<String>, count: u64) {
        *self.counts.entry(event.into()).or_insert(0) += count;
    }

    pub fn count(&self, event: &str) -> u64 {
        self.counts.get(event).copied().unwrap_or(0)
    }

    pub fn is_available(&self, event: &str) -> bool {
        self.count(event) > 0
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Build from the rows of the availability query (`event`, `event_count`).
    pub fn from_result_set(result: &ResultSet) -> Result<Self, ExecutionError> {
        let event_idx = result.column_index("event").ok_or_else(|| {
            ExecutionError::new("availability result has no 'event' column")
        })?;
        let count_idx = result
            .column_index("event_count")
            .or_else(|| result.column_index("count"))
            .ok_or_else(|| ExecutionError::new("availability result has no 'event_count' column"))?;

        let mut report = Self::new();
        for (row_number, row) in result.rows.iter().enumerate() {
            let event = match row.get(event_idx) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Null) | None => continue,
                Some(other) => other.to_string(),
            };
            let count = match row.get(count_idx) {
                Some(serde_json::Value::Number(n)) => n.as_u64(),
                Some(serde_json::Value::String(s)) => s.trim().parse::<u64>().ok(),
                Some(serde_json::Value::Null) | None => Some(0),
                Some(_) => None,
            }
            .ok_or_else(|| {
                ExecutionError::new(format!(
                    "availability row {} has a non-integer count for '{}'",
                    row_number, event
                ))
            })?;
            report.record(event, count);
        }
        Ok(report)
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for EventAvailabilityReport {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        let mut report = Self::new();
        for (event, count) in iter {
            report.record(event, count);
        }
        report
    }
}

// ============================================================================
// Filtered steps
// ============================================================================

/// Steps keyed by dense, 1-based rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilteredSteps {
    steps: BTreeMap<u32, Step>,
    dropped: Vec<Step>,
}

impl FilteredSteps {
    /// Take `steps` as they are, without consulting availability.
    ///
    /// Ranks must already be exactly `1..=K` and every event must belong to
    /// one step.
    pub fn from_steps(steps: Vec<Step>) -> FunnelResult<Self> {
        if steps.is_empty() {
            return Err(FunnelError::EmptyFunnel);
        }
        check_event_mapping(&steps)?;

        let mut by_rank = BTreeMap::new();
        for step in steps {
            let rank = step.rank;
            if by_rank.insert(rank, step).is_some() {
                let reason = format!("rank {} is declared more than once", rank);
                return Err(ConfigError::invalid("steps", reason).into());
            }
        }
        if by_rank.keys().copied().ne(1..=by_rank.len() as u32) {
            let reason = "ranks must be contiguous starting at 1";
            return Err(ConfigError::invalid("steps", reason).into());
        }

        Ok(Self {
            steps: by_rank,
            dropped: Vec::new(),
        })
    }

    /// The configuration's steps, unfiltered.
    pub fn unfiltered(config: &FunnelConfig) -> FunnelResult<Self> {
        Self::from_steps(config.steps.clone())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Rank of the last step.
    pub fn max_rank(&self) -> u32 {
        self.steps.keys().next_back().copied().unwrap_or(0)
    }

    pub fn get(&self, rank: u32) -> Option<&Step> {
        self.steps.get(&rank)
    }

    /// Steps in rank order.
    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.steps.values()
    }

    /// Steps removed by filtering, with their original ranks.
    pub fn dropped(&self) -> &[Step] {
        &self.dropped
    }

    /// Every surviving event, in rank order.
    pub fn all_events(&self) -> Vec<String> {
        self.iter()
            .flat_map(|step| step.loaded_events.iter().cloned())
            .collect()
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps.into_values().collect()
    }
}

/// Drop steps with no available events and renumber the rest `1..=K`,
/// preserving their relative order.
pub fn filter(
    config: &FunnelConfig,
    availability: &EventAvailabilityReport,
) -> FunnelResult<FilteredSteps> {
    check_event_mapping(&config.steps)?;

    let mut ordered: Vec<&Step> = config.steps.iter().collect();
    ordered.sort_by_key(|step| step.rank);

    let mut steps = BTreeMap::new();
    let mut dropped = Vec::new();

    for step in ordered {
        let available: Vec<String> = step
            .loaded_events
            .iter()
            .filter(|event| availability.is_available(event))
            .cloned()
            .collect();

        if available.is_empty() {
            warn!(
                rank = step.rank,
                screen_name = %step.screen_name,
                "No events available, skipping step"
            );
            dropped.push(step.clone());
            continue;
        }

        let event_count = available.iter().map(|event| availability.count(event)).sum();
        let rank = steps.len() as u32 + 1;
        info!(
            rank = step.rank,
            new_rank = rank,
            screen_name = %step.screen_name,
            available = available.len(),
            declared = step.loaded_events.len(),
            occurrences = event_count,
            "Step kept"
        );

        steps.insert(
            rank,
            Step {
                rank,
                screen_name: step.screen_name.clone(),
                loaded_events: available,
                original_events: Some(step.loaded_events.clone()),
                event_count: Some(event_count),
            },
        );
    }

    if steps.is_empty() {
        return Err(FunnelError::EmptyFunnel);
    }

    info!(
        kept = steps.len(),
        dropped = dropped.len(),
        "Availability filtering complete"
    );

    Ok(FilteredSteps { steps, dropped })
}

// ============================================================================
// Availability query
// ============================================================================

/// Occurrence counts of every declared event within the lookback window.
pub fn availability_query(config: &FunnelConfig, dialect: Dialect) -> FunnelResult<Query> {
    let cols = SourceColumns::resolve(config, dialect)?;
    let event = cols.event_expr();
    let declared = config
        .declared_events()
        .iter()
        .map(|name| lit_str(name))
        .collect();

    let mut query = Query::new()
        .select(vec![
            event.clone().alias("event"),
            count_star().alias("event_count"),
        ])
        .from(cols.source_table());

    if let Some((table, on)) = cols.user_join() {
        query = query.left_join(table, on);
    }

    query = query.filter(event.clone().in_list(declared));
    for predicate in cols.partition_predicates() {
        query = query.filter(predicate);
    }
    for predicate in cols.filter_predicates() {
        query = query.filter(predicate);
    }

    Ok(query.group_by(vec![event]).order_by(vec![
        OrderByExpr::desc(col("event_count")),
        OrderByExpr::asc(col("event")),
    ]))
}

/// SQL text of [`availability_query`].
pub fn compile_availability_sql(config: &FunnelConfig, dialect: Dialect) -> FunnelResult<String> {
    Ok(availability_query(config, dialect)?.to_sql(dialect))
}

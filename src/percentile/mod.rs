//! Per-step transition latency percentiles.
//!
//! `all_rows` reads the funnel table, measures the time from each row to the
//! actor's next row (across sessions) and includes backfilled rows.
//! `observed_only` recompiles the funnel's deduplicated visits from the
//! source and uses their in-session `time_to_convert`, so no backfilled row
//! and no gap between sessions is measured.
//!
//! Both aggregate p25/p50/p75 per screen name. Rows are labeled with the
//! same step list the funnel table was compiled from; screen names outside it
//! get step order 999 and sort last.

use tracing::debug;

use crate::availability::FilteredSteps;
use crate::config::{FunnelConfig, PercentileSource};
use crate::error::{FunnelError, FunnelResult};
use crate::funnel::{self, FUNNEL_CLEAN, UNKNOWN_STEP_ORDER};
use crate::sql::{
    approx_percentile, case_when, col, lead, lit_int, lit_str, seconds_between, CreateTable, Cte,
    Dialect, Expr, ExprExt, OrderByExpr, Query, SelectExpr, TableRef, WindowExt, WindowOrderBy,
};

pub use crate::funnel::PercentileRow;

pub const ORDERED_EVENTS: &str = "ordered_events";
pub const CALCULATED_TIMES: &str = "calculated_times";
pub const AGGREGATED_TIMES: &str = "aggregated_times";

/// Percentiles reported per screen, as `(percent, column)`.
const PERCENTILES: [(u8, &str); 3] = [
    (25, "percentile_25"),
    (50, "percentile_50"),
    (75, "percentile_75"),
];

/// SQL text of the percentile table statement.
pub fn compile(
    steps: &FilteredSteps,
    config: &FunnelConfig,
    dialect: Dialect,
) -> FunnelResult<String> {
    let sql = compile_statement(steps, config, dialect)?.to_sql(dialect);
    debug!(
        table = %config.percentiles_table_name,
        source = ?config.percentile_source,
        %dialect,
        bytes = sql.len(),
        "Compiled percentile SQL"
    );
    Ok(sql)
}

/// The percentile table statement.
pub fn compile_statement(
    steps: &FilteredSteps,
    config: &FunnelConfig,
    dialect: Dialect,
) -> FunnelResult<CreateTable> {
    if steps.is_empty() {
        return Err(FunnelError::EmptyFunnel);
    }

    let query = match config.percentile_source {
        PercentileSource::AllRows => Query::new()
            .with_cte(Cte::new(ORDERED_EVENTS, ordered_events(config.funnel_table())))
            .with_cte(Cte::new(CALCULATED_TIMES, actor_timeline_times())),
        PercentileSource::ObservedOnly => funnel::observed_visits(steps, config, dialect)?
            .into_iter()
            .fold(Query::new(), Query::with_cte)
            .with_cte(Cte::new(CALCULATED_TIMES, session_transition_times())),
    };

    let query = query
        .with_cte(Cte::new(AGGREGATED_TIMES, aggregated_times()))
        .select(labeled_columns(steps))
        .from(TableRef::new(AGGREGATED_TIMES))
        .order_by(vec![OrderByExpr::new(col("step_order"))]);

    Ok(CreateTable::new(config.percentiles_table())
        .or_replace()
        .as_select(query))
}

fn ordered_events(rows: TableRef) -> Query {
    let next_entry = lead(col("screen_entry_time"))
        .over()
        .partition_by(vec![col("actor_id")])
        .order_by(vec![WindowOrderBy::new(col("screen_entry_time"))])
        .build();

    Query::new()
        .select(vec![
            SelectExpr::new(col("actor_id")),
            SelectExpr::new(col("step_stage")),
            SelectExpr::new(col("screen_name")),
            SelectExpr::new(col("screen_entry_time")),
            next_entry.alias("next_screen_entry_time"),
        ])
        .from(rows)
}

fn actor_timeline_times() -> Query {
    let elapsed = || seconds_between(col("screen_entry_time"), col("next_screen_entry_time"));

    // Backfilled timestamps can invert the order; negative gaps are dropped.
    Query::new()
        .select(vec![
            SelectExpr::new(col("actor_id")),
            SelectExpr::new(col("step_stage")),
            SelectExpr::new(col("screen_name")),
            elapsed().alias("time_to_next_step_seconds"),
        ])
        .from(TableRef::new(ORDERED_EVENTS))
        .filter(col("next_screen_entry_time").is_not_null())
        .filter(elapsed().gte(lit_int(0)))
}

fn session_transition_times() -> Query {
    Query::new()
        .select(vec![
            SelectExpr::new(col("actor_id")),
            SelectExpr::new(col("step_stage")),
            SelectExpr::new(col("screen_name")),
            col("time_to_convert").alias("time_to_next_step_seconds"),
        ])
        .from(TableRef::new(FUNNEL_CLEAN))
        .filter(col("time_to_convert").is_not_null())
}

fn aggregated_times() -> Query {
    let mut select = vec![SelectExpr::new(col("screen_name"))];
    select.extend(PERCENTILES.iter().map(|&(percent, name)| {
        approx_percentile(col("time_to_next_step_seconds"), percent).alias(name)
    }));

    Query::new()
        .select(select)
        .from(TableRef::new(CALCULATED_TIMES))
        .group_by(vec![col("screen_name")])
}

fn labeled_columns(steps: &FilteredSteps) -> Vec<SelectExpr> {
    let is_step = |screen: &str| col("screen_name").eq(lit_str(screen));

    let ordered_screen_name = case_when(
        steps
            .iter()
            .map(|step| (is_step(&step.screen_name), lit_str(&step.ordered_label())))
            .collect(),
        Some(col("screen_name")),
    );
    let step_order = case_when(
        steps
            .iter()
            .map(|step| (is_step(&step.screen_name), lit_int(i64::from(step.rank))))
            .collect(),
        Some(lit_int(UNKNOWN_STEP_ORDER)),
    );

    let mut select = vec![
        SelectExpr::new(col("screen_name")),
        ordered_screen_name.alias("ordered_screen_name"),
        step_order.alias("step_order"),
    ];
    select.extend(PERCENTILES.iter().map(|&(_, name)| SelectExpr::new(col(name))));
    select
}

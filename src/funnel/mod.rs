//! Funnel SQL compiler.
//!
//! Compiles a filtered step list into one `CREATE OR REPLACE TABLE ... AS`
//! statement built from four chained CTEs:
//!
//! ```text
//! funnel_base       label source rows with step_stage / screen_name
//!      │
//! funnel_clean      LAG/LEAD per (actor, session), one row per step visited
//!      │
//! funnel_reached    each (actor, session)'s furthest step
//!      │
//! funnel_completed  one row per step 1..=S, earlier steps backfilled
//! ```
//!
//! Backfilled rows carry synthetic values: entry times spaced one minute
//! apart before the reached step, a success time one minute after it, and a
//! 60 second time to convert. They keep the ordering consistent and are not
//! measurements.

mod schema;
mod source;

pub use schema::{
    CompiledFunnelRow, OutputColumn, PercentileRow, FUNNEL_COLUMNS, PERCENTILE_COLUMNS,
    UNKNOWN_STEP_ORDER,
};
pub use source::{SourceColumns, SOURCE_ALIAS, USER_ALIAS};

use tracing::debug;

use crate::availability::FilteredSteps;
use crate::config::{FunnelConfig, SegmentField, Step};
use crate::error::{FunnelError, FunnelResult};
use crate::sql::{
    case_when, col, current_timestamp, lag, lead, lit_int, lit_str, row_number, seconds_between,
    typed_null, CreateTable, Cte, DataType, Dialect, Expr, ExprExt, OrderByExpr, Query, SelectExpr, TableRef,
    WindowExt, WindowOrderBy,
};

pub const FUNNEL_BASE: &str = "funnel_base";
pub const FUNNEL_CLEAN: &str = "funnel_clean";
pub const FUNNEL_REACHED: &str = "funnel_reached";
pub const FUNNEL_COMPLETED: &str = "funnel_completed";

/// Minutes between a backfilled row's entry and its synthetic success time.
const SYNTHETIC_SUCCESS_MINUTES: i64 = 1;

/// Time to convert reported for backfilled rows.
const SYNTHETIC_TIME_TO_CONVERT_SECONDS: i64 = 60;

/// Columns carried unchanged from `funnel_base` into `funnel_clean`.
const BASE_COLUMNS: [&str; 12] = [
    "actor_id",
    "session_id",
    "screen_name",
    "screen_entry_time",
    "step_stage",
    "current_tier",
    "affluence_v11_flag",
    "gender",
    "income_range",
    "app_version",
    "operating_system",
    "entry_point",
];

/// Columns computed by the session window in `funnel_clean`.
const TRANSITION_COLUMNS: [&str; 4] = [
    "previous_screen_name",
    "screen_success_time",
    "is_conversion_session",
    "time_to_convert",
];

/// SQL text of the funnel table statement.
pub fn compile(
    steps: &FilteredSteps,
    config: &FunnelConfig,
    dialect: Dialect,
) -> FunnelResult<String> {
    let sql = compile_statement(steps, config, dialect)?.to_sql(dialect);
    debug!(
        funnel = %config.funnel_name,
        %dialect,
        steps = steps.len(),
        bytes = sql.len(),
        "Compiled funnel SQL"
    );
    Ok(sql)
}

/// The funnel table statement.
pub fn compile_statement(
    steps: &FilteredSteps,
    config: &FunnelConfig,
    dialect: Dialect,
) -> FunnelResult<CreateTable> {
    if steps.is_empty() {
        return Err(FunnelError::EmptyFunnel);
    }

    let query = observed_visits(steps, config, dialect)?
        .into_iter()
        .fold(Query::new(), Query::with_cte)
        .with_cte(Cte::new(FUNNEL_REACHED, funnel_reached()))
        .with_cte(Cte::new(FUNNEL_COMPLETED, funnel_completed(steps)?))
        .select(final_projection())
        .from(TableRef::new(FUNNEL_COMPLETED))
        .order_by(vec![
            OrderByExpr::new(col("actor_id")),
            OrderByExpr::new(col("session_id")),
            OrderByExpr::new(col("step_stage")),
            OrderByExpr::new(col("screen_entry_time")),
        ]);

    Ok(CreateTable::new(config.funnel_table())
        .or_replace()
        .as_select(query))
}

/// The `funnel_base` and `funnel_clean` CTEs: one row per step visited in
/// each (actor, session), before any backfill. `time_to_convert` is the gap
/// to the next event of the same session, NULL on the session's last event.
pub(crate) fn observed_visits(
    steps: &FilteredSteps,
    config: &FunnelConfig,
    dialect: Dialect,
) -> FunnelResult<Vec<Cte>> {
    let cols = SourceColumns::resolve(config, dialect)?;
    Ok(vec![
        Cte::new(FUNNEL_BASE, funnel_base(steps, &cols)),
        Cte::new(FUNNEL_CLEAN, funnel_clean()),
    ])
}

// ============================================================================
// funnel_base
// ============================================================================

fn rank_literal(step: &Step) -> Expr {
    lit_int(i64::from(step.rank))
}

/// `<event> IN (<step events>)`
fn step_predicate(cols: &SourceColumns, step: &Step) -> Expr {
    cols.event_expr().in_list(
        step.loaded_events
            .iter()
            .map(|event| lit_str(event))
            .collect(),
    )
}

fn funnel_base(steps: &FilteredSteps, cols: &SourceColumns) -> Query {
    let step_stage = case_when(
        steps
            .iter()
            .map(|step| (step_predicate(cols, step), rank_literal(step)))
            .collect(),
        None,
    );
    // Rows outside every step keep their raw event as the name and a NULL
    // step_stage; funnel_clean drops them.
    let screen_name = case_when(
        steps
            .iter()
            .map(|step| (step_predicate(cols, step), lit_str(&step.screen_name)))
            .collect(),
        Some(cols.event_expr()),
    );

    let mut select = vec![
        cols.user_id_expr().cast(DataType::String).alias("actor_id"),
        cols.session_id_expr().cast(DataType::String).alias("session_id"),
        step_stage.alias("step_stage"),
        screen_name.alias("screen_name"),
        cols.timestamp_expr().alias("screen_entry_time"),
    ];
    select.extend(
        SegmentField::ALL
            .into_iter()
            .map(|field| cols.segmentation_expr(field).alias(field.column_name())),
    );
    select.extend([
        cols.extraction_expr(&cols.app_version_path).alias("app_version"),
        cols.extraction_expr(&cols.os_path).alias("operating_system"),
        cols.extraction_expr(&cols.entry_point_path).alias("entry_point"),
    ]);

    let mut query = Query::new().select(select).from(cols.source_table());
    if let Some((table, on)) = cols.user_join() {
        query = query.left_join(table, on);
    }

    for predicate in cols.filter_predicates() {
        query = query.filter(predicate);
    }
    query = query.filter(
        cols.event_expr()
            .in_list(steps.all_events().iter().map(|e| lit_str(e)).collect()),
    );
    for predicate in cols.partition_predicates() {
        query = query.filter(predicate);
    }
    query
        .filter(cols.event_date_predicate())
        .filter(cols.session_id_expr().is_not_null())
}

// ============================================================================
// funnel_clean / funnel_reached
// ============================================================================

/// `f OVER (PARTITION BY actor_id, session_id ORDER BY screen_entry_time)`
fn session_window(function: Expr) -> Expr {
    function
        .over()
        .partition_by(vec![col("actor_id"), col("session_id")])
        .order_by(vec![WindowOrderBy::new(col("screen_entry_time"))])
        .build()
}

fn columns(names: &[&str]) -> Vec<SelectExpr> {
    names.iter().map(|name| SelectExpr::new(col(name))).collect()
}

fn funnel_clean() -> Query {
    let next_entry = session_window(lead(col("screen_entry_time")));

    let mut select = columns(&BASE_COLUMNS);
    select.extend([
        session_window(lag(col("screen_name"))).alias("previous_screen_name"),
        next_entry.clone().alias("screen_success_time"),
        case_when(
            vec![(next_entry.clone().is_not_null(), lit_int(1))],
            Some(lit_int(0)),
        )
        .alias("is_conversion_session"),
        seconds_between(col("screen_entry_time"), next_entry).alias("time_to_convert"),
    ]);

    // Repeat visits to a step within a session collapse onto the latest.
    let visit = row_number()
        .over()
        .partition_by(vec![
            col("actor_id"),
            col("session_id"),
            col("screen_name"),
            col("step_stage"),
        ])
        .order_by(vec![
            WindowOrderBy::desc(col("step_stage")),
            WindowOrderBy::desc(col("screen_entry_time")),
        ])
        .build();

    Query::new()
        .select(select)
        .from(TableRef::new(FUNNEL_BASE))
        .filter(col("step_stage").is_not_null())
        .qualify(visit.eq(lit_int(1)))
}

fn funnel_reached() -> Query {
    let furthest = row_number()
        .over()
        .partition_by(vec![col("actor_id"), col("session_id")])
        .order_by(vec![
            WindowOrderBy::desc(col("step_stage")),
            WindowOrderBy::desc(col("screen_entry_time")),
        ])
        .build();

    let mut select = columns(&BASE_COLUMNS);
    select.extend(columns(&TRANSITION_COLUMNS));

    Query::new()
        .select(select)
        .from(TableRef::new(FUNNEL_CLEAN))
        .qualify(furthest.eq(lit_int(1)))
}

// ============================================================================
// funnel_completed
// ============================================================================

/// One branch per step; a row reaching step `S` appears in branches `1..=S`.
fn funnel_completed(steps: &FilteredSteps) -> FunnelResult<Query> {
    let branches = steps
        .iter()
        .map(|step| backfill_branch(steps, step))
        .collect();
    Query::union_all_of(branches).ok_or(FunnelError::EmptyFunnel)
}

fn backfill_branch(steps: &FilteredSteps, step: &Step) -> Query {
    let rank = rank_literal(step);
    let is_last = step.rank == steps.max_rank();
    let reached = col("step_stage").eq(rank.clone());

    // The reached step passes through; earlier steps get `synthetic`.
    let pass_through = |column: &str, synthetic: Expr| {
        case_when(vec![(reached.clone(), col(column))], Some(synthetic)).alias(column)
    };

    let entry_time = col("screen_entry_time").minus_minutes(col("step_stage").sub(rank.clone()));
    let previous_screen = step
        .rank
        .checked_sub(1)
        .and_then(|previous| steps.get(previous))
        .map(|previous| lit_str(&previous.screen_name))
        .unwrap_or_else(|| typed_null(DataType::String));
    let (success_time, converted, time_to_convert) = if is_last {
        (
            typed_null(DataType::Timestamp),
            lit_int(0),
            typed_null(DataType::Int64),
        )
    } else {
        (
            col("screen_entry_time").plus_minutes(lit_int(SYNTHETIC_SUCCESS_MINUTES)),
            lit_int(1),
            lit_int(SYNTHETIC_TIME_TO_CONVERT_SECONDS),
        )
    };

    let mut select = columns(&["actor_id", "session_id"]);
    select.extend([
        lit_str(&step.screen_name).alias("screen_name"),
        pass_through("screen_entry_time", entry_time),
        rank.clone().alias("step_stage"),
    ]);
    select.extend(columns(&[
        "current_tier",
        "affluence_v11_flag",
        "gender",
        "income_range",
        "app_version",
        "operating_system",
        "entry_point",
    ]));
    select.extend([
        pass_through("previous_screen_name", previous_screen),
        pass_through("screen_success_time", success_time),
        pass_through("is_conversion_session", converted),
        pass_through("time_to_convert", time_to_convert),
    ]);

    Query::new()
        .select(select)
        .from(TableRef::new(FUNNEL_REACHED))
        .filter(col("step_stage").gte(rank))
}

// ============================================================================
// Final projection
// ============================================================================

fn final_projection() -> Vec<SelectExpr> {
    FUNNEL_COLUMNS
        .iter()
        .map(|column| match column.name {
            "step" => col("step_stage").cast(DataType::String).alias("step"),
            "table_created_at" => current_timestamp().alias("table_created_at"),
            name => SelectExpr::new(col(name)),
        })
        .collect()
}

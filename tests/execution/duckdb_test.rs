//! Compiled SQL executed against an in-memory DuckDB warehouse.
//!
//! Every event lands on yesterday's date, `offset` seconds after midnight,
//! so it falls inside the lookback window. Entry times are read back as
//! seconds after the earliest event.

use std::sync::Mutex;

use async_trait::async_trait;
use duckdb::{params, Connection};
use funnel_sql::config::{FunnelConfig, PercentileSource, RawFunnelConfig};
use funnel_sql::error::ExecutionError;
use funnel_sql::orchestrator::{AnalysisOrchestrator, QueryExecutor, ResultSet};
use funnel_sql::sql::Dialect;
use funnel_sql::validation;
use serde_json::json;

const FUNNEL_TABLE: &str = "STANDARD_FUNNEL_CHECKOUT";
const PERCENTILES_TABLE: &str = "percentiles_by_stage";

/// `(user_id, session_id, event, offset)`
type Event = (&'static str, &'static str, &'static str, i64);

/// `(session_id, step_stage, screen_name, entry offset, previous_screen_name,
/// is_conversion_session, time_to_convert)`
type FunnelRow = (String, i64, String, i64, Option<String>, i64, Option<i64>);

fn row(
    session: &str,
    step: i64,
    screen: &str,
    entry: i64,
    previous: Option<&str>,
    converted: i64,
    time_to_convert: Option<i64>,
) -> FunnelRow {
    (
        session.into(),
        step,
        screen.into(),
        entry,
        previous.map(str::to_string),
        converted,
        time_to_convert,
    )
}

/// Steps `A:[e1]`, `B:[e2]`, `C:[e3]` over `memory.main.events`.
fn checkout(source: PercentileSource) -> FunnelConfig {
    let raw: RawFunnelConfig = serde_json::from_value(json!({
        "funnel_name": "Checkout",
        "project_id": "memory",
        "source_dataset": "main",
        "destination_dataset": "main",
        "data_source": "memory.main.events",
        "user_id_column": "user_id",
        "session_id_column": "session_id",
        "event_column": "event",
        "timestamp_column": "event_time",
        "partition_column": "event_date",
        "time_period_days": 30,
        "steps": [
            { "rank": 1, "screen_name": "A", "loaded_events": ["e1"] },
            { "rank": 2, "screen_name": "B", "loaded_events": ["e2"] },
            { "rank": 3, "screen_name": "C", "loaded_events": ["e3"] }
        ],
        "create_percentiles_table": true
    }))
    .unwrap();
    validation::validate(&raw)
        .unwrap()
        .with_percentile_source(source)
}

fn error(e: duckdb::Error) -> ExecutionError {
    ExecutionError::new(e.to_string())
}

struct DuckDbWarehouse {
    conn: Mutex<Connection>,
}

impl DuckDbWarehouse {
    fn with_events(events: &[Event]) -> Self {
        let values: Vec<String> = events
            .iter()
            .map(|(user, session, event, offset)| {
                format!("('{user}', '{session}', '{event}', {offset})")
            })
            .collect();
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&format!(
            "CREATE TABLE events AS
             SELECT
               user_id,
               session_id,
               event,
               CAST(CURRENT_DATE - 1 AS TIMESTAMP) + TO_SECONDS(offset_seconds) AS event_time,
               CURRENT_DATE - 1 AS event_date,
               CAST(NULL AS VARCHAR) AS properties
             FROM (VALUES {}) AS t(user_id, session_id, event, offset_seconds)",
            values.join(", ")
        ))
        .unwrap();
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// One actor's funnel rows, by session and step.
    fn funnel_rows(&self, actor: &str) -> Vec<FunnelRow> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT
                   session_id,
                   CAST(step_stage AS BIGINT),
                   screen_name,
                   DATE_DIFF('second', (SELECT MIN(event_time) FROM events), screen_entry_time),
                   previous_screen_name,
                   CAST(is_conversion_session AS BIGINT),
                   CAST(time_to_convert AS BIGINT)
                 FROM \"{FUNNEL_TABLE}\"
                 WHERE actor_id = ?
                 ORDER BY session_id, step_stage"
            ))
            .unwrap();
        let rows = stmt.query_map(params![actor], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))
        })
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
        rows
    }

    /// `(screen_name, step_order, p25, p50, p75)` by step order.
    fn percentile_rows(&self) -> Vec<(String, i64, f64, f64, f64)> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT
                   screen_name,
                   CAST(step_order AS BIGINT),
                   CAST(percentile_25 AS DOUBLE),
                   CAST(percentile_50 AS DOUBLE),
                   CAST(percentile_75 AS DOUBLE)
                 FROM \"{PERCENTILES_TABLE}\"
                 ORDER BY step_order"
            ))
            .unwrap();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        })
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
        rows
    }
}

#[async_trait]
impl QueryExecutor for DuckDbWarehouse {
    async fn execute(&self, sql: &str) -> Result<ResultSet, ExecutionError> {
        let conn = self.conn.lock().unwrap();
        if !sql.starts_with("SELECT") {
            conn.execute_batch(sql).map_err(error)?;
            return Ok(ResultSet::empty());
        }

        // Only the availability query is a bare SELECT.
        let mut stmt = conn.prepare(sql).map_err(error)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(vec![
                    json!(row.get::<_, String>(0)?),
                    json!(row.get::<_, i64>(1)?),
                ])
            })
            .map_err(error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(error)?;
        Ok(ResultSet::new(
            vec!["event".into(), "event_count".into()],
            rows,
        ))
    }
}

async fn run(warehouse: &DuckDbWarehouse, config: &FunnelConfig, check_availability: bool) {
    AnalysisOrchestrator::new(Dialect::DuckDb)
        .with_availability_check(check_availability)
        .run(config, warehouse)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_skipped_step_is_backfilled() {
    // e1 then e3 ten minutes apart, e2 never fired.
    let warehouse = DuckDbWarehouse::with_events(&[
        ("u1", "s1", "e1", 0),
        ("u1", "s1", "e3", 600),
    ]);
    run(&warehouse, &checkout(PercentileSource::AllRows), false).await;

    assert_eq!(
        warehouse.funnel_rows("u1"),
        vec![
            row("s1", 1, "A", 480, None, 1, Some(60)),
            row("s1", 2, "B", 540, Some("A"), 1, Some(60)),
            row("s1", 3, "C", 600, Some("A"), 0, None),
        ]
    );
}

#[tokio::test]
async fn test_repeat_visits_collapse_per_step() {
    let warehouse = DuckDbWarehouse::with_events(&[
        ("u2", "s2", "e1", 0),
        ("u2", "s2", "e2", 30),
        ("u2", "s2", "e1", 100),
        ("u2", "s2", "e2", 160),
    ]);
    run(&warehouse, &checkout(PercentileSource::AllRows), false).await;

    // One row per step 1..=2, the reached step at its latest visit.
    assert_eq!(
        warehouse.funnel_rows("u2"),
        vec![
            row("s2", 1, "A", 100, None, 1, Some(60)),
            row("s2", 2, "B", 160, Some("A"), 0, None),
        ]
    );
}

#[tokio::test]
async fn test_sessions_are_separate_instances() {
    let warehouse = DuckDbWarehouse::with_events(&[
        ("u3", "s3a", "e1", 0),
        ("u3", "s3a", "e2", 30),
        ("u3", "s3a", "e3", 120),
        ("u3", "s3b", "e1", 18_000),
    ]);
    run(&warehouse, &checkout(PercentileSource::AllRows), false).await;

    let steps: Vec<(String, i64)> = warehouse
        .funnel_rows("u3")
        .into_iter()
        .map(|(session, step, ..)| (session, step))
        .collect();
    let expected = [("s3a", 1), ("s3a", 2), ("s3a", 3), ("s3b", 1)];
    assert_eq!(
        steps,
        expected.map(|(session, step)| (session.to_string(), step))
    );
}

/// Two sessions for u3 five hours apart, one short session for u4.
const TRANSITIONS: [Event; 6] = [
    ("u3", "s3a", "e1", 0),
    ("u3", "s3a", "e2", 30),
    ("u3", "s3a", "e3", 120),
    ("u3", "s3b", "e1", 18_000),
    ("u4", "s4", "e1", 0),
    ("u4", "s4", "e2", 45),
];

#[tokio::test]
async fn test_observed_only_measures_session_transitions() {
    let warehouse = DuckDbWarehouse::with_events(&TRANSITIONS);
    run(&warehouse, &checkout(PercentileSource::ObservedOnly), false).await;

    // A: {30, 45}, B: {90}. C is every session's last event.
    let rows = warehouse.percentile_rows();
    let screens: Vec<&str> = rows.iter().map(|row| row.0.as_str()).collect();
    assert_eq!(screens, vec!["A", "B"]);

    let (_, order, p25, p50, p75) = rows[0].clone();
    assert_eq!(order, 1);
    assert!((30.0..=45.0).contains(&p25), "{rows:?}");
    assert!((30.0..=45.0).contains(&p50), "{rows:?}");
    assert!((30.0..=45.0).contains(&p75), "{rows:?}");
    assert_eq!(rows[1], ("B".to_string(), 2, 90.0, 90.0, 90.0));
}

#[tokio::test]
async fn test_all_rows_spans_sessions() {
    let warehouse = DuckDbWarehouse::with_events(&TRANSITIONS);
    run(&warehouse, &checkout(PercentileSource::AllRows), false).await;

    // Backfilled rows are one minute apart, and u3's step 3 is followed by
    // the next session's step 1.
    let rows = warehouse.percentile_rows();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1], ("B".to_string(), 2, 60.0, 60.0, 60.0));
    assert_eq!(rows[2], ("C".to_string(), 3, 17_880.0, 17_880.0, 17_880.0));
}

#[tokio::test]
async fn test_unavailable_step_dropped_before_backfill() {
    let warehouse = DuckDbWarehouse::with_events(&[
        ("u1", "s1", "e1", 0),
        ("u1", "s1", "e3", 600),
    ]);
    let config = checkout(PercentileSource::AllRows);
    let outcome = AnalysisOrchestrator::new(Dialect::DuckDb)
        .run(&config, &warehouse)
        .await
        .unwrap();

    assert_eq!(outcome.steps.dropped().len(), 1);
    assert_eq!(outcome.availability.unwrap().count("e1"), 1);
    assert_eq!(
        warehouse.funnel_rows("u1"),
        vec![
            row("s1", 1, "A", 540, None, 1, Some(60)),
            row("s1", 2, "C", 600, Some("A"), 0, None),
        ]
    );
}

//! End-to-end orchestration against a scripted executor.

use std::sync::Mutex;

use async_trait::async_trait;
use funnel_sql::config::{FunnelConfig, RawFunnelConfig};
use funnel_sql::error::{ExecutionError, FunnelError, Stage};
use funnel_sql::orchestrator::{AnalysisOrchestrator, QueryExecutor, ResultSet};
use funnel_sql::sql::test_utils::validate_sql;
use funnel_sql::sql::Dialect;
use serde_json::json;

const FIXTURE: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/tests/fixtures/tiering_funnel.json"
);

fn raw_tiering() -> RawFunnelConfig {
    RawFunnelConfig::from_file(FIXTURE).unwrap()
}

fn tiering() -> FunnelConfig {
    AnalysisOrchestrator::default()
        .validate(&raw_tiering())
        .unwrap()
}

/// Answers the availability query from `counts`, accepts every other
/// statement, and checks each one parses in `dialect`.
struct WarehouseStub {
    dialect: Dialect,
    counts: Vec<(&'static str, u64)>,
    executed: Mutex<Vec<String>>,
    reject: Option<String>,
}

impl WarehouseStub {
    fn new(dialect: Dialect, counts: Vec<(&'static str, u64)>) -> Self {
        Self {
            dialect,
            counts,
            executed: Mutex::new(Vec::new()),
            reject: None,
        }
    }

    fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryExecutor for WarehouseStub {
    async fn execute(&self, sql: &str) -> Result<ResultSet, ExecutionError> {
        validate_sql(sql, self.dialect).map_err(ExecutionError::new)?;
        self.executed.lock().unwrap().push(sql.to_string());

        if let Some(reject) = &self.reject {
            if sql.contains(reject.as_str()) {
                return Err(ExecutionError::new(format!("Not found: Dataset {}", reject)));
            }
        }
        if sql.starts_with("SELECT") {
            return Ok(ResultSet::new(
                vec!["EVENT".into(), "EVENT_COUNT".into()],
                self.counts
                    .iter()
                    .map(|(event, count)| vec![json!(event), json!(count)])
                    .collect(),
            ));
        }
        Ok(ResultSet::empty())
    }
}

#[tokio::test]
async fn test_full_pipeline_every_dialect() {
    for dialect in [Dialect::BigQuery, Dialect::DuckDb, Dialect::Snowflake] {
        let warehouse = WarehouseStub::new(
            dialect,
            vec![
                ("LoadedTierOverviewScreen", 5000),
                ("ClickedJoinTierButton", 900),
                ("ClickedAddFundsButton", 640),
                ("ClickedAddFundCtaPO", 500),
                ("BalanceUpdateEvent", 410),
                ("UserUpgradedTiering", 120),
            ],
        );
        let outcome = AnalysisOrchestrator::new(dialect)
            .run(&tiering(), &warehouse)
            .await
            .unwrap();

        assert_eq!(outcome.steps.len(), 6);
        assert!(outcome.steps.dropped().is_empty());
        assert_eq!(warehouse.executed().len(), 3);
        assert!(outcome.percentiles_table.is_some());
    }
}

#[tokio::test]
async fn test_partial_availability() {
    let warehouse = WarehouseStub::new(
        Dialect::BigQuery,
        vec![
            ("LoadedTierOverviewScreen", 5000),
            ("ClickedAddFundsButton", 640),
            ("UserUpgradedTiering", 120),
        ],
    );
    let outcome = AnalysisOrchestrator::default()
        .run(&tiering(), &warehouse)
        .await
        .unwrap();

    let names: Vec<&str> = outcome
        .steps
        .iter()
        .map(|step| step.screen_name.as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "Tiering - Overview screen",
            "Add funds - Enter amount",
            "Tiering - Upgrade screen"
        ]
    );

    // The percentile labels use the same renumbered steps as the funnel.
    let executed = warehouse.executed();
    assert!(executed[1].contains("WHEN `e`.`event` IN ('UserUpgradedTiering') THEN 3"));
    assert!(executed[2].contains("THEN '3 - Tiering - Upgrade screen'"));
}

#[tokio::test]
async fn test_funnel_failure_stops_before_percentiles() {
    let mut warehouse = WarehouseStub::new(Dialect::BigQuery, vec![("UserUpgradedTiering", 1)]);
    warehouse.reject = Some("STANDARD_FUNNEL_TIERING_AND_ADD_FUNDS_FUNNEL".into());

    let err = AnalysisOrchestrator::default()
        .run(&tiering(), &warehouse)
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::FunnelExecution);
    assert!(matches!(err.source, FunnelError::Execution(_)));
    assert_eq!(warehouse.executed().len(), 2);
}

#[tokio::test]
async fn test_executor_as_trait_object() {
    let warehouse = WarehouseStub::new(Dialect::BigQuery, vec![]);
    let executor: &dyn QueryExecutor = &warehouse;

    let outcome = AnalysisOrchestrator::default()
        .with_availability_check(false)
        .run(&tiering(), executor)
        .await
        .unwrap();
    assert_eq!(outcome.steps.len(), 6);
    assert_eq!(warehouse.executed().len(), 2);
}

#[test]
fn test_plan_matches_run() {
    let plan = AnalysisOrchestrator::new(Dialect::Snowflake)
        .plan(&tiering(), None)
        .unwrap();
    let script = plan.to_script();

    assert!(script.starts_with("CREATE OR REPLACE TABLE"));
    assert_eq!(script.matches("CREATE OR REPLACE TABLE").count(), 2);
    validate_sql(&plan.funnel_sql, Dialect::Snowflake).unwrap();
}

#[test]
fn test_validation_stage() {
    let mut raw = raw_tiering();
    raw.time_period_days = Some(0);
    let err = AnalysisOrchestrator::default().validate(&raw).unwrap_err();
    assert_eq!(err.stage, Stage::Validation);
    assert!(err.to_string().starts_with("Analysis failed during validation:"));
}

use funnel_sql::availability::{compile_availability_sql, filter, EventAvailabilityReport};
use funnel_sql::config::{FunnelConfig, RawFunnelConfig};
use funnel_sql::error::FunnelError;
use funnel_sql::orchestrator::ResultSet;
use funnel_sql::sql::test_utils::validate_sql;
use funnel_sql::sql::Dialect;
use funnel_sql::validation;
use serde_json::json;

const FIXTURE: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/tests/fixtures/tiering_funnel.json"
);

fn tiering() -> FunnelConfig {
    validation::validate(&RawFunnelConfig::from_file(FIXTURE).unwrap()).unwrap()
}

#[test]
fn test_availability_query_bigquery() {
    let sql = compile_availability_sql(&tiering(), Dialect::BigQuery).unwrap();
    insta::assert_snapshot!(sql, @r"
    SELECT
      `e`.`event` AS `event`,
      COUNT(*) AS `event_count`
    FROM `common-tech-434709`.`events`.`events` AS `e`
    WHERE `e`.`event` IN ('LoadedTierOverviewScreen', 'ClickedJoinTierButton', 'ClickedAddFundsButton', 'ClickedAddFundCtaPO', 'BalanceUpdateEvent', 'UserUpgradedTiering') AND `e`.`date` >= DATE_SUB(CURRENT_DATE(), INTERVAL 30 DAY) AND `e`.`date` <= CURRENT_DATE() AND (event IN ('LoadedTierOverviewScreen', 'ClickedJoinTierButton', 'ClickedAddFundsButton', 'ClickedAddFundCtaPO', 'BalanceUpdateEvent', 'UserUpgradedTiering'))
    GROUP BY `e`.`event`
    ORDER BY `event_count` DESC, `event` ASC
    ");
    validate_sql(&sql, Dialect::BigQuery).unwrap();
}

#[test]
fn test_availability_query_parses_in_every_dialect() {
    for dialect in [Dialect::BigQuery, Dialect::DuckDb, Dialect::Snowflake] {
        let sql = compile_availability_sql(&tiering(), dialect).unwrap();
        validate_sql(&sql, dialect).unwrap();
    }
}

#[test]
fn test_report_from_result_set() {
    let result = ResultSet::new(
        vec!["event".into(), "event_count".into()],
        vec![
            vec![json!("LoadedTierOverviewScreen"), json!(1200)],
            vec![json!("ClickedJoinTierButton"), json!("310")],
            vec![json!("BalanceUpdateEvent"), json!(null)],
        ],
    );
    let report = EventAvailabilityReport::from_result_set(&result).unwrap();

    assert_eq!(report.count("LoadedTierOverviewScreen"), 1200);
    assert_eq!(report.count("ClickedJoinTierButton"), 310);
    assert!(!report.is_available("BalanceUpdateEvent"));
    assert!(!report.is_available("UserUpgradedTiering"));
}

#[test]
fn test_missing_steps_are_dropped_and_renumbered() {
    let config = tiering();
    let report: EventAvailabilityReport = [
        ("LoadedTierOverviewScreen", 1200),
        ("ClickedAddFundsButton", 95),
        ("UserUpgradedTiering", 12),
    ]
    .into_iter()
    .collect();

    let steps = filter(&config, &report).unwrap();
    let kept: Vec<(u32, &str)> = steps
        .iter()
        .map(|step| (step.rank, step.screen_name.as_str()))
        .collect();
    assert_eq!(
        kept,
        vec![
            (1, "Tiering - Overview screen"),
            (2, "Add funds - Enter amount"),
            (3, "Tiering - Upgrade screen"),
        ]
    );

    let dropped: Vec<u32> = steps.dropped().iter().map(|step| step.rank).collect();
    assert_eq!(dropped, vec![2, 4, 5]);

    let upgrade = steps.get(3).unwrap();
    assert_eq!(upgrade.event_count, Some(12));
    assert_eq!(
        upgrade.original_events.as_deref(),
        Some(&["UserUpgradedTiering".to_string()][..])
    );

    // The caller's config keeps its original ranks.
    assert_eq!(config.steps[2].rank, 3);
}

#[test]
fn test_nothing_available() {
    let err = filter(&tiering(), &EventAvailabilityReport::new()).unwrap_err();
    assert!(matches!(err, FunnelError::EmptyFunnel));
}

#[test]
fn test_report_json_shape() {
    let report: EventAvailabilityReport =
        serde_json::from_value(json!({"LoadedTierOverviewScreen": 7})).unwrap();
    assert_eq!(report.count("LoadedTierOverviewScreen"), 7);
    assert_eq!(report.len(), 1);
}

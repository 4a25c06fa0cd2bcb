//! Percentile table compilation from a full configuration file.

use funnel_sql::availability::{filter, EventAvailabilityReport, FilteredSteps};
use funnel_sql::config::{FunnelConfig, PercentileSource, RawFunnelConfig};
use funnel_sql::percentile::{self, PercentileRow};
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

fn compile(config: &FunnelConfig, dialect: Dialect) -> String {
    let steps = FilteredSteps::unfiltered(config).unwrap();
    percentile::compile(&steps, config, dialect).unwrap()
}

#[test]
fn test_compiles_in_every_dialect() {
    for source in [PercentileSource::AllRows, PercentileSource::ObservedOnly] {
        let config = tiering().with_percentile_source(source);
        for dialect in [Dialect::BigQuery, Dialect::DuckDb, Dialect::Snowflake] {
            let sql = compile(&config, dialect);
            validate_sql(&sql, dialect).unwrap_or_else(|e| panic!("{dialect}: {e}\n{sql}"));
        }
    }
}

#[test]
fn test_labels_bigquery() {
    let sql = compile(&tiering(), Dialect::BigQuery);
    let (_, labels) = sql.rsplit_once("\nSELECT\n").unwrap();
    insta::assert_snapshot!(format!("SELECT\n{labels}"), @r"
    SELECT
      `screen_name`,
      CASE WHEN `screen_name` = 'Tiering - Overview screen' THEN '1 - Tiering - Overview screen' WHEN `screen_name` = 'Tiering - Add money to Fi' THEN '2 - Tiering - Add money to Fi' WHEN `screen_name` = 'Add funds - Enter amount' THEN '3 - Add funds - Enter amount' WHEN `screen_name` = 'Add funds - Payment options' THEN '4 - Add funds - Payment options' WHEN `screen_name` = 'Add funds - Payment success' THEN '5 - Add funds - Payment success' WHEN `screen_name` = 'Tiering - Upgrade screen' THEN '6 - Tiering - Upgrade screen' ELSE `screen_name` END AS `ordered_screen_name`,
      CASE WHEN `screen_name` = 'Tiering - Overview screen' THEN 1 WHEN `screen_name` = 'Tiering - Add money to Fi' THEN 2 WHEN `screen_name` = 'Add funds - Enter amount' THEN 3 WHEN `screen_name` = 'Add funds - Payment options' THEN 4 WHEN `screen_name` = 'Add funds - Payment success' THEN 5 WHEN `screen_name` = 'Tiering - Upgrade screen' THEN 6 ELSE 999 END AS `step_order`,
      `percentile_25`,
      `percentile_50`,
      `percentile_75`
    FROM `aggregated_times`
    ORDER BY `step_order`
    ");
}

#[test]
fn test_duckdb_aggregates() {
    let sql = compile(&tiering(), Dialect::DuckDb);
    assert!(sql.contains(
        "FROM \"common-tech-434709\".\"sandbox\".\"STANDARD_FUNNEL_TIERING_AND_ADD_FUNDS_FUNNEL\""
    ));
    assert!(sql.contains("GROUP BY \"screen_name\""));
    assert!(sql.contains("ORDER BY \"step_order\""));
}

#[test]
fn test_labels_follow_filtered_ranks() {
    let config = tiering();
    let report: EventAvailabilityReport = [
        ("LoadedTierOverviewScreen", 10),
        ("BalanceUpdateEvent", 4),
    ]
    .into_iter()
    .collect();
    let steps = filter(&config, &report).unwrap();
    let sql = percentile::compile(&steps, &config, Dialect::BigQuery).unwrap();

    assert!(sql.contains(
        "WHEN `screen_name` = 'Add funds - Payment success' THEN '2 - Add funds - Payment success' ELSE `screen_name` END"
    ));
    assert!(sql.contains(
        "WHEN `screen_name` = 'Add funds - Payment success' THEN 2 ELSE 999 END AS `step_order`"
    ));
}

#[test]
fn test_observed_only_excludes_backfill() {
    let sql = compile(
        &tiering().with_percentile_source(PercentileSource::ObservedOnly),
        Dialect::BigQuery,
    );
    assert!(!sql.contains("STANDARD_FUNNEL_TIERING_AND_ADD_FUNDS_FUNNEL"), "{sql}");
    assert!(sql.contains("FROM `common-tech-434709`.`"), "{sql}");
    assert!(sql.contains("FROM `funnel_clean`\nWHERE `time_to_convert` IS NOT NULL"));
    assert!(!sql.contains("PARTITION BY `actor_id` ORDER BY"));
}

#[test]
fn test_rows_read_back() {
    let result = ResultSet::new(
        [
            "screen_name",
            "ordered_screen_name",
            "step_order",
            "percentile_25",
            "percentile_50",
            "percentile_75",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect(),
        vec![vec![
            json!("Tiering - Overview screen"),
            json!("1 - Tiering - Overview screen"),
            json!(1),
            json!(4),
            json!(12),
            json!(60),
        ]],
    );
    let rows: Vec<PercentileRow> = result.rows_as().unwrap();
    assert_eq!(rows[0].step_order, 1);
    assert_eq!(rows[0].percentile_75, Some(60));
}

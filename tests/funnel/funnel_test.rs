//! Funnel table compilation from a full configuration file.

use funnel_sql::availability::{filter, EventAvailabilityReport, FilteredSteps};
use funnel_sql::config::{FunnelConfig, RawFunnelConfig, SegmentField};
use funnel_sql::error::{CompilationError, FunnelError};
use funnel_sql::funnel::{self, FUNNEL_COLUMNS};
use funnel_sql::sql::test_utils::validate_sql;
use funnel_sql::sql::{Dialect, SqlDialect};
use funnel_sql::validation;

const FIXTURE: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/tests/fixtures/tiering_funnel.json"
);

const DIALECTS: [Dialect; 3] = [Dialect::BigQuery, Dialect::DuckDb, Dialect::Snowflake];

fn tiering() -> FunnelConfig {
    validation::validate(&RawFunnelConfig::from_file(FIXTURE).unwrap()).unwrap()
}

fn compile(config: &FunnelConfig, dialect: Dialect) -> String {
    let steps = FilteredSteps::unfiltered(config).unwrap();
    funnel::compile(&steps, config, dialect).unwrap()
}

#[test]
fn test_fixture_compiles_in_every_dialect() {
    let config = tiering();
    for dialect in DIALECTS {
        let sql = compile(&config, dialect);
        validate_sql(&sql, dialect).unwrap_or_else(|e| panic!("{dialect}: {e}\n{sql}"));
    }
}

#[test]
fn test_one_backfill_branch_per_step() {
    let sql = compile(&tiering(), Dialect::BigQuery);
    assert_eq!(sql.matches("UNION ALL").count(), 5);
    for rank in 1..=6 {
        assert!(sql.contains(&format!("WHERE `step_stage` >= {rank})")), "{sql}");
    }
}

#[test]
fn test_target_table() {
    let sql = compile(&tiering(), Dialect::BigQuery);
    assert!(sql.starts_with(
        "CREATE OR REPLACE TABLE `common-tech-434709`.`sandbox`.`STANDARD_FUNNEL_TIERING_AND_ADD_FUNDS_FUNNEL` AS\n"
    ));

    let sql = compile(&tiering(), Dialect::Snowflake);
    assert!(sql.starts_with(
        "CREATE OR REPLACE TABLE \"common-tech-434709\".\"sandbox\".\"STANDARD_FUNNEL_TIERING_AND_ADD_FUNDS_FUNNEL\" AS\n"
    ));
}

#[test]
fn test_projection_is_the_fixed_schema() {
    let sql = compile(&tiering(), Dialect::BigQuery);
    let projection = sql
        .rsplit("\nSELECT\n")
        .next()
        .unwrap()
        .split("\nFROM `funnel_completed`")
        .next()
        .unwrap();

    let aliases: Vec<&str> = projection
        .split(",\n")
        .map(|item| item.trim().rsplit(' ').next().unwrap().trim_matches('`'))
        .collect();
    let expected: Vec<&str> = FUNNEL_COLUMNS.iter().map(|c| c.name).collect();
    assert_eq!(aliases, expected);
}

#[test]
fn test_variants_share_the_schema() {
    let mut segmented = tiering();
    segmented.user_base_table = Some("common-tech-434709.users.base".into());
    segmented.user_segmentation_fields = vec![SegmentField::CurrentTier, SegmentField::IncomeRange];
    segmented.app_version_extraction = Some("app.version".into());
    segmented.os_extraction = Some("device:os".into());

    for dialect in DIALECTS {
        let plain = compile(&tiering(), dialect);
        let variant = compile(&segmented, dialect);
        validate_sql(&variant, dialect).unwrap();

        // Only funnel_base differs; everything downstream is identical.
        let marker = dialect.quote_identifier("funnel_clean");
        let tail = |sql: &str| sql.split_once(marker.as_str()).unwrap().1.to_string();
        assert_eq!(tail(&plain), tail(&variant));
    }
}

#[test]
fn test_segmentation_and_extraction_columns() {
    let mut config = tiering();
    config.user_base_table = Some("common-tech-434709.users.base".into());
    config.user_segmentation_fields = vec![SegmentField::AffluenceV11Flag];
    config.entry_point_extraction = Some("entry_point".into());

    let sql = compile(&config, Dialect::BigQuery);
    assert!(sql.contains(
        "LEFT JOIN `common-tech-434709`.`users`.`base` AS `u` ON `e`.`user_id` = `u`.`user_id`"
    ));
    assert!(sql.contains("`u`.`affluence_v11_flag` AS `affluence_v11_flag`"));
    assert!(sql.contains("CAST(NULL AS STRING) AS `current_tier`"));
    assert!(sql.contains(
        "SAFE_CAST(JSON_EXTRACT_SCALAR(`e`.`properties`, '$.entry_point') AS STRING) AS `entry_point`"
    ));
    assert!(sql.contains("CAST(NULL AS STRING) AS `app_version`"));

    // Joined, the configured expressions bind to the event table.
    assert!(sql.contains("(JSON_EXTRACT_SCALAR(e.properties, '$.session_id')) IS NOT NULL"));
    assert!(sql.contains("WHERE (e.event IN ('LoadedTierOverviewScreen', "), "{sql}");
    validate_sql(&sql, Dialect::BigQuery).unwrap();
}

#[test]
fn test_filtered_steps_drive_labels() {
    let config = tiering();
    let report: EventAvailabilityReport = [
        ("LoadedTierOverviewScreen", 10),
        ("UserUpgradedTiering", 2),
    ]
    .into_iter()
    .collect();
    let steps = filter(&config, &report).unwrap();
    let sql = funnel::compile(&steps, &config, Dialect::BigQuery).unwrap();

    assert!(sql.contains(
        "WHEN `e`.`event` IN ('UserUpgradedTiering') THEN 2 END AS `step_stage`"
    ));
    assert!(!sql.contains("'Tiering - Add money to Fi'"));
    assert_eq!(sql.matches("UNION ALL").count(), 1);
    // Step 2 now backfills step 1's label as its previous screen.
    assert!(sql.contains("ELSE 'Tiering - Overview screen' END AS `previous_screen_name`"));
}

#[test]
fn test_deterministic_output() {
    let config = tiering();
    for dialect in DIALECTS {
        assert_eq!(compile(&config, dialect), compile(&config, dialect));
    }
}

#[test]
fn test_labels_with_quotes_are_escaped() {
    let mut config = tiering();
    config.steps[0].screen_name = "Tiering - It's on".into();

    let sql = compile(&config, Dialect::Snowflake);
    assert!(sql.contains("'Tiering - It''s on'"));
    validate_sql(&sql, Dialect::Snowflake).unwrap();
}

#[test]
fn test_injected_filter_rejected() {
    let mut config = tiering();
    config.filters = vec!["1 = 1; DROP TABLE events".into()];
    let steps = FilteredSteps::unfiltered(&config).unwrap();

    let err = funnel::compile(&steps, &config, Dialect::BigQuery).unwrap_err();
    assert!(matches!(
        err,
        FunnelError::Compilation(CompilationError::InvalidColumnExpression { ref field, .. })
            if field == "filters[0]"
    ));
}

#[test]
fn test_invalid_extraction_path_rejected() {
    let mut config = tiering();
    config.os_extraction = Some("device:os') --".into());
    let steps = FilteredSteps::unfiltered(&config).unwrap();

    let err = funnel::compile(&steps, &config, Dialect::BigQuery).unwrap_err();
    assert!(matches!(
        err,
        FunnelError::Compilation(CompilationError::InvalidExtractionPath { .. })
    ));
}

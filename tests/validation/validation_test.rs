use funnel_sql::config::{PercentileSource, RawFunnelConfig, SegmentField};
use funnel_sql::error::{ConfigError, FunnelError};
use funnel_sql::validation;
use serde_json::{json, Value};

const FIXTURE: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/tests/fixtures/tiering_funnel.json"
);

fn fixture_json() -> Value {
    serde_json::from_str(&std::fs::read_to_string(FIXTURE).unwrap()).unwrap()
}

fn validate_json(value: Value) -> Result<funnel_sql::config::FunnelConfig, FunnelError> {
    let raw: RawFunnelConfig = serde_json::from_value(value).unwrap();
    validation::validate(&raw)
}

#[test]
fn test_fixture_validates() {
    let raw = RawFunnelConfig::from_file(FIXTURE).unwrap();
    let config = validation::validate(&raw).unwrap();

    assert_eq!(config.steps.len(), 6);
    assert_eq!(config.steps[5].screen_name, "Tiering - Upgrade screen");
    assert_eq!(config.time_period_days, 30);
    assert_eq!(config.filters.len(), 1);
    assert_eq!(
        config.funnel_table_name,
        "STANDARD_FUNNEL_TIERING_AND_ADD_FUNDS_FUNNEL"
    );
    assert_eq!(config.percentiles_table_name, "percentiles_by_stage");
    assert_eq!(config.properties_column, "properties");
    assert_eq!(config.percentile_source, PercentileSource::AllRows);
    assert!(config.create_percentiles_table);
}

#[test]
fn test_missing_file() {
    let err = RawFunnelConfig::from_file("does/not/exist.json").unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_malformed_json() {
    let err = RawFunnelConfig::from_json_str("{\"steps\": [").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_first_missing_field_reported() {
    let mut value = fixture_json();
    let object = value.as_object_mut().unwrap();
    object.remove("event_column");
    object.remove("timestamp_column");

    let err = validate_json(value).unwrap_err();
    assert_eq!(err.to_string(), "Missing required field: event_column");
}

#[test]
fn test_steps_given_out_of_order() {
    let mut value = fixture_json();
    value["steps"].as_array_mut().unwrap().reverse();

    let config = validate_json(value).unwrap();
    let ranks: Vec<u32> = config.steps.iter().map(|s| s.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(config.steps[0].screen_name, "Tiering - Overview screen");
}

#[test]
fn test_overlapping_events_rejected() {
    let mut value = fixture_json();
    value["steps"][3]["loaded_events"] = json!(["ClickedAddFundCtaPO", "ClickedJoinTierButton"]);

    let err = validate_json(value).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Event 'ClickedJoinTierButton' is declared in step 2 and step 4; \
         every event must map to exactly one step"
    );
}

#[test]
fn test_supplementary_fields() {
    let mut value = fixture_json();
    let object = value.as_object_mut().unwrap();
    object.insert("user_base_table".into(), json!("common-tech-434709.users.base"));
    object.insert(
        "user_segmentation_fields".into(),
        json!(["current_tier", "GENDER"]),
    );
    object.insert("os_extraction".into(), json!("device:os"));
    object.insert("funnel_table_name".into(), json!("STANDARD_FUNNEL"));
    object.insert("percentile_source".into(), json!("observed_only"));

    let config = validate_json(value).unwrap();
    assert_eq!(
        config.user_segmentation_fields,
        vec![SegmentField::CurrentTier, SegmentField::Gender]
    );
    assert_eq!(config.os_extraction.as_deref(), Some("device:os"));
    assert_eq!(config.funnel_table_name, "STANDARD_FUNNEL");
    assert_eq!(config.percentile_source, PercentileSource::ObservedOnly);
}

#[test]
fn test_invalid_time_period() {
    let mut value = fixture_json();
    value["time_period_days"] = json!(0);

    let err = validate_json(value).unwrap_err();
    assert!(matches!(
        err,
        FunnelError::Config(ConfigError::InvalidField { ref field, .. }) if field == "time_period_days"
    ));
}

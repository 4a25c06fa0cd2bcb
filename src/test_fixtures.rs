//! Shared fixtures for unit tests.

use crate::config::{FunnelConfig, PercentileSource, Step};

/// Three steps `A:[e1]`, `B:[e2]`, `C:[e3]` over `proj.events.events`.
pub fn sample_config() -> FunnelConfig {
    FunnelConfig {
        funnel_name: "Test".into(),
        project_id: "proj".into(),
        source_dataset: "events".into(),
        destination_dataset: "sandbox".into(),
        data_source: "proj.events.events".into(),
        user_id_column: "user_id".into(),
        session_id_column: "JSON_EXTRACT_SCALAR(properties, '$.session_id')".into(),
        event_column: "event".into(),
        timestamp_column: "timestamp".into(),
        partition_column: "date".into(),
        time_period_days: 30,
        steps: vec![
            Step::new(1, "A", vec!["e1".into()]),
            Step::new(2, "B", vec!["e2".into()]),
            Step::new(3, "C", vec!["e3".into()]),
        ],
        filters: vec![],
        user_base_table: None,
        user_segmentation_fields: vec![],
        app_version_extraction: None,
        os_extraction: None,
        entry_point_extraction: None,
        properties_column: "properties".into(),
        create_percentiles_table: true,
        percentiles_table_name: "percentiles_by_stage".into(),
        funnel_table_name: "STANDARD_FUNNEL_TEST".into(),
        percentile_source: PercentileSource::AllRows,
    }
}

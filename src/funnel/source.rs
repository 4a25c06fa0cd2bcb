//! Resolution of the configured source columns into typed expressions.
//!
//! Shared by the funnel compiler and the availability query so both read
//! the source table through the same validated fragments and the same
//! lookback window.

use crate::config::{FunnelConfig, SegmentField};
use crate::error::CompilationError;
use crate::sql::{
    days_ago, parse_extraction_path, parse_table_reference, table_col, typed_null, DataType,
    Dialect, Expr, ExprExt, SqlFragment, TableRef,
};

/// Alias of the event source table.
pub const SOURCE_ALIAS: &str = "e";

/// Alias of the user base table.
pub const USER_ALIAS: &str = "u";

/// The configured source, with every fragment validated for one dialect.
#[derive(Debug, Clone)]
pub struct SourceColumns {
    pub source: TableRef,
    pub user_base: Option<TableRef>,
    pub user_id: SqlFragment,
    pub session_id: SqlFragment,
    pub event: SqlFragment,
    pub timestamp: SqlFragment,
    pub partition: SqlFragment,
    pub properties: SqlFragment,
    pub filters: Vec<SqlFragment>,
    pub segmentation: Vec<SegmentField>,
    pub app_version_path: Option<Vec<String>>,
    pub os_path: Option<Vec<String>>,
    pub entry_point_path: Option<Vec<String>>,
    pub time_period_days: u32,
}

impl SourceColumns {
    pub fn resolve(config: &FunnelConfig, dialect: Dialect) -> Result<Self, CompilationError> {
        let fragment = |field: &str, text: &str| SqlFragment::parse(field, text, dialect);

        let user_id = fragment("user_id_column", &config.user_id_column)?;
        let user_base = config
            .user_base_table
            .as_deref()
            .map(|table| parse_table_reference("user_base_table", table))
            .transpose()?;
        if user_base.is_some() && user_id.identifier().is_none() {
            return Err(CompilationError::InvalidColumnExpression {
                field: "user_id_column".into(),
                expression: config.user_id_column.clone(),
                message: "must be a bare column name when user_base_table is set".into(),
            });
        }

        // Joined, an unqualified column could also resolve against the user
        // base table.
        let joined = user_base.is_some();
        let source_fragment = |field: &str, text: &str| {
            let parsed = fragment(field, text)?;
            Ok::<_, CompilationError>(if joined {
                parsed.qualified(SOURCE_ALIAS)
            } else {
                parsed
            })
        };

        let filters = config
            .filters
            .iter()
            .enumerate()
            .map(|(i, filter)| source_fragment(&format!("filters[{}]", i), filter))
            .collect::<Result<Vec<_>, _>>()?;

        let path = |field: &str, value: &Option<String>| {
            value
                .as_deref()
                .map(|p| parse_extraction_path(field, p))
                .transpose()
        };

        Ok(Self {
            source: parse_table_reference("data_source", &config.data_source)?,
            user_base,
            user_id,
            session_id: source_fragment("session_id_column", &config.session_id_column)?,
            event: source_fragment("event_column", &config.event_column)?,
            timestamp: source_fragment("timestamp_column", &config.timestamp_column)?,
            partition: source_fragment("partition_column", &config.partition_column)?,
            properties: source_fragment("properties_column", &config.properties_column)?,
            filters,
            segmentation: config.user_segmentation_fields.clone(),
            app_version_path: path("app_version_extraction", &config.app_version_extraction)?,
            os_path: path("os_extraction", &config.os_extraction)?,
            entry_point_path: path("entry_point_extraction", &config.entry_point_extraction)?,
            time_period_days: config.time_period_days,
        })
    }

    /// `<source> AS e`
    pub fn source_table(&self) -> TableRef {
        self.source.clone().with_alias(SOURCE_ALIAS)
    }

    /// `LEFT JOIN <user_base> AS u ON e.<user_id> = u.<user_id>`, when configured.
    pub fn user_join(&self) -> Option<(TableRef, Expr)> {
        let table = self.user_base.clone()?.with_alias(USER_ALIAS);
        let key = self.user_id.identifier()?;
        let on = table_col(SOURCE_ALIAS, key).eq(table_col(USER_ALIAS, key));
        Some((table, on))
    }

    pub fn user_id_expr(&self) -> Expr {
        self.user_id.to_operand(Some(SOURCE_ALIAS))
    }

    pub fn session_id_expr(&self) -> Expr {
        self.session_id.to_operand(Some(SOURCE_ALIAS))
    }

    pub fn event_expr(&self) -> Expr {
        self.event.to_operand(Some(SOURCE_ALIAS))
    }

    pub fn timestamp_expr(&self) -> Expr {
        self.timestamp.to_operand(Some(SOURCE_ALIAS))
    }

    /// `u.<field>` when the field is configured, else a typed NULL.
    pub fn segmentation_expr(&self, field: SegmentField) -> Expr {
        if self.user_base.is_some() && self.segmentation.contains(&field) {
            table_col(USER_ALIAS, field.column_name())
        } else {
            typed_null(DataType::String)
        }
    }

    /// Text scalar at `path` of the properties payload, or a typed NULL.
    pub fn extraction_expr(&self, path: &Option<Vec<String>>) -> Expr {
        match path {
            Some(segments) => self
                .properties
                .to_operand(Some(SOURCE_ALIAS))
                .json_scalar(segments.clone())
                .safe_cast(DataType::String),
            None => typed_null(DataType::String),
        }
    }

    /// Configured predicates, each parenthesized.
    pub fn filter_predicates(&self) -> Vec<Expr> {
        self.filters
            .iter()
            .map(|filter| filter.to_operand(Some(SOURCE_ALIAS)))
            .collect()
    }

    /// Partition within `[today - N, today]`.
    pub fn partition_predicates(&self) -> Vec<Expr> {
        let partition = self.partition.to_operand(Some(SOURCE_ALIAS));
        vec![
            partition.clone().gte(days_ago(self.time_period_days)),
            partition.lte(days_ago(0)),
        ]
    }

    /// Event date no older than the lookback window.
    pub fn event_date_predicate(&self) -> Expr {
        self.timestamp_expr()
            .cast(DataType::Date)
            .gte(days_ago(self.time_period_days))
    }
}

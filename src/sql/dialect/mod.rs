//! SQL Dialect definitions and formatting rules.
//!
//! This module provides a trait-based abstraction for SQL dialect differences.
//! Each dialect implements `SqlDialect` to handle its specific syntax:
//!
//! - Identifier quoting: `` ` `` (BigQuery), `"` (DuckDB/Snowflake)
//! - String escaping: `\'` (BigQuery) vs `''`
//! - Timestamp arithmetic: `TIMESTAMP_ADD(.., INTERVAL ..)` vs `DATEADD` vs `+ TO_MINUTES(..)`
//! - Approximate percentiles: `APPROX_QUANTILES(x, 100)[OFFSET(p)]` vs `APPROX_PERCENTILE`
//! - JSON scalar extraction and safe casts
//!
//! # Usage
//!
//! ```ignore
//! use funnel_sql::sql::dialect::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::BigQuery;
//! let quoted = dialect.quote_identifier("user");  // `user`
//! ```
//!
//! All supported dialects have `QUALIFY` and `CREATE OR REPLACE TABLE ... AS`,
//! which the funnel and percentile statements rely on.

mod bigquery;
mod duckdb;
pub mod helpers;
mod snowflake;

pub use bigquery::BigQuery;
pub use duckdb::DuckDb;
pub use snowflake::Snowflake;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::token::{DatePart, Token, TokenStream};
use super::types::DataType;

/// SQL dialect trait - defines how SQL constructs are rendered.
///
/// Implementations handle dialect-specific syntax differences.
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    /// Emit a data type for this dialect.
    fn emit_data_type(&self, dt: DataType) -> &'static str;

    // =========================================================================
    // Casts
    // =========================================================================

    /// `CAST(expr AS type)`, or the null-on-failure variant when `safe`.
    fn emit_cast(&self, expr: &TokenStream, dt: DataType, safe: bool) -> TokenStream {
        helpers::emit_cast_ansi(expr, Token::DataType(dt), safe)
    }

    // =========================================================================
    // Date/Time
    // =========================================================================

    /// `ts + amount part`. `amount` must already be a primary expression.
    fn emit_timestamp_add(
        &self,
        ts: &TokenStream,
        amount: &TokenStream,
        part: DatePart,
    ) -> TokenStream;

    /// `ts - amount part`. `amount` must already be a primary expression.
    fn emit_timestamp_sub(
        &self,
        ts: &TokenStream,
        amount: &TokenStream,
        part: DatePart,
    ) -> TokenStream;

    /// Whole `part`s elapsed from `start` to `end`.
    fn emit_timestamp_diff(
        &self,
        end: &TokenStream,
        start: &TokenStream,
        part: DatePart,
    ) -> TokenStream;

    /// The current date, `days` days ago (`days = 0` is today).
    fn emit_days_ago(&self, days: u32) -> TokenStream;

    /// The statement's current timestamp.
    fn emit_current_timestamp(&self) -> TokenStream;

    // =========================================================================
    // Aggregates
    // =========================================================================

    /// Approximate `percent`th percentile (0..=100) of `expr`.
    fn emit_approx_percentile(&self, expr: &TokenStream, percent: u8) -> TokenStream;

    // =========================================================================
    // Semi-structured Data
    // =========================================================================

    /// Extract the scalar at `path` (object keys, outermost first) from a
    /// JSON-encoded column as a string.
    fn emit_json_extract_scalar(&self, json: &TokenStream, path: &[String]) -> TokenStream;

    // =========================================================================
    // Parsing
    // =========================================================================

    /// The sqlparser dialect used to validate user-supplied fragments.
    fn parser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect>;
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    BigQuery,
    DuckDb,
    Snowflake,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::BigQuery => &BigQuery,
            Dialect::DuckDb => &DuckDb,
            Dialect::Snowflake => &Snowflake,
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn emit_data_type(&self, dt: DataType) -> &'static str {
        self.dialect().emit_data_type(dt)
    }

    fn emit_cast(&self, expr: &TokenStream, dt: DataType, safe: bool) -> TokenStream {
        self.dialect().emit_cast(expr, dt, safe)
    }

    fn emit_timestamp_add(
        &self,
        ts: &TokenStream,
        amount: &TokenStream,
        part: DatePart,
    ) -> TokenStream {
        self.dialect().emit_timestamp_add(ts, amount, part)
    }

    fn emit_timestamp_sub(
        &self,
        ts: &TokenStream,
        amount: &TokenStream,
        part: DatePart,
    ) -> TokenStream {
        self.dialect().emit_timestamp_sub(ts, amount, part)
    }

    fn emit_timestamp_diff(
        &self,
        end: &TokenStream,
        start: &TokenStream,
        part: DatePart,
    ) -> TokenStream {
        self.dialect().emit_timestamp_diff(end, start, part)
    }

    fn emit_days_ago(&self, days: u32) -> TokenStream {
        self.dialect().emit_days_ago(days)
    }

    fn emit_current_timestamp(&self) -> TokenStream {
        self.dialect().emit_current_timestamp()
    }

    fn emit_approx_percentile(&self, expr: &TokenStream, percent: u8) -> TokenStream {
        self.dialect().emit_approx_percentile(expr, percent)
    }

    fn emit_json_extract_scalar(&self, json: &TokenStream, path: &[String]) -> TokenStream {
        self.dialect().emit_json_extract_scalar(json, path)
    }

    fn parser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        self.dialect().parser_dialect()
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bigquery" | "bq" => Ok(Dialect::BigQuery),
            "duckdb" => Ok(Dialect::DuckDb),
            "snowflake" => Ok(Dialect::Snowflake),
            other => Err(format!(
                "unknown dialect '{}' (expected bigquery, duckdb or snowflake)",
                other
            )),
        }
    }
}

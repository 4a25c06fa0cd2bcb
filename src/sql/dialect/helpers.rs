//! Shared helper functions for SQL dialect implementations.
//!
//! This module provides reusable building blocks that dialects can compose
//! to implement the `SqlDialect` trait with minimal duplication.

use super::super::token::{DatePart, Token, TokenStream};
use super::super::types::DataType;

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: DuckDB, Snowflake
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: BigQuery
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

// =============================================================================
// String Quoting
// =============================================================================

/// Quote string with single quotes, doubling embedded quotes (standard SQL).
/// Used by: DuckDB, Snowflake
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Quote string with single quotes, backslash-escaping quotes and backslashes.
/// Used by: BigQuery (which has no `''` escape)
pub fn quote_string_backslash(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

// =============================================================================
// Function Calls
// =============================================================================

/// Emit `NAME(arg, arg, ...)`.
pub fn emit_call(name: &str, args: &[TokenStream]) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.function(name).lparen();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            ts.comma().space();
        }
        ts.append(arg);
    }
    ts.rparen();
    ts
}

/// A single-token stream, for building call arguments.
pub fn single(token: Token) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(token);
    ts
}

/// Emit `INTERVAL amount PART` (BigQuery / DuckDB interval literal).
pub fn emit_interval(amount: &TokenStream, part: DatePart) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::Interval)
        .space()
        .append(amount)
        .space()
        .push(Token::DatePart(part));
    ts
}

/// Emit `CAST(expr AS type)` or `TRY_CAST(expr AS type)`.
/// Used by: DuckDB, Snowflake
pub fn emit_cast_ansi(expr: &TokenStream, type_name: Token, safe: bool) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.function(if safe { "TRY_CAST" } else { "CAST" })
        .lparen()
        .append(expr)
        .space()
        .push(Token::As)
        .space()
        .push(type_name)
        .rparen();
    ts
}

/// JSONPath form used by BigQuery and DuckDB: `$.a.b`.
pub fn json_path_dollar(path: &[String]) -> String {
    let mut out = String::from("$");
    for seg in path {
        out.push('.');
        out.push_str(seg);
    }
    out
}

/// Percentile as a fraction in [0, 1].
pub fn percentile_fraction(percent: u8) -> f64 {
    f64::from(percent) / 100.0
}

// =============================================================================
// Data Type Emission
// =============================================================================

/// Emit data type for DuckDB.
pub fn emit_data_type_duckdb(dt: DataType) -> &'static str {
    match dt {
        DataType::Int64 => "BIGINT",
        DataType::String => "VARCHAR",
        DataType::Date => "DATE",
        DataType::Timestamp => "TIMESTAMP",
    }
}

/// Emit data type for Snowflake.
pub fn emit_data_type_snowflake(dt: DataType) -> &'static str {
    match dt {
        DataType::Int64 => "NUMBER",
        DataType::String => "VARCHAR",
        DataType::Date => "DATE",
        DataType::Timestamp => "TIMESTAMP_NTZ",
    }
}

/// Emit data type for BigQuery.
pub fn emit_data_type_bigquery(dt: DataType) -> &'static str {
    match dt {
        DataType::Int64 => "INT64",
        DataType::String => "STRING",
        DataType::Date => "DATE",
        DataType::Timestamp => "TIMESTAMP",
    }
}

//! SQL generation module.
//!
//! This module provides a type-safe SQL builder that generates multi-dialect SQL.
//! It includes:
//!
//! - [`query`] - SELECT query builder (CTEs, joins, QUALIFY, UNION ALL)
//! - [`expr`] - Expression AST and builder DSL
//! - [`ddl`] - CREATE [OR REPLACE] TABLE ... AS
//! - [`fragment`] - Validation of caller-supplied SQL fragments
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations

pub mod ddl;
pub mod dialect;
pub mod expr;
pub mod fragment;
pub mod query;
pub mod test_utils;
pub mod token;
pub mod types;

// Re-export commonly used types at the sql module level
pub use ddl::CreateTable;
pub use dialect::{Dialect, SqlDialect};
pub use expr::{
    approx_percentile, case_when, col, count_star, current_timestamp, days_ago, lag, lead,
    lit_int, lit_str, row_number, seconds_between, star, table_col, typed_null, Expr, ExprExt,
    SortDir, WindowExt, WindowOrderBy,
};
pub use fragment::{parse_extraction_path, parse_table_reference, SqlFragment};
pub use query::{Cte, OrderByExpr, Query, SelectExpr, TableRef};
pub use token::{DatePart, Token, TokenStream};
pub use types::DataType;

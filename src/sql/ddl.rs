//! DDL (Data Definition Language) support.
//!
//! Only the statement the analysis materialises with is modelled:
//! `CREATE [OR REPLACE] TABLE name AS <query>`.
//!
//! # Examples
//!
//! ```ignore
//! use funnel_sql::sql::ddl::CreateTable;
//! use funnel_sql::sql::{col, Dialect, Query, TableRef};
//!
//! let table = CreateTable::new(TableRef::new("percentiles_by_stage"))
//!     .or_replace()
//!     .as_select(Query::new().select(vec![col("event")]).from(TableRef::new("events")));
//!
//! println!("{}", table.to_sql(Dialect::BigQuery));
//! ```

use super::dialect::Dialect;
use super::query::{Query, TableRef};
use super::token::{Token, TokenStream};

// ============================================================================
// CREATE TABLE
// ============================================================================

/// CREATE TABLE ... AS SELECT statement.
#[derive(Debug, Clone)]
#[must_use = "DDL statements have no effect until converted to SQL with to_sql()"]
pub struct CreateTable {
    pub or_replace: bool,
    pub table: TableRef,
    pub as_query: Box<Query>,
}

impl CreateTable {
    /// Create a new CREATE TABLE statement with an empty query.
    pub fn new(table: TableRef) -> Self {
        Self {
            or_replace: false,
            table,
            as_query: Box::new(Query::new()),
        }
    }

    /// Replace the table if it already exists.
    pub fn or_replace(mut self) -> Self {
        self.or_replace = true;
        self
    }

    /// Populate the table from a SELECT query.
    pub fn as_select(mut self, query: Query) -> Self {
        self.as_query = Box::new(query);
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Create);
        if self.or_replace {
            ts.space()
                .push(Token::Or)
                .space()
                .push(Token::Replace);
        }
        ts.space().push(Token::Table);

        ts.space().push(Token::QualifiedIdent(self.table.parts.clone()));

        ts.space()
            .push(Token::As)
            .newline()
            .append(&self.as_query.to_tokens_for_dialect(dialect));

        ts
    }
}

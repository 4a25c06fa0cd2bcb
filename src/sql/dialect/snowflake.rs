//! Snowflake SQL dialect.
//!
//! Snowflake features:
//! - ANSI identifier quoting (`"`)
//! - Native QUALIFY clause
//! - `DATEADD`/`DATEDIFF` with a leading date part
//! - `APPROX_PERCENTILE(x, fraction)`
//! - `JSON_EXTRACT_PATH_TEXT` for string-encoded JSON

use super::helpers::{self, emit_call, single};
use super::SqlDialect;
use crate::sql::token::{DatePart, Token, TokenStream};
use crate::sql::types::DataType;

/// Snowflake SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Snowflake;

impl SqlDialect for Snowflake {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn emit_data_type(&self, dt: DataType) -> &'static str {
        helpers::emit_data_type_snowflake(dt)
    }

    fn emit_timestamp_add(
        &self,
        ts: &TokenStream,
        amount: &TokenStream,
        part: DatePart,
    ) -> TokenStream {
        emit_call(
            "DATEADD",
            &[single(Token::DatePart(part)), amount.clone(), ts.clone()],
        )
    }

    fn emit_timestamp_sub(
        &self,
        ts: &TokenStream,
        amount: &TokenStream,
        part: DatePart,
    ) -> TokenStream {
        let mut negated = TokenStream::new();
        negated.push(Token::Minus).lparen().append(amount).rparen();
        emit_call(
            "DATEADD",
            &[single(Token::DatePart(part)), negated, ts.clone()],
        )
    }

    fn emit_timestamp_diff(
        &self,
        end: &TokenStream,
        start: &TokenStream,
        part: DatePart,
    ) -> TokenStream {
        emit_call(
            "DATEDIFF",
            &[single(Token::DatePart(part)), start.clone(), end.clone()],
        )
    }

    fn emit_days_ago(&self, days: u32) -> TokenStream {
        if days == 0 {
            return emit_call("CURRENT_DATE", &[]);
        }
        emit_call(
            "DATEADD",
            &[
                single(Token::DatePart(DatePart::Day)),
                single(Token::LitInt(-i64::from(days))),
                emit_call("CURRENT_DATE", &[]),
            ],
        )
    }

    fn emit_current_timestamp(&self) -> TokenStream {
        emit_call("CURRENT_TIMESTAMP", &[])
    }

    fn emit_approx_percentile(&self, expr: &TokenStream, percent: u8) -> TokenStream {
        emit_call(
            "APPROX_PERCENTILE",
            &[
                expr.clone(),
                single(Token::LitFloat(helpers::percentile_fraction(percent))),
            ],
        )
    }

    fn emit_json_extract_scalar(&self, json: &TokenStream, path: &[String]) -> TokenStream {
        emit_call(
            "JSON_EXTRACT_PATH_TEXT",
            &[json.clone(), single(Token::LitString(path.join(".")))],
        )
    }

    fn parser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        Box::new(sqlparser::dialect::SnowflakeDialect {})
    }
}

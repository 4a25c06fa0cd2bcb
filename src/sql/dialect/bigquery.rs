//! BigQuery SQL dialect.
//!
//! BigQuery features:
//! - Backtick identifier quoting, one pair per path component
//! - Backslash escapes in string literals
//! - QUALIFY clause support
//! - `TIMESTAMP_ADD`/`TIMESTAMP_SUB` with `INTERVAL n PART`
//! - `APPROX_QUANTILES(x, n)[OFFSET(k)]` for approximate percentiles
//! - `SAFE_CAST` returns NULL on failure

use super::helpers::{self, emit_call, single};
use super::SqlDialect;
use crate::sql::token::{DatePart, Token, TokenStream};
use crate::sql::types::DataType;

/// BigQuery SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct BigQuery;

impl SqlDialect for BigQuery {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_backslash(s)
    }

    fn emit_data_type(&self, dt: DataType) -> &'static str {
        helpers::emit_data_type_bigquery(dt)
    }

    fn emit_cast(&self, expr: &TokenStream, dt: DataType, safe: bool) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.function(if safe { "SAFE_CAST" } else { "CAST" })
            .lparen()
            .append(expr)
            .space()
            .push(Token::As)
            .space()
            .push(Token::DataType(dt))
            .rparen();
        ts
    }

    fn emit_timestamp_add(
        &self,
        ts: &TokenStream,
        amount: &TokenStream,
        part: DatePart,
    ) -> TokenStream {
        emit_call(
            "TIMESTAMP_ADD",
            &[ts.clone(), helpers::emit_interval(amount, part)],
        )
    }

    fn emit_timestamp_sub(
        &self,
        ts: &TokenStream,
        amount: &TokenStream,
        part: DatePart,
    ) -> TokenStream {
        emit_call(
            "TIMESTAMP_SUB",
            &[ts.clone(), helpers::emit_interval(amount, part)],
        )
    }

    fn emit_timestamp_diff(
        &self,
        end: &TokenStream,
        start: &TokenStream,
        part: DatePart,
    ) -> TokenStream {
        emit_call(
            "TIMESTAMP_DIFF",
            &[end.clone(), start.clone(), single(Token::DatePart(part))],
        )
    }

    fn emit_days_ago(&self, days: u32) -> TokenStream {
        let today = emit_call("CURRENT_DATE", &[]);
        if days == 0 {
            return today;
        }
        let interval = helpers::emit_interval(&single(Token::LitInt(i64::from(days))), DatePart::Day);
        emit_call("DATE_SUB", &[today, interval])
    }

    fn emit_current_timestamp(&self) -> TokenStream {
        emit_call("CURRENT_TIMESTAMP", &[])
    }

    fn emit_approx_percentile(&self, expr: &TokenStream, percent: u8) -> TokenStream {
        let mut ts = emit_call("APPROX_QUANTILES", &[expr.clone(), single(Token::LitInt(100))]);
        ts.push(Token::LBracket)
            .append(&emit_call("OFFSET", &[single(Token::LitInt(i64::from(percent)))]))
            .push(Token::RBracket);
        ts
    }

    fn emit_json_extract_scalar(&self, json: &TokenStream, path: &[String]) -> TokenStream {
        emit_call(
            "JSON_EXTRACT_SCALAR",
            &[
                json.clone(),
                single(Token::LitString(helpers::json_path_dollar(path))),
            ],
        )
    }

    fn parser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        Box::new(sqlparser::dialect::BigQueryDialect {})
    }
}

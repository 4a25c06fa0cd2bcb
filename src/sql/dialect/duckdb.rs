//! DuckDB SQL dialect.
//!
//! DuckDB is PostgreSQL-compatible with extensions:
//! - ANSI identifier quoting (`"`)
//! - QUALIFY clause for window functions
//! - TRY_CAST for safe casting
//! - Interval constructors (`TO_MINUTES(n)`) accept arbitrary integer expressions
//! - `DATE - INTEGER` yields a DATE

use super::helpers::{self, emit_call, single};
use super::SqlDialect;
use crate::sql::token::{DatePart, Token, TokenStream};
use crate::sql::types::DataType;

/// DuckDB SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct DuckDb;

fn interval_constructor(part: DatePart) -> &'static str {
    match part {
        DatePart::Second => "TO_SECONDS",
        DatePart::Minute => "TO_MINUTES",
        DatePart::Day => "TO_DAYS",
    }
}

fn shift(ts: &TokenStream, op: Token, amount: &TokenStream, part: DatePart) -> TokenStream {
    let mut out = TokenStream::new();
    out.lparen()
        .append(ts)
        .space()
        .push(op)
        .space()
        .append(&emit_call(interval_constructor(part), &[amount.clone()]))
        .rparen();
    out
}

impl SqlDialect for DuckDb {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn emit_data_type(&self, dt: DataType) -> &'static str {
        helpers::emit_data_type_duckdb(dt)
    }

    fn emit_timestamp_add(
        &self,
        ts: &TokenStream,
        amount: &TokenStream,
        part: DatePart,
    ) -> TokenStream {
        shift(ts, Token::Plus, amount, part)
    }

    fn emit_timestamp_sub(
        &self,
        ts: &TokenStream,
        amount: &TokenStream,
        part: DatePart,
    ) -> TokenStream {
        shift(ts, Token::Minus, amount, part)
    }

    fn emit_timestamp_diff(
        &self,
        end: &TokenStream,
        start: &TokenStream,
        part: DatePart,
    ) -> TokenStream {
        let unit = single(Token::LitString(part.as_str().to_ascii_lowercase()));
        emit_call("DATE_DIFF", &[unit, start.clone(), end.clone()])
    }

    fn emit_days_ago(&self, days: u32) -> TokenStream {
        let mut ts = TokenStream::new();
        if days == 0 {
            ts.function("CURRENT_DATE");
            return ts;
        }
        ts.lparen()
            .function("CURRENT_DATE")
            .space()
            .push(Token::Minus)
            .space()
            .push(Token::LitInt(i64::from(days)))
            .rparen();
        ts
    }

    fn emit_current_timestamp(&self) -> TokenStream {
        single(Token::FunctionName("CURRENT_TIMESTAMP".into()))
    }

    fn emit_approx_percentile(&self, expr: &TokenStream, percent: u8) -> TokenStream {
        emit_call(
            "APPROX_QUANTILE",
            &[
                expr.clone(),
                single(Token::LitFloat(helpers::percentile_fraction(percent))),
            ],
        )
    }

    fn emit_json_extract_scalar(&self, json: &TokenStream, path: &[String]) -> TokenStream {
        emit_call(
            "JSON_EXTRACT_STRING",
            &[
                json.clone(),
                single(Token::LitString(helpers::json_path_dollar(path))),
            ],
        )
    }

    fn parser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        Box::new(sqlparser::dialect::DuckDbDialect {})
    }
}

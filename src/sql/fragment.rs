//! Caller-supplied SQL fragments: column expressions, filter predicates,
//! table references and JSON extraction paths.
//!
//! Expressions are parsed with sqlparser for the target dialect and must be
//! exactly one expression. What reaches the output is sqlparser's rendering
//! of the parsed AST, never the caller's text, so comments and statement
//! separators cannot survive into generated SQL.

use std::ops::ControlFlow;
use std::sync::LazyLock;

use regex::Regex;
use sqlparser::ast::{visit_expressions, visit_expressions_mut, Expr as AstExpr, Ident};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token as SqlToken;

use super::dialect::{Dialect, SqlDialect};
use super::expr::{table_col, Expr};
use super::query::TableRef;
use crate::error::CompilationError;

/// One part of a dotted table reference (BigQuery project ids allow `-`).
static TABLE_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_$-]+$").unwrap());

/// One segment of a JSON extraction path.
static PATH_SEGMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

/// A validated SQL expression fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFragment {
    ast: AstExpr,
    canonical: String,
    identifier: Option<String>,
}

impl SqlFragment {
    /// Parse `text` as a single expression in `dialect`.
    ///
    /// `field` names the configuration field for error reporting.
    pub fn parse(field: &str, text: &str, dialect: Dialect) -> Result<Self, CompilationError> {
        let invalid = |message: String| CompilationError::InvalidColumnExpression {
            field: field.to_string(),
            expression: text.to_string(),
            message,
        };

        let parser_dialect = dialect.parser_dialect();
        let mut parser = Parser::new(&*parser_dialect)
            .try_with_sql(text)
            .map_err(|e| invalid(e.to_string()))?;
        let ast = parser.parse_expr().map_err(|e| invalid(e.to_string()))?;

        let next = parser.peek_token();
        if next.token != SqlToken::EOF {
            return Err(invalid(format!(
                "unexpected trailing input starting at '{}'",
                next.token
            )));
        }

        let identifier = match &ast {
            AstExpr::Identifier(ident) => Some(ident.value.clone()),
            _ => None,
        };

        Ok(Self {
            canonical: ast.to_string(),
            identifier,
            ast,
        })
    }

    /// Prefix every unqualified column reference with `table_alias`.
    ///
    /// Bare identifiers are already qualified by [`to_expr`](Self::to_expr).
    /// Fragments containing a subquery are returned as written.
    pub fn qualified(&self, table_alias: &str) -> Self {
        if self.identifier.is_some() || contains_subquery(&self.ast) {
            return self.clone();
        }

        let mut ast = self.ast.clone();
        let _ = visit_expressions_mut(&mut ast, |expr| {
            if let AstExpr::Identifier(ident) = expr {
                let column = ident.clone();
                *expr = AstExpr::CompoundIdentifier(vec![Ident::new(table_alias), column]);
            }
            ControlFlow::<()>::Continue(())
        });

        Self {
            canonical: ast.to_string(),
            identifier: None,
            ast,
        }
    }

    /// The bare column name, when the fragment is a single identifier.
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// The re-rendered expression text.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// The fragment as an expression. Bare identifiers are qualified with
    /// `table_alias` when given; compound expressions are emitted as parsed.
    pub fn to_expr(&self, table_alias: Option<&str>) -> Expr {
        match (&self.identifier, table_alias) {
            (Some(name), Some(alias)) => table_col(alias, name),
            (Some(name), None) => super::expr::col(name),
            (None, _) => Expr::Raw(self.canonical.clone()),
        }
    }

    /// The fragment in a position where it must bind as one operand.
    pub fn to_operand(&self, table_alias: Option<&str>) -> Expr {
        match self.to_expr(table_alias) {
            raw @ Expr::Raw(_) => Expr::Paren(Box::new(raw)),
            other => other,
        }
    }
}

fn contains_subquery(ast: &AstExpr) -> bool {
    visit_expressions(ast, |expr| match expr {
        AstExpr::Subquery(_) | AstExpr::InSubquery { .. } | AstExpr::Exists { .. } => {
            ControlFlow::Break(())
        }
        _ => ControlFlow::Continue(()),
    })
    .is_break()
}

/// Split a dotted table reference into 1 to 3 non-empty names.
pub fn parse_table_reference(field: &str, reference: &str) -> Result<TableRef, CompilationError> {
    let invalid = || CompilationError::InvalidTableReference {
        field: field.to_string(),
        reference: reference.to_string(),
    };

    let trimmed = reference.trim().trim_matches('`');
    let parts: Vec<String> = trimmed.split('.').map(|p| p.trim().to_string()).collect();

    if parts.is_empty() || parts.len() > 3 {
        return Err(invalid());
    }
    if !parts.iter().all(|part| TABLE_PART.is_match(part)) {
        return Err(invalid());
    }

    Ok(TableRef::from_parts(parts))
}

/// Split an extraction path (`device:os` or `device.os`) into segments.
pub fn parse_extraction_path(field: &str, path: &str) -> Result<Vec<String>, CompilationError> {
    let segments: Vec<String> = path
        .trim()
        .split([':', '.'])
        .map(str::to_string)
        .collect();

    if segments.iter().all(|segment| PATH_SEGMENT.is_match(segment)) {
        Ok(segments)
    } else {
        Err(CompilationError::InvalidExtractionPath {
            field: field.to_string(),
            path: path.to_string(),
        })
    }
}

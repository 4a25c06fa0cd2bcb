//! Expression AST - the core of SQL expression building.
//!
//! This module provides a strongly-typed AST for SQL expressions
//! with exhaustive pattern matching enforced by the compiler.
//! Constructs whose spelling differs between warehouses (casts, timestamp
//! arithmetic, percentiles, JSON extraction) are delegated to the dialect.

use super::dialect::{Dialect, SqlDialect};
use super::token::{DatePart, Token, TokenStream};
use super::types::DataType;

// =============================================================================
// Expression AST
// =============================================================================

/// A SQL expression.
///
/// Every variant must be handled in `to_tokens_for_dialect()` - the compiler enforces this.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference: optional_table.column
    Column {
        table: Option<String>,
        column: String,
    },

    /// Literal values
    Literal(Literal),

    /// Binary operation: left op right
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },

    /// Function call: name(args...)
    Function { name: String, args: Vec<Expr> },

    /// CASE WHEN... THEN... ELSE... END
    Case {
        when_clauses: Vec<(Expr, Expr)>,
        else_clause: Option<Box<Expr>>,
    },

    /// IN: expr IN (values...)
    In { expr: Box<Expr>, values: Vec<Expr> },

    /// expr IS NOT NULL
    IsNotNull(Box<Expr>),

    /// Wildcard: *
    Star,

    /// Parenthesized expression
    Paren(Box<Expr>),

    /// Window function expression.
    ///
    /// Example: `LEAD(ts) OVER (PARTITION BY actor ORDER BY ts)`
    WindowFunction {
        /// The function being windowed (usually Expr::Function)
        function: Box<Expr>,
        /// PARTITION BY expressions
        partition_by: Vec<Expr>,
        /// ORDER BY within window
        order_by: Vec<WindowOrderBy>,
    },

    /// CAST / safe cast to a SQL type.
    Cast {
        expr: Box<Expr>,
        data_type: DataType,
        /// NULL instead of an error when the value does not convert.
        safe: bool,
    },

    /// Timestamp shifted forwards or backwards by `amount` units.
    TimestampShift {
        expr: Box<Expr>,
        amount: Box<Expr>,
        part: DatePart,
        backwards: bool,
    },

    /// Whole units elapsed from `start` to `end`.
    TimestampDiff {
        end: Box<Expr>,
        start: Box<Expr>,
        part: DatePart,
    },

    /// Today's date minus a number of days.
    DaysAgo(u32),

    /// Current timestamp of the statement.
    CurrentTimestamp,

    /// Approximate percentile aggregate.
    ApproxPercentile { expr: Box<Expr>, percent: u8 },

    /// Scalar string extracted from a JSON-encoded column.
    JsonExtractScalar { expr: Box<Expr>, path: Vec<String> },

    /// Raw SQL expression passed directly to output without escaping.
    ///
    /// # Security Warning
    ///
    /// **Never pass user input to this variant.** Only use with:
    /// - Trusted, static SQL fragments
    /// - Text re-rendered from a parsed AST (see [`crate::sql::fragment::SqlFragment`])
    ///
    /// For user-provided values, use `Expr::Literal` variants which properly
    /// escape content for the target dialect.
    Raw(String),
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    String(String),
    Null,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    Lte,
    Gte,
    // Logical
    And,
    // Arithmetic
    Minus,
}

// =============================================================================
// Window Function Types
// =============================================================================

/// ORDER BY expression within a window specification.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowOrderBy {
    pub expr: Expr,
    pub dir: Option<SortDir>,
}

impl WindowOrderBy {
    pub fn new(expr: Expr) -> Self {
        Self { expr, dir: None }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            dir: Some(SortDir::Desc),
        }
    }
}

/// Sort direction (shared with query ORDER BY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

// =============================================================================
// Expression to Tokens
// =============================================================================

impl Expr {
    /// Convert this expression to a token stream for a specific dialect.
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        match self {
            Expr::Column { table, column } => {
                if let Some(t) = table {
                    ts.push(Token::Ident(t.clone()));
                    ts.push(Token::Dot);
                }
                ts.push(Token::Ident(column.clone()));
            }

            Expr::Literal(lit) => {
                ts.push(match lit {
                    Literal::Int(n) => Token::LitInt(*n),
                    Literal::String(s) => Token::LitString(s.clone()),
                    Literal::Null => Token::LitNull,
                });
            }

            Expr::BinaryOp { left, op, right } => {
                ts.append(&left.to_tokens_for_dialect(dialect));
                ts.space();
                ts.push(binary_op_to_token(*op));
                ts.space();
                ts.append(&right.to_tokens_for_dialect(dialect));
            }

            Expr::Function { name, args } => {
                ts.push(Token::FunctionName(name.clone()));
                ts.lparen();
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        ts.comma().space();
                    }
                    ts.append(&arg.to_tokens_for_dialect(dialect));
                }
                ts.rparen();
            }

            Expr::Case {
                when_clauses,
                else_clause,
            } => {
                ts.push(Token::Case);
                for (when, then) in when_clauses {
                    ts.space().push(Token::When).space();
                    ts.append(&when.to_tokens_for_dialect(dialect));
                    ts.space().push(Token::Then).space();
                    ts.append(&then.to_tokens_for_dialect(dialect));
                }
                if let Some(else_expr) = else_clause {
                    ts.space().push(Token::Else).space();
                    ts.append(&else_expr.to_tokens_for_dialect(dialect));
                }
                ts.space().push(Token::End);
            }

            Expr::In { expr, values } => {
                // "x IN ()" is invalid SQL; an empty list matches nothing.
                if values.is_empty() {
                    ts.push(Token::False);
                } else {
                    ts.append(&expr.to_tokens_for_dialect(dialect));
                    ts.space().push(Token::In).space().lparen();
                    for (i, val) in values.iter().enumerate() {
                        if i > 0 {
                            ts.comma().space();
                        }
                        ts.append(&val.to_tokens_for_dialect(dialect));
                    }
                    ts.rparen();
                }
            }

            Expr::IsNotNull(expr) => {
                ts.append(&expr.to_tokens_for_dialect(dialect));
                ts.space().push(Token::IsNotNull);
            }

            Expr::Star => {
                ts.push(Token::Star);
            }

            Expr::Paren(inner) => {
                ts.lparen();
                ts.append(&inner.to_tokens_for_dialect(dialect));
                ts.rparen();
            }

            Expr::WindowFunction {
                function,
                partition_by,
                order_by,
            } => {
                ts.append(&function.to_tokens_for_dialect(dialect));

                // OVER (...)
                ts.space().push(Token::Over).space().lparen();

                if !partition_by.is_empty() {
                    ts.push(Token::PartitionBy).space();
                    for (i, expr) in partition_by.iter().enumerate() {
                        if i > 0 {
                            ts.comma().space();
                        }
                        ts.append(&expr.to_tokens_for_dialect(dialect));
                    }
                }

                if !order_by.is_empty() {
                    if !partition_by.is_empty() {
                        ts.space();
                    }
                    ts.push(Token::OrderBy).space();
                    for (i, ob) in order_by.iter().enumerate() {
                        if i > 0 {
                            ts.comma().space();
                        }
                        ts.append(&ob.expr.to_tokens_for_dialect(dialect));
                        if let Some(dir) = &ob.dir {
                            ts.space().push(match dir {
                                SortDir::Asc => Token::Asc,
                                SortDir::Desc => Token::Desc,
                            });
                        }
                    }
                }

                ts.rparen();
            }

            Expr::Cast {
                expr,
                data_type,
                safe,
            } => {
                let inner = expr.to_tokens_for_dialect(dialect);
                ts.append(&dialect.emit_cast(&inner, *data_type, *safe));
            }

            Expr::TimestampShift {
                expr,
                amount,
                part,
                backwards,
            } => {
                let base = expr.to_tokens_for_dialect(dialect);
                let amount = amount.primary_tokens(dialect);
                ts.append(&if *backwards {
                    dialect.emit_timestamp_sub(&base, &amount, *part)
                } else {
                    dialect.emit_timestamp_add(&base, &amount, *part)
                });
            }

            Expr::TimestampDiff { end, start, part } => {
                let end = end.to_tokens_for_dialect(dialect);
                let start = start.to_tokens_for_dialect(dialect);
                ts.append(&dialect.emit_timestamp_diff(&end, &start, *part));
            }

            Expr::DaysAgo(days) => {
                ts.append(&dialect.emit_days_ago(*days));
            }

            Expr::CurrentTimestamp => {
                ts.append(&dialect.emit_current_timestamp());
            }

            Expr::ApproxPercentile { expr, percent } => {
                let inner = expr.to_tokens_for_dialect(dialect);
                ts.append(&dialect.emit_approx_percentile(&inner, *percent));
            }

            Expr::JsonExtractScalar { expr, path } => {
                let inner = expr.to_tokens_for_dialect(dialect);
                ts.append(&dialect.emit_json_extract_scalar(&inner, path));
            }

            Expr::Raw(sql) => {
                ts.push(Token::Raw(sql.clone()));
            }
        }

        ts
    }

    /// Tokens for use where a single operand is expected (e.g. after
    /// `INTERVAL`); compound expressions are parenthesized.
    fn primary_tokens(&self, dialect: Dialect) -> TokenStream {
        match self {
            Expr::Column { .. } | Expr::Literal(_) | Expr::Function { .. } | Expr::Paren(_) => {
                self.to_tokens_for_dialect(dialect)
            }
            _ => Expr::Paren(Box::new(self.clone())).to_tokens_for_dialect(dialect),
        }
    }
}

fn binary_op_to_token(op: BinaryOperator) -> Token {
    match op {
        BinaryOperator::Eq => Token::Eq,
        BinaryOperator::Lte => Token::Lte,
        BinaryOperator::Gte => Token::Gte,
        BinaryOperator::And => Token::And,
        BinaryOperator::Minus => Token::Minus,
    }
}

// =============================================================================
// Expression Constructors
// =============================================================================

/// Create a column reference.
pub fn col(name: &str) -> Expr {
    Expr::Column {
        table: None,
        column: name.into(),
    }
}

/// Create a qualified column reference (table.column).
pub fn table_col(table: &str, column: &str) -> Expr {
    Expr::Column {
        table: Some(table.into()),
        column: column.into(),
    }
}

/// Create an integer literal.
pub fn lit_int(n: i64) -> Expr {
    Expr::Literal(Literal::Int(n))
}

/// Create a string literal.
pub fn lit_str(s: &str) -> Expr {
    Expr::Literal(Literal::String(s.into()))
}

/// Create a NULL literal.
pub fn lit_null() -> Expr {
    Expr::Literal(Literal::Null)
}

/// Create a star (*) expression.
pub fn star() -> Expr {
    Expr::Star
}

/// `CAST(NULL AS type)` - a NULL that still carries a column type.
pub fn typed_null(data_type: DataType) -> Expr {
    Expr::Cast {
        expr: Box::new(lit_null()),
        data_type,
        safe: false,
    }
}

/// `CASE WHEN .. THEN .. [ELSE ..] END`
pub fn case_when(when_clauses: Vec<(Expr, Expr)>, else_clause: Option<Expr>) -> Expr {
    Expr::Case {
        when_clauses,
        else_clause: else_clause.map(Box::new),
    }
}

// =============================================================================
// Aggregate Functions
// =============================================================================

/// COUNT(*)
pub fn count_star() -> Expr {
    Expr::Function {
        name: "COUNT".into(),
        args: vec![star()],
    }
}

/// Generic function call.
pub fn func(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Function {
        name: name.into(),
        args,
    }
}

/// Approximate percentile (0..=100).
pub fn approx_percentile(expr: Expr, percent: u8) -> Expr {
    Expr::ApproxPercentile {
        expr: Box::new(expr),
        percent,
    }
}

// =============================================================================
// Window Functions
// =============================================================================

/// ROW_NUMBER() - assigns sequential row numbers.
pub fn row_number() -> Expr {
    func("ROW_NUMBER", vec![])
}

/// LAG(expr) - access previous row value.
pub fn lag(expr: Expr) -> Expr {
    func("LAG", vec![expr])
}

/// LEAD(expr) - access next row value.
pub fn lead(expr: Expr) -> Expr {
    func("LEAD", vec![expr])
}

// =============================================================================
// Temporal
// =============================================================================

/// Whole seconds elapsed from `start` to `end`.
pub fn seconds_between(start: Expr, end: Expr) -> Expr {
    Expr::TimestampDiff {
        end: Box::new(end),
        start: Box::new(start),
        part: DatePart::Second,
    }
}

/// Today's date minus `days` days.
pub fn days_ago(days: u32) -> Expr {
    Expr::DaysAgo(days)
}

/// The statement's current timestamp.
pub fn current_timestamp() -> Expr {
    Expr::CurrentTimestamp
}

// =============================================================================
// Window Builder
// =============================================================================

/// Builder for creating window function expressions.
#[derive(Debug, Clone)]
#[must_use = "WindowBuilder has no effect until build() is called"]
pub struct WindowBuilder {
    function: Expr,
    partition_by: Vec<Expr>,
    order_by: Vec<WindowOrderBy>,
}

impl WindowBuilder {
    /// Create a new window builder for the given function.
    pub fn new(function: Expr) -> Self {
        Self {
            function,
            partition_by: vec![],
            order_by: vec![],
        }
    }

    /// Add PARTITION BY expressions.
    pub fn partition_by(mut self, exprs: Vec<Expr>) -> Self {
        self.partition_by = exprs;
        self
    }

    /// Add ORDER BY expressions.
    pub fn order_by(mut self, exprs: Vec<WindowOrderBy>) -> Self {
        self.order_by = exprs;
        self
    }

    /// Build the window function expression.
    pub fn build(self) -> Expr {
        Expr::WindowFunction {
            function: Box::new(self.function),
            partition_by: self.partition_by,
            order_by: self.order_by,
        }
    }
}

/// Extension trait for adding OVER clause to expressions.
pub trait WindowExt: Sized {
    /// Start building a window function with OVER clause.
    fn over(self) -> WindowBuilder;
}

impl WindowExt for Expr {
    fn over(self) -> WindowBuilder {
        WindowBuilder::new(self)
    }
}

// =============================================================================
// Expression Builder Trait
// =============================================================================

/// Extension trait for building expressions fluently.
pub trait ExprExt: Sized {
    fn into_expr(self) -> Expr;

    // Comparison operators
    fn eq(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Eq, other.into())
    }

    fn gte(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Gte, other.into())
    }

    fn lte(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Lte, other.into())
    }

    // Logical operators
    fn and(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::And, other.into())
    }

    // Arithmetic operators
    fn sub(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Minus, other.into())
    }

    // NULL checks
    #[allow(clippy::wrong_self_convention)]
    fn is_not_null(self) -> Expr {
        Expr::IsNotNull(Box::new(self.into_expr()))
    }

    // IN operator
    fn in_list(self, values: Vec<Expr>) -> Expr {
        Expr::In {
            expr: Box::new(self.into_expr()),
            values,
        }
    }

    // Casts
    fn cast(self, data_type: DataType) -> Expr {
        Expr::Cast {
            expr: Box::new(self.into_expr()),
            data_type,
            safe: false,
        }
    }

    fn safe_cast(self, data_type: DataType) -> Expr {
        Expr::Cast {
            expr: Box::new(self.into_expr()),
            data_type,
            safe: true,
        }
    }

    // Timestamp arithmetic
    fn plus_minutes(self, amount: impl Into<Expr>) -> Expr {
        Expr::TimestampShift {
            expr: Box::new(self.into_expr()),
            amount: Box::new(amount.into()),
            part: DatePart::Minute,
            backwards: false,
        }
    }

    fn minus_minutes(self, amount: impl Into<Expr>) -> Expr {
        Expr::TimestampShift {
            expr: Box::new(self.into_expr()),
            amount: Box::new(amount.into()),
            part: DatePart::Minute,
            backwards: true,
        }
    }

    /// Scalar string at `path` inside this JSON-encoded column.
    fn json_scalar(self, path: Vec<String>) -> Expr {
        Expr::JsonExtractScalar {
            expr: Box::new(self.into_expr()),
            path,
        }
    }

    /// Alias this expression (for SELECT list).
    fn alias(self, name: &str) -> crate::sql::query::SelectExpr {
        crate::sql::query::SelectExpr {
            expr: self.into_expr(),
            alias: Some(name.into()),
        }
    }
}

fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

impl ExprExt for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        lit_int(n)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        lit_str(s)
    }
}

// =============================================================================
// Tests
// =============================================================================

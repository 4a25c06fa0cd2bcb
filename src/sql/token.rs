//! SQL Tokens - the atomic units of SQL output.
//!
//! Tokens are dialect-agnostic representations that serialize
//! to dialect-specific strings. String literals and identifiers only ever
//! reach the output through [`SqlDialect::quote_string`] and
//! [`SqlDialect::quote_identifier`].

use super::dialect::{Dialect, SqlDialect};
use super::types::DataType;

/// Unit used by interval arithmetic and timestamp differences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Second,
    Minute,
    Day,
}

impl DatePart {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatePart::Second => "SECOND",
            DatePart::Minute => "MINUTE",
            DatePart::Day => "DAY",
        }
    }
}

/// SQL Token - every possible element in a SQL statement.
///
/// Adding a new variant here will cause compile errors everywhere
/// it needs to be handled (exhaustive matching).
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // === Keywords ===
    Select,
    From,
    Where,
    And,
    Or,
    As,
    On,
    Join,
    Left,
    GroupBy,
    Qualify,
    OrderBy,
    Asc,
    Desc,
    Case,
    When,
    Then,
    Else,
    End,
    In,
    IsNotNull,
    All,
    Union,
    With,
    False,
    Interval,

    // === Window Function Keywords ===
    Over,
    PartitionBy,

    // === DDL Keywords ===
    Create,
    Table,
    Replace,

    // === Punctuation ===
    Comma,
    Dot,
    Star,
    LParen,
    RParen,
    LBracket,
    RBracket,

    // === Operators ===
    Eq,
    Lte,
    Gte,
    Plus,
    Minus,

    // === Whitespace / Formatting ===
    Space,
    Newline,
    Indent(usize),

    // === Dynamic Content ===
    /// Simple identifier (table, column, alias)
    Ident(String),
    /// Dotted identifier: catalog.schema.table, schema.table or just table
    QualifiedIdent(Vec<String>),
    /// Integer literal
    LitInt(i64),
    /// Float literal
    LitFloat(f64),
    /// String literal
    LitString(String),
    /// NULL literal
    LitNull,
    /// Date part keyword for interval arithmetic (MINUTE, SECOND, DAY)
    DatePart(DatePart),
    /// Data type name, spelled per dialect
    DataType(DataType),

    // === Function Names ===
    /// Function name - rendered upper-cased
    FunctionName(String),

    // === Escape Hatch ===
    /// SQL passed directly to output without escaping.
    ///
    /// # Security Warning
    ///
    /// **Never pass user input to this variant.** Only use with:
    /// - Trusted, static SQL fragments
    /// - Fragments re-rendered from a parsed AST by [`crate::sql::fragment::SqlFragment`]
    ///
    /// For user-provided values, use `Token::LitString`, `Token::LitInt`, etc.
    /// which properly escape content for the target dialect.
    Raw(String),
}

impl Token {
    /// Serialize this token to a string for the given dialect.
    pub fn serialize(&self, dialect: Dialect) -> String {
        match self {
            // Keywords
            Token::Select => "SELECT".into(),
            Token::From => "FROM".into(),
            Token::Where => "WHERE".into(),
            Token::And => "AND".into(),
            Token::Or => "OR".into(),
            Token::As => "AS".into(),
            Token::On => "ON".into(),
            Token::Join => "JOIN".into(),
            Token::Left => "LEFT".into(),
            Token::GroupBy => "GROUP BY".into(),
            Token::Qualify => "QUALIFY".into(),
            Token::OrderBy => "ORDER BY".into(),
            Token::Asc => "ASC".into(),
            Token::Desc => "DESC".into(),
            Token::Case => "CASE".into(),
            Token::When => "WHEN".into(),
            Token::Then => "THEN".into(),
            Token::Else => "ELSE".into(),
            Token::End => "END".into(),
            Token::In => "IN".into(),
            Token::IsNotNull => "IS NOT NULL".into(),
            Token::All => "ALL".into(),
            Token::Union => "UNION".into(),
            Token::With => "WITH".into(),
            Token::False => "FALSE".into(),
            Token::Interval => "INTERVAL".into(),

            // Window function keywords
            Token::Over => "OVER".into(),
            Token::PartitionBy => "PARTITION BY".into(),

            // DDL keywords
            Token::Create => "CREATE".into(),
            Token::Table => "TABLE".into(),
            Token::Replace => "REPLACE".into(),

            // Punctuation
            Token::Comma => ",".into(),
            Token::Dot => ".".into(),
            Token::Star => "*".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::LBracket => "[".into(),
            Token::RBracket => "]".into(),

            // Operators
            Token::Eq => "=".into(),
            Token::Lte => "<=".into(),
            Token::Gte => ">=".into(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),

            // Whitespace
            Token::Space => " ".into(),
            Token::Newline => "\n".into(),
            Token::Indent(n) => "  ".repeat(*n),

            // Dynamic - dialect-specific formatting
            Token::Ident(name) => dialect.quote_identifier(name),
            Token::QualifiedIdent(parts) => parts
                .iter()
                .map(|p| dialect.quote_identifier(p))
                .collect::<Vec<_>>()
                .join("."),
            Token::LitInt(n) => n.to_string(),
            Token::LitFloat(f) => {
                if f.is_nan() {
                    panic!("Cannot serialize NaN to SQL")
                }
                if f.is_infinite() {
                    panic!("Cannot serialize Infinity to SQL")
                }
                let mut buffer = ryu::Buffer::new();
                buffer.format(*f).to_string()
            }
            Token::LitString(s) => dialect.quote_string(s),
            Token::LitNull => "NULL".into(),
            Token::DatePart(part) => part.as_str().into(),
            Token::DataType(dt) => dialect.emit_data_type(*dt).into(),

            Token::FunctionName(name) => name.to_uppercase(),

            // Escape hatch
            Token::Raw(s) => s.clone(),
        }
    }
}

/// A stream of tokens that can be serialized to SQL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    /// Create an empty token stream.
    pub fn new() -> Self {
        Self { tokens: vec![] }
    }

    /// Push a single token.
    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    /// Extend with multiple tokens.
    pub fn extend(&mut self, tokens: impl IntoIterator<Item = Token>) -> &mut Self {
        self.tokens.extend(tokens);
        self
    }

    /// Append another token stream.
    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Serialize all tokens to a SQL string.
    pub fn serialize(&self, dialect: Dialect) -> String {
        self.tokens.iter().map(|t| t.serialize(dialect)).collect()
    }

    // Convenience methods for common tokens
    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }
    pub fn newline(&mut self) -> &mut Self {
        self.push(Token::Newline)
    }
    pub fn indent(&mut self, n: usize) -> &mut Self {
        self.push(Token::Indent(n))
    }
    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }
    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }
    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }
    pub fn function(&mut self, name: &str) -> &mut Self {
        self.push(Token::FunctionName(name.into()))
    }
}

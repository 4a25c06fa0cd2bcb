//! SQL-level data types used in casts.
//!
//! The funnel tables only ever need a handful of scalar types; each dialect
//! maps them to its own spelling through `SqlDialect::emit_data_type`.

use std::fmt;

/// SQL-level data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,

    /// Variable-length string without limit.
    String,

    /// Date without time.
    Date,

    /// Timestamp (dialect default timezone handling).
    Timestamp,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int64 => "int64",
            DataType::String => "string",
            DataType::Date => "date",
            DataType::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

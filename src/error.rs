//! Error taxonomy for funnel compilation and analysis.
//!
//! Validation and filtering errors abort before any SQL is produced;
//! execution errors are carried verbatim from the query collaborator.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::SettingsError;

/// Result alias used by every fallible public function.
pub type FunnelResult<T> = Result<T, FunnelError>;

/// Malformed or missing configuration. Never retried; the caller fixes input.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Failed to parse funnel config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// A configured expression or reference that is not well-formed for the
/// target dialect. Caught before any SQL is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompilationError {
    #[error("Invalid column expression for '{field}': {expression:?} ({message})")]
    InvalidColumnExpression {
        field: String,
        expression: String,
        message: String,
    },

    #[error("Invalid extraction path for '{field}': {path:?} (segments must be [A-Za-z0-9_])")]
    InvalidExtractionPath { field: String, path: String },

    #[error("Invalid table reference for '{field}': {reference:?} (expected 1 to 3 dot-separated names)")]
    InvalidTableReference { field: String, reference: String },
}

/// Failure reported by the query collaborator, propagated without interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum FunnelError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(
        "Event '{event}' is declared in step {first_rank} and step {second_rank}; \
         every event must map to exactly one step"
    )]
    AmbiguousEventMapping {
        event: String,
        first_rank: u32,
        second_rank: u32,
    },

    #[error("No steps with available events found. Check your event names.")]
    EmptyFunnel,

    #[error(transparent)]
    Compilation(#[from] CompilationError),

    #[error("Query execution failed: {0}")]
    Execution(#[from] ExecutionError),
}

/// Pipeline stage at which an analysis halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validation,
    AvailabilityCheck,
    Filtering,
    FunnelCompilation,
    FunnelExecution,
    PercentileCompilation,
    PercentileExecution,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validation => "validation",
            Stage::AvailabilityCheck => "availability check",
            Stage::Filtering => "availability filtering",
            Stage::FunnelCompilation => "funnel compilation",
            Stage::FunnelExecution => "funnel execution",
            Stage::PercentileCompilation => "percentile compilation",
            Stage::PercentileExecution => "percentile execution",
        };
        f.write_str(name)
    }
}

/// An orchestrated analysis failure, tagged with the stage that failed.
#[derive(Debug, Error)]
#[error("Analysis failed during {stage}: {source}")]
pub struct AnalysisError {
    pub stage: Stage,
    #[source]
    pub source: FunnelError,
}

impl AnalysisError {
    pub fn new(stage: Stage, source: impl Into<FunnelError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

//! # funnel-sql
//!
//! Compiles declarative funnel definitions into warehouse SQL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Funnel config (JSON)                        │
//! │  (steps, source columns, filters, segmentation)          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [validation]
//! ┌─────────────────────────────────────────────────────────┐
//! │                 FunnelConfig                             │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [availability]
//! ┌─────────────────────────────────────────────────────────┐
//! │      FilteredSteps (dense ranks 1..=K)                   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [funnel, percentile]
//! ┌─────────────────────────────────────────────────────────┐
//! │   CREATE OR REPLACE TABLE ... AS (per dialect)           │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`orchestrator`] runs the stages in order through a caller-supplied
//! [`orchestrator::QueryExecutor`]; nothing in this crate talks to a
//! warehouse.

pub mod availability;
pub mod config;
pub mod error;
pub mod funnel;
pub mod orchestrator;
pub mod percentile;
pub mod sql;
pub mod validation;

#[cfg(test)]
mod test_fixtures;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::availability::{
        compile_availability_sql, filter, EventAvailabilityReport, FilteredSteps,
    };
    pub use crate::config::{
        FunnelConfig, PercentileSource, RawFunnelConfig, SegmentField, Settings, Step,
    };
    pub use crate::error::{
        AnalysisError, CompilationError, ConfigError, ExecutionError, FunnelError, FunnelResult,
        Stage,
    };
    pub use crate::funnel::{CompiledFunnelRow, PercentileRow};
    pub use crate::orchestrator::{
        AnalysisOrchestrator, AnalysisOutcome, AnalysisPlan, QueryExecutor, ResultSet,
    };
    pub use crate::sql::{Dialect, SqlDialect};
    pub use crate::validation::validate;
}

// Also export at crate root for convenience
pub use error::{FunnelError, FunnelResult};
pub use sql::Dialect;

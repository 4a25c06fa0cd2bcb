//! Analysis orchestration.
//!
//! Sequences the pipeline stages:
//!
//! ```text
//! Validated → Filtered → FunnelCompiled → FunnelExecuted
//!           → PercentilesCompiled → PercentilesExecuted → Done
//! ```
//!
//! Each stage is one compiler call followed by one statement handed to the
//! [`QueryExecutor`]. Statements run strictly one after another; the first
//! failure halts the pipeline and is reported with its [`Stage`]. The
//! percentile stages are skipped when the config disables them. A failure
//! there leaves the funnel table in place.

mod executor;

pub use executor::{QueryExecutor, ResultSet};

use tracing::{debug, info};

use crate::availability::{self, EventAvailabilityReport, FilteredSteps};
use crate::config::{FunnelConfig, RawFunnelConfig};
use crate::error::{AnalysisError, Stage};
use crate::funnel;
use crate::percentile;
use crate::sql::{Dialect, TableRef};
use crate::validation;

/// SQL for every stage of one analysis, compiled but not executed.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisPlan {
    pub dialect: Dialect,
    pub steps: FilteredSteps,
    pub funnel_sql: String,
    pub percentile_sql: Option<String>,
}

impl AnalysisPlan {
    /// Statements in execution order.
    pub fn statements(&self) -> Vec<&str> {
        std::iter::once(self.funnel_sql.as_str())
            .chain(self.percentile_sql.as_deref())
            .collect()
    }

    /// All statements as one `;`-terminated script.
    pub fn to_script(&self) -> String {
        self.statements()
            .iter()
            .map(|sql| format!("{};\n", sql))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    /// Present when the availability query ran.
    pub availability: Option<EventAvailabilityReport>,
    pub steps: FilteredSteps,
    pub funnel_table: TableRef,
    pub percentiles_table: Option<TableRef>,
}

/// Drives validation, filtering, compilation and execution.
#[derive(Debug, Clone)]
pub struct AnalysisOrchestrator {
    dialect: Dialect,
    check_availability: bool,
}

impl Default for AnalysisOrchestrator {
    fn default() -> Self {
        Self::new(Dialect::default())
    }
}

impl AnalysisOrchestrator {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            check_availability: true,
        }
    }

    /// Whether [`run`](Self::run) queries event availability before compiling.
    /// When off, every configured step is kept.
    pub fn with_availability_check(mut self, enabled: bool) -> Self {
        self.check_availability = enabled;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Validate a raw configuration.
    pub fn validate(&self, raw: &RawFunnelConfig) -> Result<FunnelConfig, AnalysisError> {
        validation::validate(raw).map_err(|e| AnalysisError::new(Stage::Validation, e))
    }

    /// Compile every statement without executing anything.
    ///
    /// Steps are filtered against `availability` when given; otherwise every
    /// configured step is kept.
    pub fn plan(
        &self,
        config: &FunnelConfig,
        availability: Option<&EventAvailabilityReport>,
    ) -> Result<AnalysisPlan, AnalysisError> {
        let steps = self.filter_steps(config, availability)?;
        let funnel_sql = self.compile_funnel(config, &steps)?;
        let percentile_sql = if config.create_percentiles_table {
            Some(self.compile_percentiles(config, &steps)?)
        } else {
            None
        };

        Ok(AnalysisPlan {
            dialect: self.dialect,
            steps,
            funnel_sql,
            percentile_sql,
        })
    }

    /// Run the whole pipeline through `executor`.
    pub async fn run<E>(
        &self,
        config: &FunnelConfig,
        executor: &E,
    ) -> Result<AnalysisOutcome, AnalysisError>
    where
        E: QueryExecutor + ?Sized,
    {
        info!(
            funnel = %config.funnel_name,
            dialect = %self.dialect,
            steps = config.steps.len(),
            "Starting funnel analysis"
        );

        let availability = if self.check_availability {
            Some(self.query_availability(config, executor).await?)
        } else {
            debug!("Availability check disabled, keeping every step");
            None
        };

        let steps = self.filter_steps(config, availability.as_ref())?;

        let funnel_sql = self.compile_funnel(config, &steps)?;
        execute(executor, Stage::FunnelExecution, &funnel_sql).await?;
        let funnel_table = config.funnel_table();
        info!(table = ?funnel_table.parts, "Funnel table created");

        let percentiles_table = if config.create_percentiles_table {
            let sql = self.compile_percentiles(config, &steps)?;
            execute(executor, Stage::PercentileExecution, &sql).await?;
            let table = config.percentiles_table();
            info!(table = ?table.parts, "Percentile table created");
            Some(table)
        } else {
            info!("Percentile table disabled, skipping");
            None
        };

        Ok(AnalysisOutcome {
            availability,
            steps,
            funnel_table,
            percentiles_table,
        })
    }

    async fn query_availability<E>(
        &self,
        config: &FunnelConfig,
        executor: &E,
    ) -> Result<EventAvailabilityReport, AnalysisError>
    where
        E: QueryExecutor + ?Sized,
    {
        let stage = Stage::AvailabilityCheck;
        let sql = availability::compile_availability_sql(config, self.dialect)
            .map_err(|e| AnalysisError::new(stage, e))?;
        let result = execute(executor, stage, &sql).await?;
        let report = EventAvailabilityReport::from_result_set(&result)
            .map_err(|e| AnalysisError::new(stage, e))?;
        info!(
            declared = config.declared_events().len(),
            observed = report.len(),
            "Event availability checked"
        );
        Ok(report)
    }

    fn filter_steps(
        &self,
        config: &FunnelConfig,
        report: Option<&EventAvailabilityReport>,
    ) -> Result<FilteredSteps, AnalysisError> {
        match report {
            Some(report) => availability::filter(config, report),
            None => FilteredSteps::unfiltered(config),
        }
        .map_err(|e| AnalysisError::new(Stage::Filtering, e))
    }

    fn compile_funnel(
        &self,
        config: &FunnelConfig,
        steps: &FilteredSteps,
    ) -> Result<String, AnalysisError> {
        funnel::compile(steps, config, self.dialect)
            .map_err(|e| AnalysisError::new(Stage::FunnelCompilation, e))
    }

    fn compile_percentiles(
        &self,
        config: &FunnelConfig,
        steps: &FilteredSteps,
    ) -> Result<String, AnalysisError> {
        percentile::compile(steps, config, self.dialect)
            .map_err(|e| AnalysisError::new(Stage::PercentileCompilation, e))
    }
}

async fn execute<E>(executor: &E, stage: Stage, sql: &str) -> Result<ResultSet, AnalysisError>
where
    E: QueryExecutor + ?Sized,
{
    info!(%stage, bytes = sql.len(), "Executing statement");
    executor
        .execute(sql)
        .await
        .map_err(|e| AnalysisError::new(stage, e))
}

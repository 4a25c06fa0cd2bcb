//! funnel-sql CLI - Compile funnel configs to SQL
//!
//! Usage:
//!   funnel-sql compile <config.json> [--dialect <dialect>] [--availability <counts.json>]
//!   funnel-sql validate <config.json>
//!   funnel-sql availability <config.json> [--dialect <dialect>]
//!
//! Examples:
//!   funnel-sql compile tiering.json --availability counts.json
//!   funnel-sql compile tiering.json --dialect duckdb --output verbose
//!   funnel-sql availability tiering.json
//!
//! Logs go to stderr (`RUST_LOG` overrides the default `info` level); stdout
//! only ever carries SQL.

use clap::{Parser, Subcommand, ValueEnum};
use funnel_sql::availability::{compile_availability_sql, EventAvailabilityReport};
use funnel_sql::config::{FunnelConfig, RawFunnelConfig, Settings};
use funnel_sql::orchestrator::AnalysisOrchestrator;
use funnel_sql::sql::Dialect;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "funnel-sql")]
#[command(about = "funnel-sql - Compile funnel definitions to warehouse SQL")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to $FUNNEL_SQL_CONFIG, ./funnel-sql.toml, then the user config dir)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a funnel config to the funnel and percentile statements
    Compile {
        /// Path to the funnel config (JSON)
        file: PathBuf,

        /// SQL dialect to generate (defaults to the settings file, then bigquery)
        #[arg(short, long)]
        dialect: Option<DialectArg>,

        /// Event counts ({"event": count}) used to drop unavailable steps
        #[arg(short, long)]
        availability: Option<PathBuf>,

        /// Override the config's project_id
        #[arg(long)]
        project_id: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "sql")]
        output: OutputFormat,
    },

    /// Validate a funnel config without generating SQL
    Validate {
        /// Path to the funnel config (JSON)
        file: PathBuf,
    },

    /// Print the event availability query for a funnel config
    Availability {
        /// Path to the funnel config (JSON)
        file: PathBuf,

        /// SQL dialect to generate
        #[arg(short, long)]
        dialect: Option<DialectArg>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Bigquery,
    Duckdb,
    Snowflake,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Bigquery => Dialect::BigQuery,
            DialectArg::Duckdb => Dialect::DuckDb,
            DialectArg::Snowflake => Dialect::Snowflake,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Output SQL only
    Sql,
    /// Output SQL with comments
    Verbose,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let settings = match load_settings(cli.settings.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Settings error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Compile {
            file,
            dialect,
            availability,
            project_id,
            output,
        } => cmd_compile(
            &settings,
            file,
            dialect,
            availability,
            project_id,
            output,
        ),
        Commands::Validate { file } => cmd_validate(file),
        Commands::Availability { file, dialect } => cmd_availability(&settings, file, dialect),
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings, String> {
    match path {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    }
    .map_err(|e| e.to_string())
}

/// Read and validate a funnel config, applying settings overrides.
fn load_config(
    settings: &Settings,
    file: &Path,
    project_id: Option<String>,
) -> Result<FunnelConfig, String> {
    let raw = RawFunnelConfig::from_file(file).map_err(|e| e.to_string())?;
    let mut config = funnel_sql::validation::validate(&raw).map_err(|e| e.to_string())?;

    let project_id = match project_id {
        Some(id) => Some(id),
        None => settings.resolved_project_id().map_err(|e| e.to_string())?,
    };
    if let Some(id) = project_id {
        config = config.with_project_id(id);
    }
    if let Some(source) = settings.compile.percentile_source {
        config = config.with_percentile_source(source);
    }
    Ok(config)
}

fn read_availability(path: &Path) -> Result<EventAvailabilityReport, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Error reading file '{}': {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("Invalid counts in '{}': {}", path.display(), e))
}

fn cmd_compile(
    settings: &Settings,
    file: PathBuf,
    dialect: Option<DialectArg>,
    availability: Option<PathBuf>,
    project_id: Option<String>,
    output: OutputFormat,
) -> ExitCode {
    let dialect = dialect.map(Dialect::from).unwrap_or(settings.compile.dialect);

    let config = match load_config(settings, &file, project_id) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let report = match availability.as_deref().map(read_availability).transpose() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let plan = match AnalysisOrchestrator::new(dialect).plan(&config, report.as_ref()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Compilation error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match output {
        OutputFormat::Sql => {
            print!("{}", plan.to_script());
        }
        OutputFormat::Verbose => {
            println!("-- funnel-sql Compiled SQL");
            println!("-- Source: {}", file.display());
            println!("-- Funnel: {}", config.funnel_name);
            println!("-- Dialect: {}", dialect);
            for step in plan.steps.iter() {
                println!(
                    "-- Step {}: {} [{}]",
                    step.rank,
                    step.screen_name,
                    step.loaded_events.join(", ")
                );
            }
            for step in plan.steps.dropped() {
                println!(
                    "-- Dropped (no available events): {} - {}",
                    step.rank, step.screen_name
                );
            }
            if report.is_none() && settings.compile.check_availability {
                match compile_availability_sql(&config, dialect) {
                    Ok(sql) => {
                        println!();
                        println!("-- Availability query (run first to filter steps):");
                        for line in sql.lines() {
                            println!("-- {}", line);
                        }
                    }
                    Err(e) => {
                        eprintln!("Compilation error: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            }
            println!();
            print!("{}", plan.to_script());
        }
    }
    ExitCode::SUCCESS
}

fn cmd_validate(file: PathBuf) -> ExitCode {
    let raw = match RawFunnelConfig::from_file(&file) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error reading config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match funnel_sql::validation::validate(&raw) {
        Ok(config) => {
            println!(
                "OK: {} is valid ({} steps, funnel table {})",
                file.display(),
                config.steps.len(),
                config.funnel_table_name
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Validation error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_availability(settings: &Settings, file: PathBuf, dialect: Option<DialectArg>) -> ExitCode {
    let dialect = dialect.map(Dialect::from).unwrap_or(settings.compile.dialect);

    let config = match load_config(settings, &file, None) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match compile_availability_sql(&config, dialect) {
        Ok(sql) => {
            println!("{};", sql);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Compilation error: {}", e);
            ExitCode::FAILURE
        }
    }
}

//! TOML-based tool settings for funnel-sql.
//!
//! Supports a config file (funnel-sql.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [compile]
//! dialect = "bigquery"
//! check_availability = true
//! percentile_source = "all_rows"
//!
//! [warehouse]
//! project_id = "${GCP_PROJECT}"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::funnel::PercentileSource;
use crate::sql::Dialect;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Compilation defaults.
    pub compile: CompileSettings,

    /// Target warehouse location.
    pub warehouse: WarehouseSettings,
}

/// Compilation defaults, overridable per invocation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompileSettings {
    /// SQL dialect to emit.
    pub dialect: Dialect,

    /// Emit the availability query alongside the plan.
    pub check_availability: bool,

    /// Overrides the funnel config's percentile source when set.
    pub percentile_source: Option<PercentileSource>,
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            check_availability: true,
            percentile_source: None,
        }
    }
}

/// Target warehouse location.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WarehouseSettings {
    /// Project override (supports ${ENV_VAR} expansion).
    pub project_id: Option<String>,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `FUNNEL_SQL_CONFIG`
    /// 2. `./funnel-sql.toml`
    /// 3. `~/.config/funnel-sql/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("FUNNEL_SQL_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("funnel-sql.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("funnel-sql").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// The project override with environment variables expanded.
    pub fn resolved_project_id(&self) -> Result<Option<String>, SettingsError> {
        let Some(raw) = &self.warehouse.project_id else {
            return Ok(None);
        };
        let expanded = expand_env_vars(raw)?;
        if expanded.trim().is_empty() {
            return Err(SettingsError::InvalidConfig(
                "warehouse.project_id expands to an empty string".into(),
            ));
        }
        Ok(Some(expanded))
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name = if chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut name = String::new();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                name.push(ch);
            }
            name
        } else {
            // $VAR ends at the first non-alphanumeric/underscore
            let mut name = String::new();
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                name.push(ch);
            }
            if name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
            name
        };

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}

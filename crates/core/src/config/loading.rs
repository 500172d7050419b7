//! Configuration loading from files and environment variables

use crate::error::{Error, Result};
use config::{Config as ConfigLib, ConfigBuilder as LibConfigBuilder, Environment, File};
use std::path::Path;

use super::defaults::*;
use super::{global_config_path, Config};

/// Helper to set a config default with consistent error mapping
fn set_config_default<T: Into<config::Value>>(
    builder: LibConfigBuilder<config::builder::DefaultState>,
    key: &str,
    value: T,
) -> Result<LibConfigBuilder<config::builder::DefaultState>> {
    builder
        .set_default(key, value)
        .map_err(|e| Error::config(format!("Failed to set {key} default: {e}")))
}

impl Config {
    /// Loads configuration from a TOML file with environment variable overrides
    ///
    /// Environment variables are prefixed with `RANKEVAL_` and use double underscores
    /// for nested values. For example:
    /// - `RANKEVAL_METRIC__KIND=dcg`
    /// - `RANKEVAL_METRIC__TOP_N=20`
    pub fn from_file(path: &Path) -> Result<Self> {
        let builder = ConfigLib::builder();

        // Set defaults explicitly (config crate doesn't apply serde defaults for missing sections)
        let builder = set_config_default(builder, "metric.kind", default_metric_kind())?;
        let builder = set_config_default(builder, "metric.top_n", default_top_n() as i64)?;
        let builder = set_config_default(
            builder,
            "metric.relevant_rating_threshold",
            i64::from(default_relevant_rating_threshold()),
        )?;
        let builder = set_config_default(builder, "metric.ignore_unlabeled", false)?;
        let mut builder = set_config_default(
            builder,
            "evaluation.max_concurrent_queries",
            default_max_concurrent_queries() as i64,
        )?;

        // Add the config file if it exists
        if path.exists() {
            builder = builder.add_source(File::from(path));
        }

        // Add environment variables with RANKEVAL_ prefix
        builder = builder.add_source(
            Environment::with_prefix("RANKEVAL")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize config: {e}")))
    }

    /// Creates a config from a TOML string (useful for testing)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration
    ///
    /// Precedence (lowest to highest):
    /// 1. Hardcoded defaults
    /// 2. Config file (~/.rankeval/config.toml or custom --config path)
    /// 3. Environment variables (RANKEVAL_*)
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = match config_path {
            Some(p) => p.to_path_buf(),
            None => global_config_path()?,
        };
        Self::from_file(&path)
    }
}

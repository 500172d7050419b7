//! Configuration module for rank evaluation
//!
//! Configuration can be loaded from TOML files and/or environment variables.

mod defaults;
mod loading;


use crate::error::{Error, Result};
use crate::metrics::{NormalizedDcg, METRIC_KINDS};
use crate::rated_hit::Rating;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use defaults::*;

/// Returns the path to the global configuration file
///
/// The global config is stored at `~/.rankeval/config.toml`.
pub fn global_config_path() -> Result<PathBuf> {
    let home_dir = dirs::home_dir()
        .ok_or_else(|| Error::config("Unable to determine home directory".to_string()))?;
    Ok(home_dir.join(".rankeval").join("config.toml"))
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Metric selection and parameters
    #[serde(default)]
    pub metric: MetricConfig,

    /// Batch evaluation settings
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

/// Configuration for the metric used to score each query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfig {
    /// Metric kind: "precision", "reciprocal_rank" or "dcg"
    #[serde(default = "default_metric_kind")]
    pub kind: String,

    /// Number of top hits the metric looks at
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Minimum grade counted as relevant (precision, reciprocal_rank)
    #[serde(default = "default_relevant_rating_threshold")]
    pub relevant_rating_threshold: Rating,

    /// Leave unrated hits out of the retrieved count (precision)
    #[serde(default)]
    pub ignore_unlabeled: bool,

    /// Grade assumed for unrated hits (dcg)
    #[serde(default)]
    pub unknown_doc_rating: Option<Rating>,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            kind: default_metric_kind(),
            top_n: default_top_n(),
            relevant_rating_threshold: default_relevant_rating_threshold(),
            ignore_unlabeled: false,
            unknown_doc_rating: None,
        }
    }
}

/// Configuration for batch evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Maximum number of queries evaluated concurrently
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: default_max_concurrent_queries(),
        }
    }
}

impl Config {
    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if !METRIC_KINDS.contains(&self.metric.kind.as_str()) {
            return Err(Error::config(format!(
                "Invalid metric kind '{}'. Must be one of: {:?}",
                self.metric.kind, METRIC_KINDS
            )));
        }

        if self.metric.top_n == 0 {
            return Err(Error::config(
                "metric.top_n must be greater than 0".to_string(),
            ));
        }

        if self.metric.unknown_doc_rating.is_some() && self.metric.kind != NormalizedDcg::NAME {
            return Err(Error::config(format!(
                "metric.unknown_doc_rating only applies to dcg, not '{}'",
                self.metric.kind
            )));
        }

        if self.evaluation.max_concurrent_queries == 0 {
            return Err(Error::config(
                "evaluation.max_concurrent_queries must be greater than 0".to_string(),
            ));
        }
        if self.evaluation.max_concurrent_queries > MAX_CONCURRENT_QUERIES {
            return Err(Error::config(format!(
                "evaluation.max_concurrent_queries too large (max {MAX_CONCURRENT_QUERIES}, got {})",
                self.evaluation.max_concurrent_queries
            )));
        }

        Ok(())
    }
}

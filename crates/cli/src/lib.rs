//! Library interface for the rankeval CLI
//!
//! This module exposes the file handling behind each command for integration
//! testing while keeping the main binary logic in main.rs.

#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

use anyhow::Context;
use rankeval_core::{
    read_requests, to_bytes, Config, DetailsRegistry, EvaluationRun, RatedRequest,
};
use std::fs;

// Re-export commonly needed types for tests
pub use anyhow::Result;
pub use std::path::Path;

/// Reads a JSON array of rated requests
pub fn load_requests(path: &Path) -> Result<Vec<RatedRequest>> {
    read_requests(path)
        .with_context(|| format!("Failed to load queries from {}", path.display()))
}

/// Applies command-line overrides on top of the loaded configuration
pub fn apply_overrides(config: &mut Config, metric: Option<String>, top_n: Option<usize>) {
    if let Some(kind) = metric {
        config.metric.kind = kind;
    }
    if let Some(top_n) = top_n {
        config.metric.top_n = top_n;
    }
}

/// Renders a run as pretty-printed JSON
pub fn render_report(run: &EvaluationRun) -> Result<String> {
    serde_json::to_string_pretty(run).context("Failed to render evaluation report")
}

/// Stores the binary encoding of a run
pub fn save_run(path: &Path, run: &EvaluationRun) -> Result<()> {
    fs::write(path, to_bytes(run))
        .with_context(|| format!("Failed to write evaluation run to {}", path.display()))
}

/// Loads a stored run, resolving metric breakdowns through `registry`
pub fn load_run(path: &Path, registry: &DetailsRegistry) -> Result<EvaluationRun> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read stored run {}", path.display()))?;
    EvaluationRun::from_bytes(bytes, registry)
        .with_context(|| format!("Failed to decode stored run {}", path.display()))
}

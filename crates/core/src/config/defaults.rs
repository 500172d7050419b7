//! Default values and functions for configuration

use crate::rated_hit::Rating;

// Default constants
pub(crate) const DEFAULT_METRIC_KIND: &str = "precision";
pub(crate) const MAX_CONCURRENT_QUERIES: usize = 256;

pub(crate) fn default_metric_kind() -> String {
    DEFAULT_METRIC_KIND.to_string()
}

pub(crate) fn default_top_n() -> usize {
    10
}

pub(crate) fn default_relevant_rating_threshold() -> Rating {
    1
}

pub(crate) fn default_max_concurrent_queries() -> usize {
    8
}

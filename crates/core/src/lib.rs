//! Core types and metrics for ranking evaluation
//!
//! This crate scores how well a search engine ranked its results for a set
//! of queries, given human relevance judgments:
//!
//! - **Rated hits**: returned documents paired with their judgment, if any
//! - **Metrics**: precision@N, reciprocal rank and normalized DCG
//! - **Query quality**: per-query results carrying metric-specific breakdowns
//! - **Evaluation**: batch runs with per-query failure isolation
//! - **Wire format**: binary encoding for results and runs
//! - **Configuration**: metric selection and evaluation settings
//!

#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod config;
pub mod document_key;
pub mod error;
pub mod evaluation;
pub mod metric_details;
pub mod metrics;
pub mod query_quality;
pub mod rated_hit;
pub mod wire;

// Re-export main types for convenience
pub use config::{Config, EvaluationConfig, MetricConfig};
pub use document_key::DocumentKey;
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use evaluation::{
    evaluate_batch, evaluate_request, read_requests, EvaluationRun, Evaluator, QueryFailure,
    RatedDocument, RatedRequest,
};
pub use metric_details::{DetailsDecoder, DetailsRegistry, MetricDetails};
pub use metrics::{
    create_metric, DcgBreakdown, Metric, NormalizedDcg, PrecisionAtN, PrecisionBreakdown,
    ReciprocalRank, ReciprocalRankBreakdown, Score, UnknownDocsConvention,
};
pub use query_quality::{QueryQualityResult, QueryQualityResultBuilder};
pub use rated_hit::{rate_hits, validate_hits, Judgments, RatedHit, Rating, SearchHit};
pub use wire::{from_bytes, to_bytes, Readable, StreamInput, StreamOutput, Writeable};

/// Version of the core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Result, ResultExt};
    pub use crate::evaluation::{EvaluationRun, Evaluator, RatedRequest};
    pub use crate::metrics::Metric;
    pub use crate::query_quality::QueryQualityResult;
}

//! Pluggable ranking quality metrics
//!
//! Every metric shares the same reconciliation of returned hits against the
//! judgment set: the hit list is validated, each hit is paired with its
//! grade (or marked unrated), unknown documents are collected according to
//! the metric's convention, and the result is assembled. Metrics only differ
//! in how they turn the rated hits into a score and a breakdown.

pub mod dcg;
pub mod precision;
pub mod reciprocal_rank;

use crate::config::MetricConfig;
use crate::document_key::DocumentKey;
use crate::error::{Error, Result};
use crate::metric_details::{DetailsDecoder, MetricDetails};
use crate::query_quality::QueryQualityResult;
use crate::rated_hit::{rate_hits, validate_hits, Judgments, RatedHit, SearchHit};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

pub use dcg::{DcgBreakdown, NormalizedDcg};
pub use precision::{PrecisionAtN, PrecisionBreakdown};
pub use reciprocal_rank::{ReciprocalRank, ReciprocalRankBreakdown};

/// Which documents a metric reports as unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownDocsConvention {
    /// Returned documents without a judgment
    ReturnedUnjudged,
    /// Judged documents the search did not return
    JudgedNotReturned,
    /// Union of both
    Both,
}

/// Scalar quality level plus the breakdown explaining it
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub quality_level: f64,
    pub details: Option<MetricDetails>,
}

/// Scoring strategy for the ranking returned for a single query
pub trait Metric: Send + Sync {
    /// Name the metric is configured by
    fn name(&self) -> &'static str;

    /// Unknown-document convention; built-in metrics report returned hits
    /// that carry no judgment
    fn unknown_docs_convention(&self) -> UnknownDocsConvention {
        UnknownDocsConvention::ReturnedUnjudged
    }

    /// Scores hits that have already been validated and rated, in rank order.
    /// The returned level must lie in `[0.0, 1.0]`.
    fn score(&self, judgments: &Judgments, rated_hits: &[RatedHit]) -> Score;

    /// Evaluates one query's returned hits against its judgments
    ///
    /// # Errors
    /// `InvalidHitSequence` or `DuplicateHit` when `hits` has non-increasing
    /// ranks or repeats a document. Nothing is scored in that case.
    fn evaluate(
        &self,
        query_id: &str,
        judgments: &Judgments,
        hits: &[SearchHit],
    ) -> Result<QueryQualityResult> {
        validate_hits(hits)?;

        let rated_hits = rate_hits(judgments, hits);
        let unknown_docs =
            collect_unknown_docs(self.unknown_docs_convention(), judgments, &rated_hits);

        let Score {
            quality_level,
            details,
        } = self.score(judgments, &rated_hits);
        // With nothing judged there is nothing to be relevant
        let quality_level = if judgments.is_empty() {
            0.0
        } else {
            quality_level
        };

        debug!(
            "Query '{query_id}': {} = {quality_level:.4} over {} hits ({} unknown docs)",
            self.name(),
            rated_hits.len(),
            unknown_docs.len()
        );

        let result = QueryQualityResult::builder(query_id, quality_level, unknown_docs)
            .rated_hits(rated_hits)
            .metric_details(details)
            .build()?;
        Ok(result)
    }
}

/// Collects unknown documents under the given convention
pub fn collect_unknown_docs(
    convention: UnknownDocsConvention,
    judgments: &Judgments,
    rated_hits: &[RatedHit],
) -> BTreeSet<DocumentKey> {
    let returned_unjudged = || {
        rated_hits
            .iter()
            .filter(|h| !h.is_rated())
            .map(|h| h.key().clone())
    };
    let judged_not_returned = || {
        let returned: BTreeSet<&DocumentKey> = rated_hits.iter().map(RatedHit::key).collect();
        judgments
            .keys()
            .filter(|k| !returned.contains(k))
            .cloned()
            .collect::<Vec<_>>()
    };

    match convention {
        UnknownDocsConvention::ReturnedUnjudged => returned_unjudged().collect(),
        UnknownDocsConvention::JudgedNotReturned => judged_not_returned().into_iter().collect(),
        UnknownDocsConvention::Both => returned_unjudged().chain(judged_not_returned()).collect(),
    }
}

/// Decoders for the breakdowns of every built-in metric
pub(crate) fn builtin_details() -> Vec<(&'static str, DetailsDecoder)> {
    vec![
        (PrecisionBreakdown::TAG, PrecisionBreakdown::decode as DetailsDecoder),
        (ReciprocalRankBreakdown::TAG, ReciprocalRankBreakdown::decode as DetailsDecoder),
        (DcgBreakdown::TAG, DcgBreakdown::decode as DetailsDecoder),
    ]
}

/// Create a metric based on configuration
pub fn create_metric(config: &MetricConfig) -> Result<Arc<dyn Metric>> {
    match config.kind.as_str() {
        PrecisionAtN::NAME => {
            info!(
                "Creating precision@{} metric (threshold {}, ignore_unlabeled {})",
                config.top_n, config.relevant_rating_threshold, config.ignore_unlabeled
            );
            let metric = PrecisionAtN::new(config.top_n)?
                .with_relevant_threshold(config.relevant_rating_threshold)
                .with_ignore_unlabeled(config.ignore_unlabeled);
            Ok(Arc::new(metric))
        }
        ReciprocalRank::NAME => {
            info!(
                "Creating reciprocal rank metric (top {}, threshold {})",
                config.top_n, config.relevant_rating_threshold
            );
            let metric = ReciprocalRank::new(config.top_n)?
                .with_relevant_threshold(config.relevant_rating_threshold);
            Ok(Arc::new(metric))
        }
        NormalizedDcg::NAME => {
            info!(
                "Creating nDCG@{} metric (unknown_doc_rating {:?})",
                config.top_n, config.unknown_doc_rating
            );
            let metric =
                NormalizedDcg::new(config.top_n)?.with_unknown_doc_rating(config.unknown_doc_rating);
            Ok(Arc::new(metric))
        }
        other => Err(Error::config(format!(
            "Unknown metric kind: '{other}'. Valid kinds: {}",
            METRIC_KINDS.join(", ")
        ))),
    }
}

/// Names accepted by [`create_metric`]
pub const METRIC_KINDS: [&str; 3] = [PrecisionAtN::NAME, ReciprocalRank::NAME, NormalizedDcg::NAME];


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    struct Constant(f64);

    impl Metric for Constant {
        fn name(&self) -> &'static str {
            "constant"
        }

        fn unknown_docs_convention(&self) -> UnknownDocsConvention {
            UnknownDocsConvention::Both
        }

        fn score(&self, _judgments: &Judgments, _rated_hits: &[RatedHit]) -> Score {
            Score {
                quality_level: self.0,
                details: None,
            }
        }
    }

    #[test]
    fn test_custom_metric_uses_shared_reconciliation() {
        let judgments = judgments(&[("a", 1), ("z", 2)]);
        let result = Constant(0.75)
            .evaluate("q", &judgments, &hits(&["a", "b"]))
            .unwrap();
        assert_eq!(result.quality_level(), 0.75);
        assert!(result.metric_details().is_none());
        let unknown: Vec<&str> = result
            .unknown_docs()
            .iter()
            .map(|k| k.doc_id.as_str())
            .collect();
        assert_eq!(unknown, vec!["b", "z"]);
    }

    #[test]
    fn test_out_of_range_score_is_rejected() {
        let judgments = judgments(&[("a", 1)]);
        let err = Constant(2.0)
            .evaluate("q", &judgments, &hits(&["a"]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_judged_not_returned_convention() {
        let judgments = judgments(&[("a", 1), ("z", 2)]);
        let rated = crate::rated_hit::rate_hits(&judgments, &hits(&["a", "b"]));
        let unknown =
            collect_unknown_docs(UnknownDocsConvention::JudgedNotReturned, &judgments, &rated);
        assert_eq!(unknown.into_iter().collect::<Vec<_>>(), vec![key("z")]);
    }

    #[test]
    fn test_create_metric_from_config() {
        for kind in METRIC_KINDS {
            let config = MetricConfig {
                kind: kind.to_string(),
                ..MetricConfig::default()
            };
            let metric = create_metric(&config).unwrap();
            assert_eq!(metric.name(), kind);
        }
    }

    #[test]
    fn test_create_metric_rejects_unknown_kind() {
        let config = MetricConfig {
            kind: "map".to_string(),
            ..MetricConfig::default()
        };
        let err = create_metric(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown metric kind"));
    }
}

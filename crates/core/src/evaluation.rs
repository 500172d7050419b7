//! Batch evaluation of one metric across many queries
//!
//! Each query is evaluated independently. A failing query is recorded in the
//! run's failure map and excluded from the mean; it never aborts its
//! siblings. The overall quality level is computed once, after every query
//! has either succeeded or failed.

use crate::config::Config;
use crate::document_key::DocumentKey;
use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::metric_details::DetailsRegistry;
use crate::metrics::{create_metric, Metric};
use crate::query_quality::QueryQualityResult;
use crate::rated_hit::{Judgments, Rating, SearchHit};
use crate::wire::{Readable, StreamInput, StreamOutput, Writeable};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A judged document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatedDocument {
    #[serde(flatten)]
    pub key: DocumentKey,
    pub rating: Rating,
}

impl RatedDocument {
    pub fn new(key: DocumentKey, rating: Rating) -> Self {
        Self { key, rating }
    }
}

/// One query's judgments together with the hits the search engine returned
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatedRequest {
    pub id: String,
    #[serde(default)]
    pub ratings: Vec<RatedDocument>,
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

impl RatedRequest {
    pub fn new(id: impl Into<String>, ratings: Vec<RatedDocument>, hits: Vec<SearchHit>) -> Self {
        Self {
            id: id.into(),
            ratings,
            hits,
        }
    }

    /// Builds the judgment map, rejecting documents rated twice
    pub fn judgments(&self) -> Result<Judgments> {
        let mut judgments = Judgments::with_capacity(self.ratings.len());
        for rated in &self.ratings {
            if judgments.insert(rated.key.clone(), rated.rating).is_some() {
                return Err(Error::DuplicateRating(rated.key.clone()));
            }
        }
        Ok(judgments)
    }
}

/// Evaluates a single request
pub fn evaluate_request(metric: &dyn Metric, request: &RatedRequest) -> Result<QueryQualityResult> {
    let judgments = request.judgments()?;
    metric.evaluate(&request.id, &judgments, &request.hits)
}

/// Reads a JSON array of rated requests
///
/// # Errors
/// `WithContext` when the file cannot be read, `Json` when it is not a valid
/// request array, and `InvalidInput` when the array is empty.
pub fn read_requests(path: &Path) -> Result<Vec<RatedRequest>> {
    let content = fs::read_to_string(path)
        .context(format!("Failed to read evaluation input {}", path.display()))?;
    let requests: Vec<RatedRequest> = serde_json::from_str(&content)?;
    if requests.is_empty() {
        return Err(Error::invalid_input(format!(
            "Evaluation input {} contains no queries",
            path.display()
        )));
    }
    debug!("Read {} queries from {}", requests.len(), path.display());
    Ok(requests)
}

/// Record of a query that could not be evaluated
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct QueryFailure {
    pub query_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl QueryFailure {
    pub fn from_error(query_id: impl Into<String>, error: &Error) -> Self {
        Self {
            query_id: query_id.into(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl Writeable for QueryFailure {
    fn write_to(&self, out: &mut StreamOutput) {
        out.write_string(&self.query_id);
        out.write_string(&self.kind.to_string());
        out.write_string(&self.message);
    }
}

impl Readable for QueryFailure {
    fn read_from(input: &mut StreamInput) -> Result<Self> {
        let query_id = input.read_string()?;
        let kind = input.read_string()?;
        let kind = ErrorKind::from_str(&kind)
            .map_err(|_| Error::wire(format!("Unknown failure kind '{kind}'")))?;
        let message = input.read_string()?;
        Ok(Self {
            query_id,
            kind,
            message,
        })
    }
}

/// Outcome of running one metric over a batch of queries
///
/// Every query id lands in exactly one of the success and failure maps.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRun {
    metric: String,
    /// Mean quality over successful queries; `None` when none succeeded
    quality_level: Option<f64>,
    successes: BTreeMap<String, QueryQualityResult>,
    failures: BTreeMap<String, QueryFailure>,
}

impl EvaluationRun {
    /// Aggregates completed per-query outcomes
    pub fn from_outcomes(
        metric: impl Into<String>,
        outcomes: impl IntoIterator<Item = (String, Result<QueryQualityResult>)>,
    ) -> Self {
        let mut successes = BTreeMap::new();
        let mut failures = BTreeMap::new();
        for (query_id, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    successes.insert(query_id, result);
                }
                Err(e) => {
                    let failure = QueryFailure::from_error(query_id.as_str(), &e);
                    warn!(
                        "Query '{query_id}' failed ({}): {}",
                        failure.kind, failure.message
                    );
                    failures.insert(query_id, failure);
                }
            }
        }

        let quality_level = mean_quality(&successes);
        let metric: String = metric.into();
        info!(
            "Evaluated {} queries with {metric}: {} succeeded, {} failed, quality {}",
            successes.len() + failures.len(),
            successes.len(),
            failures.len(),
            quality_level.map_or_else(|| "n/a".to_string(), |q| format!("{q:.4}"))
        );

        Self {
            metric,
            quality_level,
            successes,
            failures,
        }
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Mean quality over successful queries, absent when none succeeded
    pub fn quality_level(&self) -> Option<f64> {
        self.quality_level
    }

    /// Mean quality over successful queries
    ///
    /// # Errors
    /// `EmptyBatchResult` when no query succeeded.
    pub fn require_quality_level(&self) -> Result<f64> {
        self.quality_level.ok_or(Error::EmptyBatchResult)
    }

    pub fn successes(&self) -> &BTreeMap<String, QueryQualityResult> {
        &self.successes
    }

    pub fn failures(&self) -> &BTreeMap<String, QueryFailure> {
        &self.failures
    }

    /// Number of queries in the run
    pub fn len(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successes.is_empty() && self.failures.is_empty()
    }

    /// Reads a run, resolving breakdowns through `registry`
    pub fn read_with(input: &mut StreamInput, registry: &DetailsRegistry) -> Result<Self> {
        let metric = input.read_string()?;
        let quality_level = input.read_option(|i| i.read_f64())?;

        let mut successes = BTreeMap::new();
        for result in input.read_seq(|i| QueryQualityResult::read_with(i, registry))? {
            let id = result.id().to_string();
            if successes.insert(id.clone(), result).is_some() {
                return Err(Error::wire(format!("Query '{id}' appears twice")));
            }
        }

        let expected = mean_quality(&successes);
        if quality_level.map(f64::to_bits) != expected.map(f64::to_bits) {
            return Err(Error::wire(format!(
                "Stored quality level {quality_level:?} does not match mean {expected:?} of {} successes",
                successes.len()
            )));
        }

        let mut failures = BTreeMap::new();
        for failure in input.read_seq(QueryFailure::read_from)? {
            let id = failure.query_id.clone();
            if successes.contains_key(&id) || failures.insert(id.clone(), failure).is_some() {
                return Err(Error::wire(format!("Query '{id}' appears twice")));
            }
        }

        Ok(Self {
            metric,
            quality_level,
            successes,
            failures,
        })
    }

    /// Decodes a standalone buffer holding exactly one run
    pub fn from_bytes(bytes: impl Into<Bytes>, registry: &DetailsRegistry) -> Result<Self> {
        let mut input = StreamInput::new(bytes);
        let run = Self::read_with(&mut input, registry)?;
        input.finish()?;
        Ok(run)
    }
}

fn mean_quality(successes: &BTreeMap<String, QueryQualityResult>) -> Option<f64> {
    if successes.is_empty() {
        return None;
    }
    let total: f64 = successes.values().map(QueryQualityResult::quality_level).sum();
    Some(total / successes.len() as f64)
}

impl PartialEq for EvaluationRun {
    fn eq(&self, other: &Self) -> bool {
        self.metric == other.metric
            && self.quality_level.map(f64::to_bits) == other.quality_level.map(f64::to_bits)
            && self.successes == other.successes
            && self.failures == other.failures
    }
}

impl Eq for EvaluationRun {}

impl Writeable for EvaluationRun {
    fn write_to(&self, out: &mut StreamOutput) {
        out.write_string(&self.metric);
        out.write_option(self.quality_level.as_ref(), |o, q| o.write_f64(*q));
        out.write_seq(self.successes.values());
        out.write_seq(self.failures.values());
    }
}

impl Readable for EvaluationRun {
    fn read_from(input: &mut StreamInput) -> Result<Self> {
        Self::read_with(input, DetailsRegistry::global())
    }
}

fn ensure_unique_ids(requests: &[RatedRequest]) -> Result<()> {
    let mut seen = HashSet::with_capacity(requests.len());
    for request in requests {
        if !seen.insert(request.id.as_str()) {
            return Err(Error::invalid_input(format!(
                "Query id '{}' appears more than once in the batch",
                request.id
            )));
        }
    }
    Ok(())
}

/// Evaluates a batch sequentially on the calling thread
///
/// # Errors
/// `InvalidInput` when two requests share an id. Per-query failures are
/// recorded in the returned run instead.
pub fn evaluate_batch(metric: &dyn Metric, requests: &[RatedRequest]) -> Result<EvaluationRun> {
    ensure_unique_ids(requests)?;
    let outcomes = requests
        .iter()
        .map(|request| (request.id.clone(), evaluate_request(metric, request)));
    Ok(EvaluationRun::from_outcomes(metric.name(), outcomes))
}

/// Concurrent batch evaluator
#[derive(Clone)]
pub struct Evaluator {
    metric: Arc<dyn Metric>,
    max_concurrent_queries: usize,
}

impl Evaluator {
    pub fn new(metric: Arc<dyn Metric>, max_concurrent_queries: usize) -> Self {
        Self {
            metric,
            max_concurrent_queries: max_concurrent_queries.max(1),
        }
    }

    /// Creates an evaluator for the configured metric
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let metric = create_metric(&config.metric)?;
        Ok(Self::new(metric, config.evaluation.max_concurrent_queries))
    }

    pub fn metric(&self) -> &Arc<dyn Metric> {
        &self.metric
    }

    /// Evaluates every request on the blocking pool, at most
    /// `max_concurrent_queries` at a time, and aggregates once all are done
    ///
    /// Requests that have not started when `cancel` fires are recorded as
    /// cancelled failures; queries already running finish normally.
    ///
    /// # Errors
    /// `InvalidInput` when two requests share an id.
    pub async fn run(
        &self,
        requests: Vec<RatedRequest>,
        cancel: &CancellationToken,
    ) -> Result<EvaluationRun> {
        ensure_unique_ids(&requests)?;
        info!(
            "Evaluating {} queries with {} ({} concurrent)",
            requests.len(),
            self.metric.name(),
            self.max_concurrent_queries
        );

        let outcomes: Vec<(String, Result<QueryQualityResult>)> = stream::iter(requests)
            .map(|request| {
                let metric = Arc::clone(&self.metric);
                let cancel = cancel.clone();
                async move {
                    let query_id = request.id.clone();
                    if cancel.is_cancelled() {
                        debug!("Skipping query '{query_id}': evaluation cancelled");
                        return (
                            query_id,
                            Err(Error::cancelled("evaluation cancelled before query started")),
                        );
                    }

                    let outcome = tokio::task::spawn_blocking(move || {
                        evaluate_request(metric.as_ref(), &request)
                    })
                    .await
                    .unwrap_or_else(|e| {
                        Err(Error::query_evaluation(
                            query_id.as_str(),
                            Error::Other(anyhow::anyhow!("evaluation task failed: {e}")),
                        ))
                    });
                    (query_id, outcome)
                }
            })
            .buffer_unordered(self.max_concurrent_queries)
            .collect()
            .await;

        Ok(EvaluationRun::from_outcomes(self.metric.name(), outcomes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{PrecisionAtN, Score};
    use crate::rated_hit::RatedHit;
    use crate::wire::to_bytes;

    fn key(doc: &str) -> DocumentKey {
        DocumentKey::new("idx", doc)
    }

    fn request(id: &str, rated: &[(&str, Rating)], returned: &[(&str, usize)]) -> RatedRequest {
        RatedRequest::new(
            id,
            rated
                .iter()
                .map(|(doc, r)| RatedDocument::new(key(doc), *r))
                .collect(),
            returned
                .iter()
                .map(|(doc, rank)| SearchHit::new(key(doc), *rank, None))
                .collect(),
        )
    }

    fn precision() -> PrecisionAtN {
        PrecisionAtN::new(10).unwrap()
    }

    #[test]
    fn test_failed_query_is_isolated() {
        let requests = vec![
            request("q1", &[("a", 1)], &[("a", 0), ("b", 1)]),
            request("q2", &[("a", 1)], &[("a", 0), ("b", 0)]),
            request("q3", &[("a", 1)], &[("a", 0)]),
        ];
        let run = evaluate_batch(&precision(), &requests).unwrap();

        assert_eq!(run.successes().len(), 2);
        assert_eq!(run.failures().len(), 1);
        assert_eq!(run.failures()["q2"].kind, ErrorKind::InvalidHitSequence);
        assert_eq!(run.quality_level(), Some((0.5 + 1.0) / 2.0));
        assert_eq!(run.len(), 3);
    }

    #[test]
    fn test_all_failed_batch_has_no_quality_level() {
        let requests = vec![request("q1", &[], &[("a", 1), ("b", 1)])];
        let run = evaluate_batch(&precision(), &requests).unwrap();
        assert_eq!(run.quality_level(), None);
        assert!(matches!(
            run.require_quality_level(),
            Err(Error::EmptyBatchResult)
        ));
    }

    #[test]
    fn test_empty_batch_has_no_quality_level() {
        let run = evaluate_batch(&precision(), &[]).unwrap();
        assert!(run.is_empty());
        assert_eq!(run.quality_level(), None);
    }

    #[test]
    fn test_duplicate_rating_is_a_query_failure() {
        let requests = vec![request("q1", &[("a", 1), ("a", 2)], &[("a", 0)])];
        let run = evaluate_batch(&precision(), &requests).unwrap();
        assert_eq!(run.failures()["q1"].kind, ErrorKind::InvalidRatings);
    }

    #[test]
    fn test_duplicate_query_ids_are_rejected() {
        let requests = vec![request("q1", &[], &[]), request("q1", &[], &[])];
        let err = evaluate_batch(&precision(), &requests).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_absent_quality_differs_from_zero() {
        let failed = evaluate_batch(&precision(), &[request("q1", &[], &[("a", 0), ("a", 1)])])
            .unwrap();
        let zero = evaluate_batch(&precision(), &[request("q1", &[("a", 0)], &[("a", 0)])])
            .unwrap();
        assert_eq!(zero.quality_level(), Some(0.0));
        assert_ne!(failed, zero);
        assert_ne!(to_bytes(&failed), to_bytes(&zero));

        let json = serde_json::to_value(&failed).unwrap();
        assert!(json["quality_level"].is_null());
        let json = serde_json::to_value(&zero).unwrap();
        assert_eq!(json["quality_level"], 0.0);
    }

    #[test]
    fn test_run_wire_round_trip() {
        let requests = vec![
            request("q1", &[("a", 2)], &[("a", 0), ("c", 1)]),
            request("q2", &[], &[("a", 1), ("b", 1)]),
        ];
        let run = evaluate_batch(&precision(), &requests).unwrap();
        let decoded = EvaluationRun::from_bytes(to_bytes(&run), DetailsRegistry::global()).unwrap();
        assert_eq!(decoded, run);
    }

    #[test]
    fn test_run_decoding_without_decoder_fails() {
        let run = evaluate_batch(&precision(), &[request("q1", &[("a", 2)], &[("a", 0)])]).unwrap();
        let err = EvaluationRun::from_bytes(to_bytes(&run), &DetailsRegistry::new()).unwrap_err();
        assert!(matches!(err, Error::UnknownMetricVariant { .. }));
    }

    #[test]
    fn test_stored_quality_without_successes_is_rejected() {
        let mut out = StreamOutput::new();
        out.write_string("precision");
        out.write_option(Some(&0.5_f64), |o, q| o.write_f64(*q));
        out.write_len(0);
        out.write_len(0);

        let err =
            EvaluationRun::from_bytes(out.into_bytes(), DetailsRegistry::global()).unwrap_err();
        assert!(matches!(err, Error::Wire(_)));
    }

    #[test]
    fn test_stored_quality_must_match_successes() {
        let requests = [request("q1", &[("a", 1)], &[("a", 0), ("b", 1)])];
        let run = evaluate_batch(&precision(), &requests).unwrap();
        assert_eq!(run.quality_level(), Some(0.5));

        for stored in [None, Some(0.75)] {
            let mut out = StreamOutput::new();
            out.write_string(run.metric());
            out.write_option(stored.as_ref(), |o, q| o.write_f64(*q));
            out.write_seq(run.successes().values());
            out.write_seq(run.failures().values());

            let err =
                EvaluationRun::from_bytes(out.into_bytes(), DetailsRegistry::global()).unwrap_err();
            assert!(matches!(err, Error::Wire(_)), "{stored:?} should be rejected");
        }
    }

    /// Cancels the run from inside its first query, then keeps scoring briefly
    struct CancelOnFirstScore {
        cancel: CancellationToken,
        inner: PrecisionAtN,
    }

    impl Metric for CancelOnFirstScore {
        fn name(&self) -> &'static str {
            "cancel_on_first_score"
        }

        fn score(&self, judgments: &Judgments, rated_hits: &[RatedHit]) -> Score {
            self.cancel.cancel();
            std::thread::sleep(std::time::Duration::from_millis(20));
            self.inner.score(judgments, rated_hits)
        }
    }

    #[tokio::test]
    async fn test_cancellation_lets_running_query_finish() {
        let requests = vec![
            request("q0", &[("a", 1)], &[("a", 0)]),
            request("q1", &[("a", 1)], &[("a", 0)]),
            request("q2", &[("a", 1)], &[("a", 0)]),
        ];
        let cancel = CancellationToken::new();
        let metric = CancelOnFirstScore {
            cancel: cancel.clone(),
            inner: precision(),
        };

        let run = Evaluator::new(Arc::new(metric), 1)
            .run(requests, &cancel)
            .await
            .unwrap();

        assert_eq!(run.successes().keys().collect::<Vec<_>>(), vec!["q0"]);
        assert_eq!(run.successes()["q0"].quality_level(), 1.0);
        assert_eq!(
            run.failures()
                .values()
                .map(|f| (f.query_id.as_str(), f.kind))
                .collect::<Vec<_>>(),
            vec![("q1", ErrorKind::Cancelled), ("q2", ErrorKind::Cancelled)]
        );
        assert_eq!(run.quality_level(), Some(1.0));
    }

    #[test]
    fn test_read_requests_classifies_failures() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("input.json");

        let err = read_requests(&path).unwrap_err();
        assert!(matches!(err, Error::WithContext { .. }));
        assert!(err.to_string().starts_with("Failed to read evaluation input"));

        std::fs::write(&path, "{\"id\": ").unwrap();
        let err = read_requests(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Json);

        std::fs::write(&path, "[]").unwrap();
        let err = read_requests(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_read_requests_parses_array() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("input.json");
        let content = r#"[{"id": "q1",
            "ratings": [{"collection": "docs", "doc_id": "a", "rating": 1}],
            "hits": [{"key": {"collection": "docs", "doc_id": "a"}, "rank": 0}]}]"#;
        std::fs::write(&path, content).unwrap();

        let requests = read_requests(&path).unwrap();
        assert_eq!(requests.len(), 1);
        let run = evaluate_batch(&precision(), &requests).unwrap();
        assert_eq!(run.quality_level(), Some(1.0));
    }

    struct Panicking;

    impl Metric for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn score(&self, _judgments: &Judgments, _rated_hits: &[RatedHit]) -> Score {
            panic!("scoring blew up");
        }
    }

    #[tokio::test]
    async fn test_concurrent_run_matches_sequential() {
        let requests: Vec<RatedRequest> = (0..20)
            .map(|i| {
                let id = format!("q{i}");
                if i % 5 == 0 {
                    request(&id, &[("a", 1)], &[("a", 3), ("b", 2)])
                } else {
                    request(&id, &[("a", 1), ("b", i % 3)], &[("a", 0), ("b", 1), ("c", 2)])
                }
            })
            .collect();

        let sequential = evaluate_batch(&precision(), &requests).unwrap();
        let evaluator = Evaluator::new(Arc::new(precision()), 4);
        let concurrent = evaluator
            .run(requests, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(concurrent, sequential);
        assert_eq!(concurrent.failures().len(), 4);
    }

    #[tokio::test]
    async fn test_cancelled_run_records_every_query() {
        let requests = vec![
            request("q1", &[("a", 1)], &[("a", 0)]),
            request("q2", &[("a", 1)], &[("a", 0)]),
        ];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let run = Evaluator::new(Arc::new(precision()), 1)
            .run(requests, &cancel)
            .await
            .unwrap();
        assert_eq!(run.failures().len(), 2);
        assert!(run
            .failures()
            .values()
            .all(|f| f.kind == ErrorKind::Cancelled));
        assert_eq!(run.quality_level(), None);
    }

    #[tokio::test]
    async fn test_panicking_query_is_recorded() {
        let requests = vec![request("q1", &[("a", 1)], &[("a", 0)])];
        let run = Evaluator::new(Arc::new(Panicking), 2)
            .run(requests, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(run.failures()["q1"].kind, ErrorKind::QueryEvaluation);
    }

    #[test]
    fn test_evaluator_from_config() {
        let mut config = Config::default();
        config.metric.kind = "reciprocal_rank".to_string();
        let evaluator = Evaluator::from_config(&config).unwrap();
        assert_eq!(evaluator.metric().name(), "reciprocal_rank");

        config.evaluation.max_concurrent_queries = 0;
        assert!(Evaluator::from_config(&config).is_err());
    }
}

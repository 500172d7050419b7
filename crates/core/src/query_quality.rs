//! Per-query evaluation outcome

use crate::document_key::DocumentKey;
use crate::error::{Error, Result};
use crate::metric_details::{DetailsRegistry, MetricDetails};
use crate::rated_hit::RatedHit;
use crate::wire::{Readable, StreamInput, StreamOutput, Writeable};
use bytes::Bytes;
use derive_builder::Builder;
use serde::Serialize;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

/// Quality of the ranking returned for one query
///
/// Instances only come out of [`QueryQualityResultBuilder::build`], which
/// requires both the rated hits and the metric details to be supplied (the
/// latter possibly as `None`), so a half-populated result is never visible.
///
/// Equality is exact. `quality_level` is compared by bit pattern, so
/// `0.0` and `-0.0` differ and a NaN equals itself; `unknown_docs` compares
/// as a set and `rated_hits` as an ordered sequence.
#[derive(Debug, Clone, Builder, Serialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct QueryQualityResult {
    #[builder(setter(into))]
    id: String,
    quality_level: f64,
    unknown_docs: BTreeSet<DocumentKey>,
    rated_hits: Vec<RatedHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metric_details: Option<MetricDetails>,
}

impl QueryQualityResultBuilder {
    /// Records that the metric attaches no breakdown
    pub fn without_metric_details(&mut self) -> &mut Self {
        self.metric_details(None)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(level) = self.quality_level {
            if !(0.0..=1.0).contains(&level) {
                return Err(format!("quality level {level} is outside [0.0, 1.0]"));
            }
        }
        if let Some(hits) = &self.rated_hits {
            for pair in hits.windows(2) {
                if pair[1].hit.rank <= pair[0].hit.rank {
                    return Err(format!(
                        "rated hits out of rank order: {} at rank {} follows rank {}",
                        pair[1].hit.key, pair[1].hit.rank, pair[0].hit.rank
                    ));
                }
            }
        }
        Ok(())
    }
}

impl From<QueryQualityResultBuilderError> for Error {
    fn from(err: QueryQualityResultBuilderError) -> Self {
        Error::invalid_input(format!("Incomplete query quality result: {err}"))
    }
}

impl QueryQualityResult {
    /// Starts a result with its identity, score and unknown documents. Rated
    /// hits and metric details must still be attached before building.
    pub fn builder(
        id: impl Into<String>,
        quality_level: f64,
        unknown_docs: BTreeSet<DocumentKey>,
    ) -> QueryQualityResultBuilder {
        let mut builder = QueryQualityResultBuilder::default();
        builder
            .id(id)
            .quality_level(quality_level)
            .unknown_docs(unknown_docs);
        builder
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn quality_level(&self) -> f64 {
        self.quality_level
    }

    pub fn unknown_docs(&self) -> &BTreeSet<DocumentKey> {
        &self.unknown_docs
    }

    pub fn rated_hits(&self) -> &[RatedHit] {
        &self.rated_hits
    }

    pub fn metric_details(&self) -> Option<&MetricDetails> {
        self.metric_details.as_ref()
    }

    /// Reads a result, resolving any breakdown through `registry`
    pub fn read_with(input: &mut StreamInput, registry: &DetailsRegistry) -> Result<Self> {
        let id = input.read_string()?;
        let quality_level = input.read_f64()?;
        let unknown_docs = input
            .read_seq(DocumentKey::read_from)?
            .into_iter()
            .collect::<BTreeSet<_>>();
        let rated_hits = input.read_seq(RatedHit::read_from)?;
        let metric_details = input.read_option(|i| registry.read_details(i))?;

        let result = Self::builder(id, quality_level, unknown_docs)
            .rated_hits(rated_hits)
            .metric_details(metric_details)
            .build()?;
        Ok(result)
    }

    /// Decodes a standalone buffer holding exactly one result
    pub fn from_bytes(bytes: impl Into<Bytes>, registry: &DetailsRegistry) -> Result<Self> {
        let mut input = StreamInput::new(bytes);
        let result = Self::read_with(&mut input, registry)?;
        input.finish()?;
        Ok(result)
    }
}

impl PartialEq for QueryQualityResult {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.quality_level.to_bits() == other.quality_level.to_bits()
            && self.unknown_docs == other.unknown_docs
            && self.rated_hits == other.rated_hits
            && self.metric_details == other.metric_details
    }
}

impl Eq for QueryQualityResult {}

impl Hash for QueryQualityResult {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.quality_level.to_bits().hash(state);
        // BTreeSet iterates in key order, so insertion order never leaks in
        self.unknown_docs.hash(state);
        self.rated_hits.hash(state);
        self.metric_details.hash(state);
    }
}

impl Writeable for QueryQualityResult {
    fn write_to(&self, out: &mut StreamOutput) {
        out.write_string(&self.id);
        out.write_f64(self.quality_level);
        out.write_seq(&self.unknown_docs);
        out.write_seq(&self.rated_hits);
        out.write_option(self.metric_details.as_ref(), |o, d| d.write_to(o));
    }
}

impl Readable for QueryQualityResult {
    fn read_from(input: &mut StreamInput) -> Result<Self> {
        Self::read_with(input, DetailsRegistry::global())
    }
}

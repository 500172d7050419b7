//! Metric-specific breakdowns and the tag registry used to decode them
//!
//! Every breakdown travels as its registered tag followed by the variant's
//! own fields. Readers resolve the tag through a [`DetailsRegistry`], so a
//! breakdown produced by a metric the reader does not know about surfaces as
//! [`Error::UnknownMetricVariant`] instead of being misread.

use crate::error::{Error, Result};
use crate::metrics::dcg::DcgBreakdown;
use crate::metrics::precision::PrecisionBreakdown;
use crate::metrics::reciprocal_rank::ReciprocalRankBreakdown;
use crate::wire::{Readable, StreamInput, StreamOutput, Writeable};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, error};

/// Structured explanation of how a metric derived a quality level
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricDetails {
    Precision(PrecisionBreakdown),
    ReciprocalRank(ReciprocalRankBreakdown),
    Dcg(DcgBreakdown),
}

impl MetricDetails {
    /// Stable tag written ahead of the variant's fields
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Precision(_) => PrecisionBreakdown::TAG,
            Self::ReciprocalRank(_) => ReciprocalRankBreakdown::TAG,
            Self::Dcg(_) => DcgBreakdown::TAG,
        }
    }
}

impl From<PrecisionBreakdown> for MetricDetails {
    fn from(value: PrecisionBreakdown) -> Self {
        Self::Precision(value)
    }
}

impl From<ReciprocalRankBreakdown> for MetricDetails {
    fn from(value: ReciprocalRankBreakdown) -> Self {
        Self::ReciprocalRank(value)
    }
}

impl From<DcgBreakdown> for MetricDetails {
    fn from(value: DcgBreakdown) -> Self {
        Self::Dcg(value)
    }
}

impl Writeable for MetricDetails {
    fn write_to(&self, out: &mut StreamOutput) {
        out.write_string(self.tag());
        match self {
            Self::Precision(b) => b.write_to(out),
            Self::ReciprocalRank(b) => b.write_to(out),
            Self::Dcg(b) => b.write_to(out),
        }
    }
}

impl Readable for MetricDetails {
    fn read_from(input: &mut StreamInput) -> Result<Self> {
        DetailsRegistry::global().read_details(input)
    }
}

/// Reads one variant's fields; the tag has already been consumed
pub type DetailsDecoder = fn(&mut StreamInput) -> Result<MetricDetails>;

/// Table of breakdown decoders keyed by tag
#[derive(Debug, Clone, Default)]
pub struct DetailsRegistry {
    decoders: HashMap<String, DetailsDecoder>,
}

static GLOBAL_REGISTRY: OnceLock<DetailsRegistry> = OnceLock::new();

impl DetailsRegistry {
    /// Creates a registry with no decoders
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every breakdown of the built-in metrics
    pub fn with_builtin_metrics() -> Self {
        let mut registry = Self::new();
        for (tag, decoder) in crate::metrics::builtin_details() {
            if let Err(e) = registry.register(tag, decoder) {
                error!("Skipping built-in metric details decoder: {e}");
            }
        }
        registry
    }

    /// Process-wide registry, populated with the built-in metrics on first use
    /// and read-only afterwards
    pub fn global() -> &'static DetailsRegistry {
        GLOBAL_REGISTRY.get_or_init(|| {
            let registry = Self::with_builtin_metrics();
            debug!(
                "Initialized metric details registry with tags {:?}",
                registry.tags()
            );
            registry
        })
    }

    /// Registers a decoder. Tags are unique within a registry.
    pub fn register(&mut self, tag: impl Into<String>, decoder: DetailsDecoder) -> Result<()> {
        let tag = tag.into();
        if self.decoders.contains_key(&tag) {
            return Err(Error::DuplicateVariantTag { tag });
        }
        self.decoders.insert(tag, decoder);
        Ok(())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.decoders.contains_key(tag)
    }

    /// Registered tags in sorted order
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.decoders.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Reads a tagged breakdown block
    pub fn read_details(&self, input: &mut StreamInput) -> Result<MetricDetails> {
        let tag = input.read_string()?;
        let decoder = self
            .decoders
            .get(&tag)
            .ok_or_else(|| Error::unknown_metric_variant(tag.as_str()))?;
        decoder(input)
    }
}

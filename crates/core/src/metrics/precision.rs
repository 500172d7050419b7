//! Precision at N
//!
//! Fraction of the top N returned hits that were judged relevant, i.e. rated
//! at or above the relevance threshold.

use super::{Metric, Score};
use crate::error::{Error, Result};
use crate::metric_details::MetricDetails;
use crate::rated_hit::{Judgments, RatedHit, Rating};
use crate::wire::{StreamInput, StreamOutput, Writeable};
use serde::Serialize;

/// Precision over the first `top_n` hits
#[derive(Debug, Clone)]
pub struct PrecisionAtN {
    top_n: usize,
    relevant_threshold: Rating,
    ignore_unlabeled: bool,
}

impl PrecisionAtN {
    pub const NAME: &'static str = "precision";

    pub fn new(top_n: usize) -> Result<Self> {
        if top_n == 0 {
            return Err(Error::config("precision top_n must be greater than 0"));
        }
        Ok(Self {
            top_n,
            relevant_threshold: 1,
            ignore_unlabeled: false,
        })
    }

    /// Minimum grade counted as relevant (inclusive)
    pub fn with_relevant_threshold(mut self, threshold: Rating) -> Self {
        self.relevant_threshold = threshold;
        self
    }

    /// When set, unrated hits are left out of the retrieved count
    pub fn with_ignore_unlabeled(mut self, ignore: bool) -> Self {
        self.ignore_unlabeled = ignore;
        self
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    pub fn relevant_threshold(&self) -> Rating {
        self.relevant_threshold
    }
}

impl Metric for PrecisionAtN {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn score(&self, _judgments: &Judgments, rated_hits: &[RatedHit]) -> Score {
        let mut relevant_retrieved = 0;
        let mut retrieved = 0;
        for hit in rated_hits.iter().take(self.top_n) {
            if self.ignore_unlabeled && !hit.is_rated() {
                continue;
            }
            retrieved += 1;
            if hit.is_relevant(self.relevant_threshold) {
                relevant_retrieved += 1;
            }
        }

        let breakdown =
            PrecisionBreakdown::new(relevant_retrieved, retrieved, self.relevant_threshold);
        Score {
            quality_level: breakdown.precision(),
            details: Some(breakdown.into()),
        }
    }
}

/// Counts behind a precision score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PrecisionBreakdown {
    pub relevant_retrieved: usize,
    pub retrieved: usize,
    pub relevant_threshold: Rating,
}

impl PrecisionBreakdown {
    pub const TAG: &'static str = "precision";

    pub fn new(relevant_retrieved: usize, retrieved: usize, relevant_threshold: Rating) -> Self {
        Self {
            relevant_retrieved,
            retrieved,
            relevant_threshold,
        }
    }

    /// `relevant_retrieved / retrieved`, or 0.0 when nothing was retrieved
    pub fn precision(&self) -> f64 {
        if self.retrieved == 0 {
            0.0
        } else {
            self.relevant_retrieved as f64 / self.retrieved as f64
        }
    }

    pub fn read_fields(input: &mut StreamInput) -> Result<Self> {
        let relevant_retrieved = input.read_usize()?;
        let retrieved = input.read_usize()?;
        let relevant_threshold = input.read_i32()?;
        if relevant_retrieved > retrieved {
            return Err(Error::wire(format!(
                "precision breakdown has {relevant_retrieved} relevant of {retrieved} retrieved"
            )));
        }
        Ok(Self::new(relevant_retrieved, retrieved, relevant_threshold))
    }

    pub fn decode(input: &mut StreamInput) -> Result<MetricDetails> {
        Self::read_fields(input).map(MetricDetails::from)
    }
}

impl Writeable for PrecisionBreakdown {
    fn write_to(&self, out: &mut StreamOutput) {
        out.write_usize(self.relevant_retrieved);
        out.write_usize(self.retrieved);
        out.write_i32(self.relevant_threshold);
    }
}

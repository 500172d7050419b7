//! Reciprocal rank of the first relevant hit

use super::{Metric, Score};
use crate::error::{Error, Result};
use crate::metric_details::MetricDetails;
use crate::rated_hit::{Judgments, RatedHit, Rating};
use crate::wire::{StreamInput, StreamOutput, Writeable};
use serde::Serialize;

/// `1 / position` of the first relevant hit within the top N, 0.0 if none
#[derive(Debug, Clone)]
pub struct ReciprocalRank {
    top_n: usize,
    relevant_threshold: Rating,
}

impl ReciprocalRank {
    pub const NAME: &'static str = "reciprocal_rank";

    pub fn new(top_n: usize) -> Result<Self> {
        if top_n == 0 {
            return Err(Error::config("reciprocal rank top_n must be greater than 0"));
        }
        Ok(Self {
            top_n,
            relevant_threshold: 1,
        })
    }

    pub fn with_relevant_threshold(mut self, threshold: Rating) -> Self {
        self.relevant_threshold = threshold;
        self
    }
}

impl Metric for ReciprocalRank {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn score(&self, _judgments: &Judgments, rated_hits: &[RatedHit]) -> Score {
        let first_relevant_rank = rated_hits
            .iter()
            .take(self.top_n)
            .position(|hit| hit.is_relevant(self.relevant_threshold))
            .map(|index| index + 1);

        let breakdown = ReciprocalRankBreakdown::new(first_relevant_rank);
        Score {
            quality_level: breakdown.reciprocal_rank(),
            details: Some(breakdown.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ReciprocalRankBreakdown {
    /// One-based position of the first relevant hit
    pub first_relevant_rank: Option<usize>,
}

impl ReciprocalRankBreakdown {
    pub const TAG: &'static str = "reciprocal_rank";

    pub fn new(first_relevant_rank: Option<usize>) -> Self {
        Self {
            first_relevant_rank,
        }
    }

    pub fn reciprocal_rank(&self) -> f64 {
        match self.first_relevant_rank {
            Some(rank) if rank > 0 => 1.0 / rank as f64,
            _ => 0.0,
        }
    }

    pub fn read_fields(input: &mut StreamInput) -> Result<Self> {
        let first_relevant_rank = input.read_option(|i| i.read_usize())?;
        if first_relevant_rank == Some(0) {
            return Err(Error::wire("reciprocal rank positions start at 1"));
        }
        Ok(Self::new(first_relevant_rank))
    }

    pub fn decode(input: &mut StreamInput) -> Result<MetricDetails> {
        Self::read_fields(input).map(MetricDetails::from)
    }
}

impl Writeable for ReciprocalRankBreakdown {
    fn write_to(&self, out: &mut StreamOutput) {
        out.write_option(self.first_relevant_rank.as_ref(), |o, r| o.write_usize(*r));
    }
}

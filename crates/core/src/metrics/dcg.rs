//! Normalized discounted cumulative gain at N
//!
//! DCG@N = Σ (2^grade − 1) / log2(position + 1), positions one-based.
//! The ideal DCG ranks every known grade in descending order, and the
//! reported quality is DCG / ideal DCG, so it always falls in `[0, 1]`.
//! Grades above [`MAX_GAIN_GRADE`] earn the same gain as that grade, which
//! keeps every sum finite.

use super::{Metric, Score};
use crate::error::{Error, Result};
use crate::metric_details::MetricDetails;
use crate::rated_hit::{Judgments, RatedHit, Rating};
use crate::wire::{StreamInput, StreamOutput, Writeable};
use serde::Serialize;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone)]
pub struct NormalizedDcg {
    top_n: usize,
    unknown_doc_rating: Option<Rating>,
}

impl NormalizedDcg {
    pub const NAME: &'static str = "dcg";

    pub fn new(top_n: usize) -> Result<Self> {
        if top_n == 0 {
            return Err(Error::config("dcg top_n must be greater than 0"));
        }
        Ok(Self {
            top_n,
            unknown_doc_rating: None,
        })
    }

    /// Grade assumed for unrated hits; without one they contribute no gain
    pub fn with_unknown_doc_rating(mut self, rating: Option<Rating>) -> Self {
        self.unknown_doc_rating = rating;
        self
    }
}

/// Highest grade with a distinct gain
pub const MAX_GAIN_GRADE: Rating = 64;

fn gain(rating: Rating) -> f64 {
    2_f64.powi(rating.clamp(0, MAX_GAIN_GRADE)) - 1.0
}

fn discounted_sum(grades: impl Iterator<Item = Rating>) -> f64 {
    grades
        .enumerate()
        .map(|(index, grade)| gain(grade) / (index as f64 + 2.0).log2())
        .sum()
}

impl Metric for NormalizedDcg {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn score(&self, judgments: &Judgments, rated_hits: &[RatedHit]) -> Score {
        let top = &rated_hits[..rated_hits.len().min(self.top_n)];
        let unrated_docs = top.iter().filter(|h| !h.is_rated()).count();

        let grades: Vec<Rating> = top
            .iter()
            .map(|h| h.rating.or(self.unknown_doc_rating).unwrap_or(0))
            .collect();
        let dcg = discounted_sum(grades.iter().copied());

        // Unrated hits that were assigned a grade are part of the ideal ranking
        // too, so the ideal always dominates the observed ranking.
        let mut ideal_grades: Vec<Rating> = judgments.values().copied().collect();
        if let Some(assumed) = self.unknown_doc_rating {
            ideal_grades.extend(std::iter::repeat_n(assumed, unrated_docs));
        }
        ideal_grades.sort_unstable_by(|a, b| b.cmp(a));
        let ideal_dcg = discounted_sum(ideal_grades.into_iter().take(self.top_n));

        let breakdown = DcgBreakdown::new(dcg, ideal_dcg, unrated_docs);
        Score {
            quality_level: breakdown.normalized(),
            details: Some(breakdown.into()),
        }
    }
}

/// Raw and ideal gain behind an nDCG score
///
/// Floats compare by bit pattern.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DcgBreakdown {
    pub dcg: f64,
    pub ideal_dcg: f64,
    /// Unrated hits within the cutoff
    pub unrated_docs: usize,
}

impl DcgBreakdown {
    pub const TAG: &'static str = "dcg";

    pub fn new(dcg: f64, ideal_dcg: f64, unrated_docs: usize) -> Self {
        Self {
            dcg,
            ideal_dcg,
            unrated_docs,
        }
    }

    /// `dcg / ideal_dcg` clamped to `[0, 1]`, 0.0 when no ideal gain exists
    pub fn normalized(&self) -> f64 {
        if self.ideal_dcg > 0.0 && self.ideal_dcg.is_finite() {
            (self.dcg / self.ideal_dcg).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn read_fields(input: &mut StreamInput) -> Result<Self> {
        let dcg = input.read_f64()?;
        let ideal_dcg = input.read_f64()?;
        let unrated_docs = input.read_usize()?;
        Ok(Self::new(dcg, ideal_dcg, unrated_docs))
    }

    pub fn decode(input: &mut StreamInput) -> Result<MetricDetails> {
        Self::read_fields(input).map(MetricDetails::from)
    }
}

impl PartialEq for DcgBreakdown {
    fn eq(&self, other: &Self) -> bool {
        self.dcg.to_bits() == other.dcg.to_bits()
            && self.ideal_dcg.to_bits() == other.ideal_dcg.to_bits()
            && self.unrated_docs == other.unrated_docs
    }
}

impl Eq for DcgBreakdown {}

impl Hash for DcgBreakdown {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dcg.to_bits().hash(state);
        self.ideal_dcg.to_bits().hash(state);
        self.unrated_docs.hash(state);
    }
}

impl Writeable for DcgBreakdown {
    fn write_to(&self, out: &mut StreamOutput) {
        out.write_f64(self.dcg);
        out.write_f64(self.ideal_dcg);
        out.write_usize(self.unrated_docs);
    }
}

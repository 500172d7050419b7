//! Returned search hits and their reconciliation with judgments

use crate::document_key::DocumentKey;
use crate::error::{Error, Result};
use crate::wire::{Readable, StreamInput, StreamOutput, Writeable};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

/// Relevance grade a judge assigned to a document
pub type Rating = i32;

/// Judgment set for one query, keyed by document
pub type Judgments = HashMap<DocumentKey, Rating>;

/// One document returned by a search execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub key: DocumentKey,
    /// Zero-based position in the returned list
    pub rank: usize,
    /// Retrieval score reported by the search engine, if any
    #[serde(default)]
    pub score: Option<f32>,
}

impl SearchHit {
    pub fn new(key: DocumentKey, rank: usize, score: Option<f32>) -> Self {
        Self { key, rank, score }
    }
}

// Scores compare by bit pattern so that equality stays reflexive and agrees
// with Hash, including for NaN.
impl PartialEq for SearchHit {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.rank == other.rank
            && self.score.map(f32::to_bits) == other.score.map(f32::to_bits)
    }
}

impl Eq for SearchHit {}

impl Hash for SearchHit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.rank.hash(state);
        self.score.map(f32::to_bits).hash(state);
    }
}

impl Writeable for SearchHit {
    fn write_to(&self, out: &mut StreamOutput) {
        self.key.write_to(out);
        out.write_usize(self.rank);
        out.write_option(self.score.as_ref(), |o, s| o.write_f32(*s));
    }
}

impl Readable for SearchHit {
    fn read_from(input: &mut StreamInput) -> Result<Self> {
        let key = DocumentKey::read_from(input)?;
        let rank = input.read_usize()?;
        let score = input.read_option(|i| i.read_f32())?;
        Ok(Self { key, rank, score })
    }
}

/// A returned hit paired with the grade it was judged with, if any
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RatedHit {
    pub hit: SearchHit,
    /// `None` marks an unrated hit: the document had no judgment
    pub rating: Option<Rating>,
}

impl RatedHit {
    pub fn new(hit: SearchHit, rating: Option<Rating>) -> Self {
        Self { hit, rating }
    }

    pub fn key(&self) -> &DocumentKey {
        &self.hit.key
    }

    pub fn is_rated(&self) -> bool {
        self.rating.is_some()
    }

    /// True when the hit carries a grade of at least `threshold`
    pub fn is_relevant(&self, threshold: Rating) -> bool {
        self.rating.is_some_and(|r| r >= threshold)
    }
}

impl Writeable for RatedHit {
    fn write_to(&self, out: &mut StreamOutput) {
        self.hit.write_to(out);
        out.write_option(self.rating.as_ref(), |o, r| o.write_i32(*r));
    }
}

impl Readable for RatedHit {
    fn read_from(input: &mut StreamInput) -> Result<Self> {
        let hit = SearchHit::read_from(input)?;
        let rating = input.read_option(|i| i.read_i32())?;
        Ok(Self { hit, rating })
    }
}

/// Checks that ranks are strictly increasing and that no document repeats
pub fn validate_hits(hits: &[SearchHit]) -> Result<()> {
    let mut seen = HashSet::with_capacity(hits.len());
    let mut previous: Option<usize> = None;
    for hit in hits {
        if let Some(prev) = previous {
            if hit.rank <= prev {
                return Err(Error::invalid_hit_sequence(format!(
                    "rank {} of {} does not follow rank {prev}",
                    hit.rank, hit.key
                )));
            }
        }
        previous = Some(hit.rank);
        if !seen.insert(&hit.key) {
            return Err(Error::DuplicateHit(hit.key.clone()));
        }
    }
    Ok(())
}

/// Pairs every returned hit with its judgment, preserving rank order
///
/// Hits must already have passed [`validate_hits`].
pub fn rate_hits(judgments: &Judgments, hits: &[SearchHit]) -> Vec<RatedHit> {
    hits.iter()
        .map(|hit| RatedHit::new(hit.clone(), judgments.get(&hit.key).copied()))
        .collect()
}

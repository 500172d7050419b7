//! Property tests for query quality results and metric breakdowns

use proptest::collection::{btree_set, hash_map, vec as prop_vec};
use proptest::option;
use proptest::prelude::*;
use rankeval_core::{
    from_bytes, to_bytes, DcgBreakdown, DetailsDecoder, DetailsRegistry, DocumentKey, Error,
    Judgments, Metric, MetricDetails, NormalizedDcg, PrecisionAtN, PrecisionBreakdown,
    QueryQualityResult, RatedHit, ReciprocalRank, ReciprocalRankBreakdown, SearchHit,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn document_key() -> impl Strategy<Value = DocumentKey> {
    ("[a-c]{1,3}", "[a-z0-9]{1,8}")
        .prop_map(|(collection, doc_id)| DocumentKey::new(collection, doc_id))
}

/// Hits with strictly increasing ranks, possibly with gaps
fn rated_hits() -> impl Strategy<Value = Vec<RatedHit>> {
    prop_vec(
        (
            document_key(),
            1usize..4,
            option::of(-100.0f32..100.0),
            option::of(-1i32..5),
        ),
        0..8,
    )
    .prop_map(|entries| {
        let mut rank = 0;
        entries
            .into_iter()
            .map(|(key, gap, score, rating)| {
                let hit = RatedHit::new(SearchHit::new(key, rank, score), rating);
                rank += gap;
                hit
            })
            .collect()
    })
}

fn metric_details() -> impl Strategy<Value = MetricDetails> {
    prop_oneof![
        (0usize..50, 0usize..50, -2i32..5).prop_map(|(a, b, threshold)| {
            MetricDetails::from(PrecisionBreakdown::new(a.min(b), a.max(b), threshold))
        }),
        option::of(1usize..100)
            .prop_map(|rank| MetricDetails::from(ReciprocalRankBreakdown::new(rank))),
        (0.0f64..100.0, 0.0f64..100.0, 0usize..10).prop_map(|(dcg, ideal, unrated)| {
            MetricDetails::from(DcgBreakdown::new(dcg, ideal, unrated))
        }),
    ]
}

fn query_quality() -> impl Strategy<Value = QueryQualityResult> {
    (
        "[a-z0-9_]{1,12}",
        0.0f64..=1.0,
        btree_set(document_key(), 0..5),
        rated_hits(),
        option::of(metric_details()),
    )
        .prop_map(|(id, quality, unknown_docs, hits, details)| {
            QueryQualityResult::builder(id, quality, unknown_docs)
                .rated_hits(hits)
                .metric_details(details)
                .build()
                .unwrap()
        })
}

/// Rebuilds `original` with exactly one field changed
fn mutate(original: &QueryQualityResult, field: usize) -> QueryQualityResult {
    let mut id = original.id().to_string();
    let mut quality = original.quality_level();
    let mut unknown_docs = original.unknown_docs().clone();
    let mut hits = original.rated_hits().to_vec();
    let mut details = original.metric_details().cloned();

    match field {
        0 => id.push_str("_changed"),
        1 => quality = if quality < 0.5 { quality + 0.25 } else { quality - 0.25 },
        2 => {
            unknown_docs.insert(DocumentKey::new("fresh", "never-generated"));
        }
        3 => {
            let rank = hits.last().map_or(0, |h| h.hit.rank + 1);
            hits.push(RatedHit::new(
                SearchHit::new(DocumentKey::new("fresh", "appended"), rank, None),
                Some(1),
            ));
        }
        _ => {
            details = match details {
                Some(_) => None,
                None => Some(PrecisionBreakdown::new(1, 2, 1).into()),
            }
        }
    }

    QueryQualityResult::builder(id, quality, unknown_docs)
        .rated_hits(hits)
        .metric_details(details)
        .build()
        .unwrap()
}

/// A judgment set and a hit list over the same small document pool
fn judged_hits() -> impl Strategy<Value = (Judgments, Vec<SearchHit>)> {
    (
        hash_map(0u8..20, -1i32..5, 0..12),
        btree_set(0u8..20, 0..12)
            .prop_map(|ids| ids.into_iter().collect::<Vec<_>>())
            .prop_shuffle(),
    )
        .prop_map(|(grades, returned)| {
            let key = |doc: u8| DocumentKey::new("idx", format!("doc{doc}"));
            let judgments = grades.into_iter().map(|(doc, g)| (key(doc), g)).collect();
            let hits = returned
                .into_iter()
                .enumerate()
                .map(|(rank, doc)| SearchHit::new(key(doc), rank, None))
                .collect();
            (judgments, hits)
        })
}

proptest! {
    #[test]
    fn round_trip_preserves_equality_and_hash(result in query_quality()) {
        let decoded = QueryQualityResult::from_bytes(to_bytes(&result), DetailsRegistry::global())
            .unwrap();
        prop_assert_eq!(&decoded, &result);
        prop_assert_eq!(hash_of(&decoded), hash_of(&result));
    }

    #[test]
    fn registered_details_round_trip(details in metric_details()) {
        let decoded: MetricDetails = from_bytes(to_bytes(&details)).unwrap();
        prop_assert_eq!(decoded, details);
    }

    #[test]
    fn unregistered_tag_is_rejected(details in metric_details()) {
        let mut registry = DetailsRegistry::new();
        for (tag, decoder) in [
            (PrecisionBreakdown::TAG, PrecisionBreakdown::decode as DetailsDecoder),
            (ReciprocalRankBreakdown::TAG, ReciprocalRankBreakdown::decode as DetailsDecoder),
            (DcgBreakdown::TAG, DcgBreakdown::decode as DetailsDecoder),
        ] {
            if tag != details.tag() {
                registry.register(tag, decoder).unwrap();
            }
        }

        let result = QueryQualityResult::builder("q", 0.5, Default::default())
            .rated_hits(Vec::new())
            .metric_details(Some(details.clone()))
            .build()
            .unwrap();
        let err = QueryQualityResult::from_bytes(to_bytes(&result), &registry).unwrap_err();
        let is_unknown_tag =
            matches!(err, Error::UnknownMetricVariant { ref tag } if tag == details.tag());
        prop_assert!(is_unknown_tag);
    }

    #[test]
    fn changing_any_field_breaks_equality(result in query_quality(), field in 0usize..5) {
        let mutated = mutate(&result, field);
        prop_assert_ne!(&mutated, &result);
    }

    #[test]
    fn quality_level_stays_in_unit_interval(
        (judgments, hits) in judged_hits(),
        top_n in 1usize..15,
        threshold in 0i32..4,
        unknown_doc_rating in option::of(0i32..4),
    ) {
        let metrics: Vec<Box<dyn Metric>> = vec![
            Box::new(PrecisionAtN::new(top_n).unwrap().with_relevant_threshold(threshold)),
            Box::new(
                PrecisionAtN::new(top_n)
                    .unwrap()
                    .with_relevant_threshold(threshold)
                    .with_ignore_unlabeled(true),
            ),
            Box::new(ReciprocalRank::new(top_n).unwrap().with_relevant_threshold(threshold)),
            Box::new(NormalizedDcg::new(top_n).unwrap().with_unknown_doc_rating(unknown_doc_rating)),
        ];

        for metric in &metrics {
            let result = metric.evaluate("q", &judgments, &hits).unwrap();
            prop_assert!(
                (0.0..=1.0).contains(&result.quality_level()),
                "{} produced {}",
                metric.name(),
                result.quality_level()
            );
            prop_assert_eq!(result.rated_hits().len(), hits.len());
        }
    }
}

#[test]
fn mutated_fields_change_hash_for_fixed_result() {
    let result = QueryQualityResult::builder(
        "q1",
        0.5,
        [DocumentKey::new("idx", "c")].into_iter().collect(),
    )
    .rated_hits(vec![RatedHit::new(
        SearchHit::new(DocumentKey::new("idx", "a"), 0, Some(2.5)),
        Some(2),
    )])
    .metric_details(Some(PrecisionBreakdown::new(1, 1, 1).into()))
    .build()
    .unwrap();

    let original = hash_of(&result);
    for field in 0..5 {
        assert_ne!(hash_of(&mutate(&result, field)), original, "field {field}");
    }
}

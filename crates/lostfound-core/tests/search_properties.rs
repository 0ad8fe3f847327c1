//! Property-based tests for search ranking.
//!
//! **Property 2: Threshold correctness** every hit meets `min_similarity` and
//! hits are sorted non-increasing by similarity.
//! **Property 3: Cap correctness** at most `top_k` hits unless `top_k` is
//! "all", in which case every qualifying record is returned.

use chrono::Utc;
use lostfound_core::{
    store::cosine_similarity, ItemId, ItemMetadata, MemoryVectorStore, Owner, TopK, VectorStore,
};
use proptest::prelude::*;

const DIMENSION: usize = 4;

fn vector_strategy() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-1.0f32..1.0f32, DIMENSION)
        .prop_filter("non-zero vector", |v| v.iter().any(|x| x.abs() > 1e-3))
}

fn top_k_strategy() -> impl Strategy<Value = TopK> {
    prop_oneof![
        (0usize..20).prop_map(TopK::Limit),
        Just(TopK::All),
    ]
}

fn metadata(i: usize) -> ItemMetadata {
    ItemMetadata {
        title: format!("item {i}"),
        description: String::new(),
        location: String::new(),
        image_url: format!("/images/{i}.png"),
        submitter: Owner {
            subject: "u1".to_string(),
            email: "u1@example.com".to_string(),
        },
        created_at: Utc::now(),
    }
}

fn populated(vectors: &[Vec<f32>]) -> MemoryVectorStore {
    let store = MemoryVectorStore::new(DIMENSION, 1_000);
    futures::executor::block_on(async {
        for (i, vector) in vectors.iter().enumerate() {
            store
                .insert(ItemId::from(format!("item-{i}")), vector.clone(), metadata(i))
                .await
                .expect("Insert failed");
        }
    });
    store
}

/// Property 2: Threshold correctness
#[test]
fn prop_hits_meet_threshold_and_are_sorted() {
    proptest!(|(
        vectors in prop::collection::vec(vector_strategy(), 0..40),
        query in vector_strategy(),
        min_similarity in -1.0f32..1.0f32,
        top_k in top_k_strategy(),
    )| {
        let store = populated(&vectors);
        let hits = futures::executor::block_on(store.search(&query, top_k, min_similarity))
            .expect("Search failed");

        for hit in &hits {
            prop_assert!(
                hit.similarity >= min_similarity,
                "similarity {} below threshold {}",
                hit.similarity,
                min_similarity
            );
        }
        for pair in hits.windows(2) {
            prop_assert!(pair[0].similarity >= pair[1].similarity);
        }
    });
}

/// Property 3: Cap correctness
#[test]
fn prop_hits_respect_cap() {
    proptest!(|(
        vectors in prop::collection::vec(vector_strategy(), 0..40),
        query in vector_strategy(),
        min_similarity in -1.0f32..1.0f32,
        top_k in top_k_strategy(),
    )| {
        let store = populated(&vectors);
        let hits = futures::executor::block_on(store.search(&query, top_k, min_similarity))
            .expect("Search failed");

        let qualifying = vectors
            .iter()
            .filter(|v| cosine_similarity(&query, v) >= min_similarity)
            .count();
        match top_k {
            TopK::Limit(limit) => {
                prop_assert!(hits.len() <= limit);
                prop_assert_eq!(hits.len(), qualifying.min(limit));
            }
            TopK::All => prop_assert_eq!(hits.len(), qualifying),
        }
    });
}

/// Property 2: Truncation never drops a better hit in favour of a worse one
#[test]
fn prop_truncation_keeps_best_hits() {
    proptest!(|(
        vectors in prop::collection::vec(vector_strategy(), 1..40),
        query in vector_strategy(),
        limit in 1usize..10,
    )| {
        let store = populated(&vectors);
        let capped = futures::executor::block_on(store.search(&query, TopK::Limit(limit), -1.0))
            .expect("Search failed");
        let all = futures::executor::block_on(store.search(&query, TopK::All, -1.0))
            .expect("Search failed");

        let expected: Vec<_> = all.iter().take(limit).map(|hit| hit.id.clone()).collect();
        let actual: Vec<_> = capped.iter().map(|hit| hit.id.clone()).collect();
        prop_assert_eq!(actual, expected);
    });
}

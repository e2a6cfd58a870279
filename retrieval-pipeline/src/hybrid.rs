use std::{cmp::Ordering, collections::HashMap};

use common::storage::{db::SurrealDbClient, types::StoredObject};
use common::utils::embedding::EmbeddingProvider;

use crate::{
    fts::{search_chunks_by_keywords, ChunkQueryFilter},
    scoring::RetrievedChunk,
    vector::search_chunks_by_vector,
};

/// Merges the two signal lists into one deduplicated candidate set.
///
/// Vector results are inserted first; keyword results then either join
/// as keyword-only entries or add keyword provenance to an existing
/// entry. A chunk surfaced by both signals appears once, carrying both
/// scores.
pub fn merge_signals(
    vector_results: Vec<RetrievedChunk>,
    keyword_results: Vec<RetrievedChunk>,
) -> Vec<RetrievedChunk> {
    let mut by_id: HashMap<String, RetrievedChunk> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for scored in vector_results {
        let id = scored.item.get_id().to_owned();
        if !by_id.contains_key(&id) {
            order.push(id.clone());
        }
        by_id.insert(id, scored);
    }
    for scored in keyword_results {
        let id = scored.item.get_id().to_owned();
        match by_id.get_mut(&id) {
            Some(existing) => {
                existing.scores.keyword = scored.scores.keyword;
            }
            None => {
                order.push(id.clone());
                by_id.insert(id, scored);
            }
        }
    }

    let mut merged: Vec<RetrievedChunk> = order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .collect();
    rank(&mut merged);
    merged
}

/// Ranking rule: anything the vector signal surfaced outranks
/// keyword-only hits regardless of score, then primary score descending
/// inside each bucket, with the global id as a deterministic tie-break.
pub fn rank(candidates: &mut [RetrievedChunk]) {
    candidates.sort_by(|a, b| {
        let a_has_vector = a.scores.vector.is_some();
        let b_has_vector = b.scores.vector.is_some();
        b_has_vector
            .cmp(&a_has_vector)
            .then_with(|| {
                b.scores
                    .primary()
                    .partial_cmp(&a.scores.primary())
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.item.get_id().cmp(b.item.get_id()))
    });
}

/// Runs both adapters against the same filter and merges the results.
pub async fn search_chunks_hybrid(
    db: &SurrealDbClient,
    embedder: &EmbeddingProvider,
    take: usize,
    query: &str,
    filter: &ChunkQueryFilter,
) -> Vec<RetrievedChunk> {
    let vector_results = search_chunks_by_vector(db, embedder, take, query, filter).await;
    let keyword_results = search_chunks_by_keywords(db, take, query, filter).await;
    merge_signals(vector_results, keyword_results)
}

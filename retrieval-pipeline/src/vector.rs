use serde::Deserialize;
use surrealdb::sql::Thing;
use tracing::{debug, warn};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{document_chunk::DocumentChunk, StoredObject},
    },
    utils::embedding::EmbeddingProvider,
};

use crate::{
    fts::ChunkQueryFilter,
    scoring::{distance_to_similarity, RetrievedChunk, Scored},
};

#[derive(Debug, Deserialize)]
struct KnnRow {
    chunk: String,
    chunk_id: i64,
    distance: Option<f32>,
}

/// KNN search over chunk embeddings, scoped to one document. The query
/// text is embedded here; both embedding and transport failures degrade
/// to an empty result, mirroring the keyword adapter.
///
/// The chunk-id bound is applied after the KNN pass rather than inside
/// the query; narrowing the KNN WHERE clause further would shrink the
/// neighbour pool before the range is known, so the index returns its
/// neighbours and the bound is enforced on the rows.
pub async fn search_chunks_by_vector(
    db: &SurrealDbClient,
    embedder: &EmbeddingProvider,
    take: usize,
    query: &str,
    filter: &ChunkQueryFilter,
) -> Vec<RetrievedChunk> {
    match try_search_by_vector(db, embedder, take, query, filter).await {
        Ok(results) => results,
        Err(e) => {
            warn!(error = %e, "vector search failed, continuing without semantic signal");
            Vec::new()
        }
    }
}

async fn try_search_by_vector(
    db: &SurrealDbClient,
    embedder: &EmbeddingProvider,
    take: usize,
    query: &str,
    filter: &ChunkQueryFilter,
) -> Result<Vec<RetrievedChunk>, AppError> {
    let query_embedding = embedder.embed(query).await?;

    debug!(limit = take, "executing vector chunk search");

    let knn_query = format!(
        "SELECT chunk, chunk_id, vector::distance::knn() AS distance \
         FROM document_chunk_embedding \
         WHERE document_id = $document_id AND embedding <|{take},40|> {query_embedding:?} \
         ORDER BY distance ASC"
    );

    let mut response = db
        .query(knn_query)
        .bind(("document_id", filter.document_id.clone()))
        .await?;
    let mut rows: Vec<KnnRow> = response.take(0)?;

    rows.retain(|row| {
        filter.id_lo.is_none_or(|lo| row.chunk_id >= lo)
            && filter.id_hi.is_none_or(|hi| row.chunk_id <= hi)
    });
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let thing_ids: Vec<Thing> = rows
        .iter()
        .map(|row| Thing::from((DocumentChunk::table_name(), row.chunk.as_str())))
        .collect();

    let mut items_response = db
        .query("SELECT * FROM document_chunk WHERE id IN $things")
        .bind(("things", thing_ids))
        .await?;
    let items: Vec<DocumentChunk> = items_response.take(0)?;

    let mut item_map: std::collections::HashMap<String, DocumentChunk> = items
        .into_iter()
        .map(|item| (item.get_id().to_owned(), item))
        .collect();

    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(item) = item_map.remove(&row.chunk) {
            let score = distance_to_similarity(row.distance.unwrap_or(f32::INFINITY));
            results.push(Scored::new(item).with_vector_score(score));
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const DIM: usize = 8;

    async fn seeded_db(
        embedder: &EmbeddingProvider,
        chunks: Vec<DocumentChunk>,
    ) -> SurrealDbClient {
        let db = SurrealDbClient::memory("vector_test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("failed to create in-memory surreal");
        db.ensure_indexes(DIM)
            .await
            .expect("failed to define indexes");
        for chunk in chunks {
            let embedding = embedder.embed(&chunk.text).await.expect("embed failed");
            DocumentChunk::store_with_embedding(chunk, embedding, &db)
                .await
                .expect("failed to insert chunk");
        }
        db.rebuild_indexes().await.expect("failed to rebuild indexes");
        db
    }

    fn chunk(chunk_id: i64, document_id: &str, text: &str) -> DocumentChunk {
        DocumentChunk::new(chunk_id, document_id.into(), chunk_id.to_string(), text.into())
    }

    #[tokio::test]
    async fn exact_text_match_ranks_first_with_top_score() {
        let embedder = EmbeddingProvider::new_hashed(DIM);
        let db = seeded_db(
            &embedder,
            vec![
                chunk(1, "doc-1", "dividend distribution policy"),
                chunk(2, "doc-1", "completely unrelated meeting minutes"),
            ],
        )
        .await;

        let filter = ChunkQueryFilter::for_document("doc-1");
        let results =
            search_chunks_by_vector(&db, &embedder, 2, "dividend distribution policy", &filter)
                .await;

        assert!(!results.is_empty(), "expected KNN results");
        assert_eq!(results[0].item.chunk_id, 1);
        let score = results[0].scores.vector.expect("missing vector score");
        assert!(score > 0.99, "identical text should score near 1, got {score}");
    }

    #[tokio::test]
    async fn chunk_id_bound_is_applied_to_knn_hits() {
        let embedder = EmbeddingProvider::new_hashed(DIM);
        let db = seeded_db(
            &embedder,
            vec![
                chunk(1, "doc-1", "board composition"),
                chunk(9, "doc-1", "board composition"),
            ],
        )
        .await;

        let filter = ChunkQueryFilter {
            document_id: "doc-1".into(),
            id_lo: Some(5),
            id_hi: None,
        };
        let results = search_chunks_by_vector(&db, &embedder, 5, "board composition", &filter).await;

        assert!(results.iter().all(|r| r.item.chunk_id >= 5));
        assert!(results.iter().any(|r| r.item.chunk_id == 9));
    }
}

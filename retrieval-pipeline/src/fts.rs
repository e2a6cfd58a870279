use std::collections::HashMap;

use serde::Deserialize;
use surrealdb::sql::Thing;
use tracing::{debug, warn};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{deserialize_flexible_id, document_chunk::DocumentChunk, StoredObject},
    },
};

use crate::scoring::{RetrievedChunk, Scored};

/// Narrows adapter queries to one document and an optional chunk-id
/// interval.
#[derive(Debug, Clone)]
pub struct ChunkQueryFilter {
    pub document_id: String,
    pub id_lo: Option<i64>,
    pub id_hi: Option<i64>,
}

impl ChunkQueryFilter {
    pub fn for_document(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            id_lo: None,
            id_hi: None,
        }
    }

    fn range_clause(&self) -> String {
        let mut clause = String::new();
        if self.id_lo.is_some() {
            clause.push_str(" AND chunk_id >= $id_lo");
        }
        if self.id_hi.is_some() {
            clause.push_str(" AND chunk_id <= $id_hi");
        }
        clause
    }
}

#[derive(Debug, Deserialize)]
struct FtsScoreRow {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    id: String,
    fts_score: Option<f32>,
}

/// BM25 search over chunk text, scoped to one document. Backend
/// failures degrade to an empty result so one signal going dark never
/// takes the whole retrieval down.
pub async fn search_chunks_by_keywords(
    db: &SurrealDbClient,
    take: usize,
    terms: &str,
    filter: &ChunkQueryFilter,
) -> Vec<RetrievedChunk> {
    match try_search_by_keywords(db, take, terms, filter).await {
        Ok(results) => results,
        Err(e) => {
            warn!(error = %e, "keyword search failed, continuing without text signal");
            Vec::new()
        }
    }
}

async fn try_search_by_keywords(
    db: &SurrealDbClient,
    take: usize,
    terms: &str,
    filter: &ChunkQueryFilter,
) -> Result<Vec<RetrievedChunk>, AppError> {
    let sql = format!(
        "SELECT id, \
           (IF search::score(0) != NONE THEN search::score(0) ELSE 0 END) AS fts_score \
         FROM document_chunk \
         WHERE text @0@ $terms \
           AND document_id = $document_id{range} \
         ORDER BY fts_score DESC \
         LIMIT $limit",
        range = filter.range_clause()
    );

    debug!(limit = take, "executing keyword chunk search");

    let mut response = db
        .query(sql)
        .bind(("terms", terms.to_owned()))
        .bind(("document_id", filter.document_id.clone()))
        .bind(("id_lo", filter.id_lo))
        .bind(("id_hi", filter.id_hi))
        .bind(("limit", take as i64))
        .await?;

    let score_rows: Vec<FtsScoreRow> = response.take(0)?;
    if score_rows.is_empty() {
        return Ok(Vec::new());
    }

    let thing_ids: Vec<Thing> = score_rows
        .iter()
        .map(|row| Thing::from((DocumentChunk::table_name(), row.id.as_str())))
        .collect();

    let mut items_response = db
        .query("SELECT * FROM document_chunk WHERE id IN $things")
        .bind(("things", thing_ids))
        .await?;
    let items: Vec<DocumentChunk> = items_response.take(0)?;

    let mut item_map: HashMap<String, DocumentChunk> = items
        .into_iter()
        .map(|item| (item.get_id().to_owned(), item))
        .collect();

    let mut results = Vec::with_capacity(score_rows.len());
    for row in score_rows {
        if let Some(item) = item_map.remove(&row.id) {
            results.push(Scored::new(item).with_keyword_score(row.fts_score.unwrap_or_default()));
        }
    }
    Ok(results)
}

/// Contiguous phrase containment, case-insensitive, for title lookups
/// where BM25 term matching is too loose. Matches carry a flat score.
pub async fn search_chunks_by_phrase(
    db: &SurrealDbClient,
    take: usize,
    phrase: &str,
    filter: &ChunkQueryFilter,
) -> Vec<RetrievedChunk> {
    match try_search_by_phrase(db, take, phrase, filter).await {
        Ok(results) => results,
        Err(e) => {
            warn!(error = %e, "phrase search failed, continuing without text signal");
            Vec::new()
        }
    }
}

async fn try_search_by_phrase(
    db: &SurrealDbClient,
    take: usize,
    phrase: &str,
    filter: &ChunkQueryFilter,
) -> Result<Vec<RetrievedChunk>, AppError> {
    let sql = format!(
        "SELECT * FROM document_chunk \
         WHERE string::contains(string::lowercase(text), string::lowercase($phrase)) \
           AND document_id = $document_id{range} \
         ORDER BY chunk_id ASC \
         LIMIT $limit",
        range = filter.range_clause()
    );

    let mut response = db
        .query(sql)
        .bind(("phrase", phrase.to_owned()))
        .bind(("document_id", filter.document_id.clone()))
        .bind(("id_lo", filter.id_lo))
        .bind(("id_hi", filter.id_hi))
        .bind(("limit", take as i64))
        .await?;

    let items: Vec<DocumentChunk> = response.take(0)?;
    Ok(items
        .into_iter()
        .map(|item| Scored::new(item).with_keyword_score(1.0))
        .collect())
}

/// Every chunk of a document in reading order. This one propagates
/// failures: callers that need the full set cannot degrade.
pub async fn fetch_document_chunks(
    db: &SurrealDbClient,
    document_id: &str,
) -> Result<Vec<DocumentChunk>, AppError> {
    let mut response = db
        .query("SELECT * FROM document_chunk WHERE document_id = $document_id ORDER BY chunk_id ASC")
        .bind(("document_id", document_id.to_owned()))
        .await?;
    let chunks: Vec<DocumentChunk> = response.take(0)?;
    Ok(chunks)
}

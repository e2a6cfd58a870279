pub mod catalog;
pub mod fts;
pub mod hybrid;
pub mod locator;
pub mod range;
pub mod scoring;
pub mod selector;
pub mod vector;
pub mod window;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use common::{
    error::AppError,
    llm::CompletionModel,
    storage::{db::SurrealDbClient, types::document_chunk::DocumentChunk},
    utils::embedding::EmbeddingProvider,
};

use fts::ChunkQueryFilter;
use range::{chunk_id_range, filter_by_range};
use window::{expand, ExpandedResult};

/// How many candidates each adapter is asked for.
const ADAPTER_TAKE: usize = 10;

/// What the caller is actually asking for, read off the query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchIntent {
    /// The document's table of contents.
    Catalog,
    /// A section located by its heading; payload is the description.
    Title(String),
    /// Passage retrieval; payload is the search query.
    Content(String),
    /// No query at all: read the requested chunk/page range directly.
    RawRange,
}

impl SearchIntent {
    /// Literal-prefix classification. `catalog` and the two `-lookup:`
    /// markers are exact; any other non-empty text is a content query
    /// and an empty query means a raw range read.
    pub fn classify(query: &str) -> Self {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Self::RawRange;
        }
        if trimmed == "catalog" {
            return Self::Catalog;
        }
        if let Some(rest) = trimmed.strip_prefix("title-lookup:") {
            return Self::Title(rest.trim().to_owned());
        }
        if let Some(rest) = trimmed.strip_prefix("content-lookup:") {
            return Self::Content(rest.trim().to_owned());
        }
        Self::Content(trimmed.to_owned())
    }
}

/// One lookup against one entity's document, as it arrives off the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub entity_code: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub expanded_edition: bool,
    #[serde(default)]
    pub start_page: Option<i64>,
    #[serde(default)]
    pub end_page: Option<i64>,
    #[serde(default)]
    pub start_chunk_id: Option<i64>,
    #[serde(default)]
    pub end_chunk_id: Option<i64>,
    #[serde(default)]
    pub expand_before: u32,
    #[serde(default)]
    pub expand_after: u32,
}

/// Response shape for the single-span intents (catalog and title).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionResponse {
    pub success: bool,
    pub document_id: Option<String>,
    pub content: Option<String>,
    pub start_page: Option<i64>,
    pub end_page: Option<i64>,
    pub start_chunk_id: Option<i64>,
    pub end_chunk_id: Option<i64>,
    pub error: Option<String>,
}

impl SectionResponse {
    fn ok(document_id: String, span: &ExpandedResult) -> Self {
        Self {
            success: true,
            document_id: Some(document_id),
            content: Some(span.text.clone()),
            start_page: span.page_lo,
            end_page: span.page_hi,
            start_chunk_id: span.id_lo,
            end_chunk_id: span.id_hi,
            error: None,
        }
    }

    fn failure(message: String) -> Self {
        Self {
            success: false,
            document_id: None,
            content: None,
            start_page: None,
            end_page: None,
            start_chunk_id: None,
            end_chunk_id: None,
            error: Some(message),
        }
    }
}

/// One retrieved passage after expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentHit {
    pub content: String,
    pub start_page: Option<i64>,
    pub end_page: Option<i64>,
    pub start_chunk_id: Option<i64>,
    pub end_chunk_id: Option<i64>,
}

impl ContentHit {
    fn from_span(span: ExpandedResult) -> Self {
        Self {
            content: span.text,
            start_page: span.page_lo,
            end_page: span.page_hi,
            start_chunk_id: span.id_lo,
            end_chunk_id: span.id_hi,
        }
    }
}

/// Response shape for the list intents (content and raw range).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentResponse {
    pub success: bool,
    pub document_id: Option<String>,
    pub error: Option<String>,
    pub retrieved_count: usize,
    pub results: Vec<ContentHit>,
}

impl ContentResponse {
    fn ok(document_id: String, results: Vec<ContentHit>) -> Self {
        Self {
            success: true,
            document_id: Some(document_id),
            error: None,
            retrieved_count: results.len(),
            results,
        }
    }

    fn failure(message: String) -> Self {
        Self {
            success: false,
            document_id: None,
            error: Some(message),
            retrieved_count: 0,
            results: Vec::new(),
        }
    }
}

/// Either wire shape; which one a caller gets is fixed by the intent,
/// including on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchResponse {
    Content(ContentResponse),
    Section(SectionResponse),
}

impl SearchResponse {
    pub fn error_for(intent: &SearchIntent, message: String) -> Self {
        match intent {
            SearchIntent::Catalog | SearchIntent::Title(_) => {
                Self::Section(SectionResponse::failure(message))
            }
            SearchIntent::Content(_) | SearchIntent::RawRange => {
                Self::Content(ContentResponse::failure(message))
            }
        }
    }

    pub const fn success(&self) -> bool {
        match self {
            Self::Content(response) => response.success,
            Self::Section(response) => response.success,
        }
    }
}

/// Runs one search request end to end. Failures never escape as `Err`;
/// every outcome is folded into the wire shape the intent dictates, so
/// the conversation loop always has something well-formed to show the
/// model.
#[instrument(skip_all, fields(entity_code = %request.entity_code))]
pub async fn run_search(
    db: &SurrealDbClient,
    embedder: &EmbeddingProvider,
    model: &dyn CompletionModel,
    request: &SearchRequest,
) -> SearchResponse {
    let intent = SearchIntent::classify(&request.query);
    info!(?intent, "dispatching search request");

    if let Err(e) = validate(request) {
        warn!(error = %e, "rejecting invalid search request");
        return SearchResponse::error_for(&intent, e.to_string());
    }

    let result = match &intent {
        SearchIntent::Catalog => catalog_search(db, model, request).await,
        SearchIntent::Title(description) => title_search(db, model, request, description).await,
        SearchIntent::Content(query) => content_search(db, embedder, request, query).await,
        SearchIntent::RawRange => raw_range_search(db, request).await,
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "search request failed");
            SearchResponse::error_for(&intent, e.to_string())
        }
    }
}

fn validate(request: &SearchRequest) -> Result<(), AppError> {
    if request.entity_code.trim().is_empty() {
        return Err(AppError::Validation("entity_code must not be empty".to_owned()));
    }
    if let (Some(lo), Some(hi)) = (request.start_page, request.end_page) {
        if lo > hi {
            return Err(AppError::Validation(format!(
                "start_page {lo} is greater than end_page {hi}"
            )));
        }
    }
    if let (Some(lo), Some(hi)) = (request.start_chunk_id, request.end_chunk_id) {
        if lo > hi {
            return Err(AppError::Validation(format!(
                "start_chunk_id {lo} is greater than end_chunk_id {hi}"
            )));
        }
    }
    Ok(())
}

async fn resolve_document(
    db: &SurrealDbClient,
    request: &SearchRequest,
) -> Result<(String, Vec<DocumentChunk>), AppError> {
    let record = locator::resolve(db, &request.entity_code, request.expanded_edition).await?;
    let chunks = fts::fetch_document_chunks(db, &record.document_id).await?;
    Ok((record.document_id, chunks))
}

/// Narrows the full chunk set to the requested page/id range and turns
/// the survivors into a chunk-id bound for the adapters, so their take
/// budget is spent inside the range instead of across the whole
/// document. `None` means the range matched nothing.
fn scoped_filter(
    chunks: &[DocumentChunk],
    request: &SearchRequest,
    document_id: &str,
) -> Option<ChunkQueryFilter> {
    let scoped = filter_by_range(
        chunks.to_vec(),
        request.start_page,
        request.end_page,
        request.start_chunk_id,
        request.end_chunk_id,
    );
    let (id_lo, id_hi) = chunk_id_range(&scoped)?;
    Some(ChunkQueryFilter {
        document_id: document_id.to_owned(),
        id_lo: Some(id_lo),
        id_hi: Some(id_hi),
    })
}

/// Re-applies the request bounds to adapter output. The adapters only
/// constrain chunk ids; page bounds are enforced here, one candidate at
/// a time so the rank order survives.
fn refilter<'a>(
    candidates: impl IntoIterator<Item = &'a DocumentChunk>,
    request: &SearchRequest,
) -> Vec<DocumentChunk> {
    candidates
        .into_iter()
        .filter(|chunk| {
            !filter_by_range(
                vec![(*chunk).clone()],
                request.start_page,
                request.end_page,
                request.start_chunk_id,
                request.end_chunk_id,
            )
            .is_empty()
        })
        .cloned()
        .collect()
}

async fn catalog_search(
    db: &SurrealDbClient,
    model: &dyn CompletionModel,
    request: &SearchRequest,
) -> Result<SearchResponse, AppError> {
    let (document_id, chunks) = resolve_document(db, request).await?;
    let span = catalog::locate_toc_section(model, &chunks).await?;
    Ok(SearchResponse::Section(SectionResponse::ok(document_id, &span)))
}

async fn title_search(
    db: &SurrealDbClient,
    model: &dyn CompletionModel,
    request: &SearchRequest,
    description: &str,
) -> Result<SearchResponse, AppError> {
    let (document_id, chunks) = resolve_document(db, request).await?;
    let Some(filter) = scoped_filter(&chunks, request, &document_id) else {
        return Err(AppError::NotFound(
            "no content in the requested range".to_owned(),
        ));
    };
    let raw_candidates = fts::search_chunks_by_phrase(db, ADAPTER_TAKE, description, &filter).await;
    let candidates = refilter(raw_candidates.iter().map(|c| &c.item), request);

    let chosen = selector::select_title_chunk(model, description, &candidates, &chunks).await?;
    let Some(chosen) = chosen else {
        return Ok(SearchResponse::Section(SectionResponse::failure(format!(
            "no section heading matching '{description}' was found"
        ))));
    };

    let span = expand(vec![chosen], &chunks, request.expand_before, request.expand_after);
    Ok(SearchResponse::Section(SectionResponse::ok(
        document_id,
        &ExpandedResult::from_chunks(&span),
    )))
}

async fn content_search(
    db: &SurrealDbClient,
    embedder: &EmbeddingProvider,
    request: &SearchRequest,
    query: &str,
) -> Result<SearchResponse, AppError> {
    let (document_id, chunks) = resolve_document(db, request).await?;
    let Some(filter) = scoped_filter(&chunks, request, &document_id) else {
        return Err(AppError::NotFound(
            "no content in the requested range".to_owned(),
        ));
    };
    let ranked = hybrid::search_chunks_hybrid(db, embedder, ADAPTER_TAKE, query, &filter).await;
    let kept = refilter(ranked.iter().map(|c| &c.item), request);
    if kept.is_empty() {
        return Err(AppError::NotFound("no content matched the query".to_owned()));
    }

    let results: Vec<ContentHit> = kept
        .into_iter()
        .map(|chunk| {
            let span = expand(vec![chunk], &chunks, request.expand_before, request.expand_after);
            ContentHit::from_span(ExpandedResult::from_chunks(&span))
        })
        .collect();

    Ok(SearchResponse::Content(ContentResponse::ok(document_id, results)))
}

async fn raw_range_search(
    db: &SurrealDbClient,
    request: &SearchRequest,
) -> Result<SearchResponse, AppError> {
    let (document_id, chunks) = resolve_document(db, request).await?;
    let selected = filter_by_range(
        chunks,
        request.start_page,
        request.end_page,
        request.start_chunk_id,
        request.end_chunk_id,
    );
    if selected.is_empty() {
        return Err(AppError::NotFound(
            "no content in the requested range".to_owned(),
        ));
    }

    // A raw range read returns exactly the requested span; the
    // expansion margins only apply to search hits.
    let hit = ContentHit::from_span(ExpandedResult::from_chunks(&selected));
    Ok(SearchResponse::Content(ContentResponse::ok(document_id, vec![hit])))
}

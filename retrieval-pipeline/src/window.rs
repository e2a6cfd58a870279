use common::storage::types::document_chunk::DocumentChunk;

use crate::range::{chunk_id_range, page_range};

/// One contiguous reading span after expansion, with the merged text
/// and the page/chunk bounds it actually covers.
#[derive(Debug, Clone)]
pub struct ExpandedResult {
    pub text: String,
    pub page_lo: Option<i64>,
    pub page_hi: Option<i64>,
    pub id_lo: Option<i64>,
    pub id_hi: Option<i64>,
}

impl ExpandedResult {
    pub fn from_chunks(chunks: &[DocumentChunk]) -> Self {
        let pages = page_range(chunks);
        let ids = chunk_id_range(chunks);
        Self {
            text: merge_text(chunks),
            page_lo: pages.map(|(lo, _)| lo),
            page_hi: pages.map(|(_, hi)| hi),
            id_lo: ids.map(|(lo, _)| lo),
            id_hi: ids.map(|(_, hi)| hi),
        }
    }
}

/// Widens a target set to the closed chunk-id interval
/// `[min - before, max + after]`, drawing the extra chunks from the
/// same document only. With zero margins (or no targets) the targets
/// come back unchanged.
pub fn expand(
    targets: Vec<DocumentChunk>,
    all_chunks: &[DocumentChunk],
    before: u32,
    after: u32,
) -> Vec<DocumentChunk> {
    if targets.is_empty() || (before == 0 && after == 0) {
        return targets;
    }

    let document_id = &targets[0].document_id;
    let Some((min_id, max_id)) = chunk_id_range(&targets) else {
        return targets;
    };
    let lo = min_id - i64::from(before);
    let hi = max_id + i64::from(after);

    let mut expanded: Vec<DocumentChunk> = all_chunks
        .iter()
        .filter(|chunk| {
            chunk.document_id == *document_id && chunk.chunk_id >= lo && chunk.chunk_id <= hi
        })
        .cloned()
        .collect();
    expanded.sort_by_key(|chunk| chunk.chunk_id);
    expanded
}

/// Concatenates chunk texts in chunk-id order with no separator; the
/// chunks were split mid-sentence, so any inserted glue would corrupt
/// the text.
pub fn merge_text(chunks: &[DocumentChunk]) -> String {
    let mut ordered: Vec<&DocumentChunk> = chunks.iter().collect();
    ordered.sort_by_key(|chunk| chunk.chunk_id);
    ordered.iter().map(|chunk| chunk.text.as_str()).collect()
}

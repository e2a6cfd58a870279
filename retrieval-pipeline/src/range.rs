use common::storage::types::document_chunk::DocumentChunk;

/// Parses a "-"-separated page label into the pages the chunk touches.
/// Tokens that do not parse as integers are skipped; an empty result
/// means the label carries no usable page information.
pub fn pages_of(label: &str) -> Vec<i64> {
    label
        .split('-')
        .filter_map(|token| token.trim().parse::<i64>().ok())
        .collect()
}

/// Page interval covered by a chunk set, None when no chunk has a
/// parsable label.
pub fn page_range(chunks: &[DocumentChunk]) -> Option<(i64, i64)> {
    let mut lo: Option<i64> = None;
    let mut hi: Option<i64> = None;
    for chunk in chunks {
        for page in pages_of(&chunk.page_label) {
            lo = Some(lo.map_or(page, |v| v.min(page)));
            hi = Some(hi.map_or(page, |v| v.max(page)));
        }
    }
    Some((lo?, hi?))
}

/// Chunk-id interval covered by a chunk set, None on empty input.
pub fn chunk_id_range(chunks: &[DocumentChunk]) -> Option<(i64, i64)> {
    let lo = chunks.iter().map(|c| c.chunk_id).min()?;
    let hi = chunks.iter().map(|c| c.chunk_id).max()?;
    Some((lo, hi))
}

fn within(value: i64, lo: Option<i64>, hi: Option<i64>) -> bool {
    lo.is_none_or(|bound| value >= bound) && hi.is_none_or(|bound| value <= bound)
}

/// Narrows a chunk set by chunk-id bounds, then by page bounds, in that
/// order. The page pass keeps a chunk when its `[min, max]` page
/// interval intersects the bound, and keeps chunks whose label has no
/// parsable page at all rather than silently dropping content.
pub fn filter_by_range(
    chunks: Vec<DocumentChunk>,
    page_lo: Option<i64>,
    page_hi: Option<i64>,
    id_lo: Option<i64>,
    id_hi: Option<i64>,
) -> Vec<DocumentChunk> {
    let mut kept = chunks;

    if id_lo.is_some() || id_hi.is_some() {
        kept.retain(|chunk| within(chunk.chunk_id, id_lo, id_hi));
    }

    if page_lo.is_some() || page_hi.is_some() {
        kept.retain(|chunk| {
            let pages = pages_of(&chunk.page_label);
            let (Some(min), Some(max)) = (pages.iter().min(), pages.iter().max()) else {
                return true;
            };
            page_lo.is_none_or(|bound| *max >= bound)
                && page_hi.is_none_or(|bound| *min <= bound)
        });
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(chunk_id: i64, page_label: &str) -> DocumentChunk {
        DocumentChunk::new(
            chunk_id,
            "doc-1".into(),
            page_label.into(),
            format!("chunk {chunk_id}"),
        )
    }

    #[test]
    fn pages_of_skips_unparsable_tokens() {
        assert_eq!(pages_of("3-x-5"), vec![3, 5]);
        assert_eq!(pages_of("cover"), Vec::<i64>::new());
        assert_eq!(pages_of(""), Vec::<i64>::new());
    }

    #[test]
    fn ranges_are_none_on_empty_or_unlabelled_input() {
        assert_eq!(page_range(&[]), None);
        assert_eq!(chunk_id_range(&[]), None);
        assert_eq!(page_range(&[chunk(1, "cover")]), None);
    }

    #[test]
    fn filter_keeps_only_chunks_inside_both_bounds() {
        let chunks = vec![chunk(1, "1"), chunk(2, "2"), chunk(3, "3"), chunk(4, "9")];
        let kept = filter_by_range(chunks, Some(2), Some(3), Some(2), None);
        let ids: Vec<i64> = kept.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn unparsable_page_labels_survive_the_page_pass() {
        let chunks = vec![chunk(1, "cover"), chunk(2, "40")];
        let kept = filter_by_range(chunks, Some(1), Some(5), None, None);
        let ids: Vec<i64> = kept.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn multi_page_label_matches_when_its_interval_intersects() {
        let chunks = vec![chunk(1, "4-5-6"), chunk(2, "7-8")];
        let kept = filter_by_range(chunks, Some(6), Some(6), None, None);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].chunk_id, 1);
    }

    #[test]
    fn label_spanning_the_bound_is_kept() {
        // A "4-7" label lists no page inside [5, 6], but the chunk
        // covers that stretch of the document and must stay.
        let chunks = vec![chunk(1, "4-7"), chunk(2, "9-10")];
        let kept = filter_by_range(chunks, Some(5), Some(6), None, None);
        let ids: Vec<i64> = kept.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn id_pass_runs_before_page_pass() {
        // The unlabelled chunk survives the page pass only because the id
        // pass did not already remove it; with the id bound it is gone
        // before pages are ever consulted.
        let chunks = vec![chunk(10, "cover"), chunk(20, "5")];
        let kept = filter_by_range(chunks, Some(5), Some(5), Some(15), None);
        let ids: Vec<i64> = kept.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec![20]);
    }
}

use serde_json::Value;
use tracing::{debug, instrument};

use common::{
    error::AppError,
    llm::{ChatMessage, CompletionModel},
    storage::types::document_chunk::DocumentChunk,
};

use crate::window::{expand, ExpandedResult};

const TOC_KEYWORDS: [&str; 2] = ["table", "contents"];
const CLASSIFIER_WINDOW_FOLLOWING: usize = 2;
const TOC_EXPAND_BEFORE: u32 = 0;
const TOC_EXPAND_AFTER: u32 = 7;

const TOC_SYSTEM_PROMPT: &str = "You classify excerpts from disclosure documents. \
Decide whether the excerpt is the document's table of contents: a listing of \
section titles with page numbers. Reply with strict JSON of the form \
{\"is_toc\": \"yes\"} or {\"is_toc\": \"no\"} and nothing else.";

/// Finds the table-of-contents section of a document and returns it as
/// one expanded span.
///
/// Candidates are chunks mentioning both TOC keywords, tried in reading
/// order; the classifier sees each candidate together with the two
/// chunks that follow it, since a table of contents usually spills past
/// the chunk its heading lands in. The first positive wins and is
/// expanded forward to catch the full listing.
#[instrument(skip_all, fields(document_chunks = chunks.len()))]
pub async fn locate_toc_section(
    model: &dyn CompletionModel,
    chunks: &[DocumentChunk],
) -> Result<ExpandedResult, AppError> {
    let mut ordered: Vec<&DocumentChunk> = chunks.iter().collect();
    ordered.sort_by_key(|chunk| chunk.chunk_id);

    for (position, candidate) in ordered.iter().enumerate() {
        let lowered = candidate.text.to_lowercase();
        if !TOC_KEYWORDS.iter().all(|kw| lowered.contains(kw)) {
            continue;
        }

        let window: String = ordered
            .iter()
            .skip(position)
            .take(1 + CLASSIFIER_WINDOW_FOLLOWING)
            .map(|chunk| chunk.text.as_str())
            .collect();

        let messages = [
            ChatMessage::system(TOC_SYSTEM_PROMPT),
            ChatMessage::user(format!("Excerpt:\n{window}")),
        ];
        let reply = model.complete(&messages).await?;
        let is_toc = parse_toc_verdict(&reply.content);
        debug!(chunk_id = candidate.chunk_id, is_toc, "classified toc candidate");

        if is_toc {
            let targets = vec![(*candidate).clone()];
            let span = expand(targets, chunks, TOC_EXPAND_BEFORE, TOC_EXPAND_AFTER);
            return Ok(ExpandedResult::from_chunks(&span));
        }
    }

    Err(AppError::NotFound("no catalog chunk identified".to_owned()))
}

/// Reads the classifier's verdict out of whatever it actually sent
/// back. Accepts fenced JSON, a JSON object embedded in prose, or a
/// bare yes/no token; anything unreadable counts as a no.
pub fn parse_toc_verdict(reply: &str) -> bool {
    let cleaned = strip_code_fences(reply);

    if let Some(verdict) = json_verdict(&cleaned) {
        return verdict;
    }
    if let Some(object) = extract_json_object(&cleaned) {
        if let Some(verdict) = json_verdict(object) {
            return verdict;
        }
    }

    cleaned.trim().eq_ignore_ascii_case("yes")
}

fn json_verdict(text: &str) -> Option<bool> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    match value.get("is_toc")? {
        Value::Bool(flag) => Some(*flag),
        Value::String(word) => Some(word.trim().eq_ignore_ascii_case("yes")),
        _ => None,
    }
}

pub(crate) fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_owned();
    };
    let body = rest.strip_prefix("json").unwrap_or(rest);
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim().to_owned()
}

pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}


#[cfg(test)]
mod tests {
    use super::test_support::ScriptedModel;
    use super::*;

    fn chunk(chunk_id: i64, text: &str) -> DocumentChunk {
        DocumentChunk::new(chunk_id, "doc-1".into(), chunk_id.to_string(), text.into())
    }

    fn doc_with_toc_at(toc_id: i64) -> Vec<DocumentChunk> {
        (1..=20)
            .map(|i| {
                if i == toc_id {
                    chunk(i, "Table of Contents 1. Overview ... ")
                } else {
                    chunk(i, &format!("body {i} "))
                }
            })
            .collect()
    }

    #[test]
    fn verdict_parses_fenced_and_bare_shapes() {
        assert!(parse_toc_verdict("{\"is_toc\": \"yes\"}"));
        assert!(parse_toc_verdict("```json\n{\"is_toc\": \"yes\"}\n```"));
        assert!(parse_toc_verdict("Sure: {\"is_toc\": true} as requested"));
        assert!(parse_toc_verdict("YES"));
        assert!(!parse_toc_verdict("{\"is_toc\": \"no\"}"));
        assert!(!parse_toc_verdict("no"));
    }

    #[test]
    fn verdict_fails_closed_on_garbage() {
        assert!(!parse_toc_verdict(""));
        assert!(!parse_toc_verdict("I cannot decide"));
        assert!(!parse_toc_verdict("{\"is_toc\": 3}"));
        assert!(!parse_toc_verdict("{broken json"));
    }

    #[tokio::test]
    async fn first_positive_candidate_wins_and_expands_forward() {
        let mut chunks = doc_with_toc_at(4);
        // An earlier mention of both keywords that the classifier rejects.
        chunks[1] = chunk(2, "see the table of contents for details ");
        let model = ScriptedModel::new(["{\"is_toc\": \"no\"}", "{\"is_toc\": \"yes\"}"]);

        let result = locate_toc_section(&model, &chunks)
            .await
            .expect("expected a toc section");

        assert_eq!(result.id_lo, Some(4));
        assert_eq!(result.id_hi, Some(11));
    }

    #[tokio::test]
    async fn no_candidate_yields_not_found_without_model_calls() {
        let chunks: Vec<DocumentChunk> = (1..=5).map(|i| chunk(i, "plain body")).collect();
        let model = ScriptedModel::silent();

        let err = locate_toc_section(&model, &chunks)
            .await
            .expect_err("expected not-found");
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn all_rejected_yields_not_found() {
        let chunks = doc_with_toc_at(4);
        let model = ScriptedModel::new(["totally unparsable reply"]);

        let err = locate_toc_section(&model, &chunks)
            .await
            .expect_err("expected not-found");
        assert!(matches!(err, AppError::NotFound(_)));
    }
}

use serde::Deserialize;
use tracing::{debug, instrument, warn};

use common::{
    error::AppError,
    llm::{ChatMessage, CompletionModel},
    storage::types::document_chunk::DocumentChunk,
};

use crate::catalog::{extract_json_object, strip_code_fences};

const OPTION_PREVIEW_CAP: usize = 1000;
const NO_MATCH_SENTINEL: &str = "no matching title block";

const SELECTOR_SYSTEM_PROMPT: &str = "You pick the section heading a reader is asking \
for. Each option shows a chunk from a disclosure document together with its \
surrounding text. Choose the option whose [target] text is the start of the \
requested section. Reply with strict JSON: {\"selection\": \"option N\", \
\"rationale\": \"...\", \"confidence\": \"high|medium|low\"}. If none of the \
options starts the requested section, put \"no matching title block\" in \
\"selection\".";

#[derive(Debug, Deserialize)]
struct SelectionReply {
    selection: String,
    #[serde(default)]
    #[allow(dead_code)]
    rationale: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    confidence: Option<serde_json::Value>,
}

/// Picks the candidate chunk that starts the described section.
///
/// A single candidate is returned as-is without consulting the model.
/// Otherwise the model sees each candidate with one chunk of context on
/// either side and answers with an ordinal. The two failure modes stay
/// distinct: an unreadable or out-of-range answer falls back to the
/// first candidate in document order, while the explicit no-match
/// sentinel returns `None`.
#[instrument(skip_all, fields(candidates = candidates.len()))]
pub async fn select_title_chunk(
    model: &dyn CompletionModel,
    description: &str,
    candidates: &[DocumentChunk],
    all_chunks: &[DocumentChunk],
) -> Result<Option<DocumentChunk>, AppError> {
    match candidates {
        [] => return Ok(None),
        [only] => return Ok(Some(only.clone())),
        _ => {}
    }

    let options = render_options(candidates, all_chunks);
    let messages = [
        ChatMessage::system(SELECTOR_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Requested section: {description}\n\n{options}"
        )),
    ];
    let reply = model.complete(&messages).await?;

    match parse_selection(&reply.content, candidates.len()) {
        Selection::Chosen(index) => {
            debug!(index, "selector chose a candidate");
            Ok(Some(candidates[index].clone()))
        }
        Selection::NoMatch => {
            debug!("selector reported no matching title block");
            Ok(None)
        }
        Selection::Unreadable => {
            warn!(reply = %reply.content, "unreadable selector reply, keeping first candidate");
            Ok(Some(candidates[0].clone()))
        }
    }
}

enum Selection {
    Chosen(usize),
    NoMatch,
    Unreadable,
}

fn parse_selection(raw: &str, candidate_count: usize) -> Selection {
    let cleaned = strip_code_fences(raw);
    let payload = extract_json_object(&cleaned).unwrap_or(&cleaned);
    let Ok(reply) = serde_json::from_str::<SelectionReply>(payload) else {
        return Selection::Unreadable;
    };

    let selection = reply.selection.trim().to_lowercase();
    if selection.contains(NO_MATCH_SENTINEL) {
        return Selection::NoMatch;
    }

    let Some(ordinal) = first_integer(&selection) else {
        return Selection::Unreadable;
    };
    if ordinal < 1 || ordinal > candidate_count {
        return Selection::Unreadable;
    }
    Selection::Chosen(ordinal - 1)
}

fn first_integer(text: &str) -> Option<usize> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

fn render_options(candidates: &[DocumentChunk], all_chunks: &[DocumentChunk]) -> String {
    let mut rendered = String::new();
    for (index, candidate) in candidates.iter().enumerate() {
        let neighbour = |offset: i64| {
            all_chunks
                .iter()
                .find(|c| {
                    c.document_id == candidate.document_id
                        && c.chunk_id == candidate.chunk_id + offset
                })
                .map_or("", |c| c.text.as_str())
        };

        let option = format!(
            "Option {number}:\n[before] {before}\n[target] {target}\n[after] {after}\n",
            number = index + 1,
            before = neighbour(-1),
            target = candidate.text,
            after = neighbour(1),
        );
        rendered.push_str(&preview(&option, OPTION_PREVIEW_CAP));
        rendered.push('\n');
    }
    rendered
}

fn preview(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        return text.to_owned();
    }
    text.chars().take(cap).collect()
}

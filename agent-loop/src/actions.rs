use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use common::llm::ToolSpec;
use retrieval_pipeline::SearchRequest;

pub const SEARCH_TOOL_NAME: &str = "disclosure_search";

/// The one action the model can take, mirroring the search request
/// wire names field for field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchAction {
    #[serde(default)]
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

impl SearchAction {
    /// Lenient parse for native tool arguments: unreadable JSON becomes
    /// the empty action, which the validation layer then rejects with a
    /// message the model can act on. The loop never stops over a bad
    /// argument string.
    pub fn parse_lenient(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }

    /// Strict parse for the text protocol: the JSON must be an object
    /// carrying non-null `entity_code` and `query` keys, otherwise the
    /// whole reply counts as malformed.
    pub fn parse_strict(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        if !value.get("entity_code").is_some_and(Value::is_string) {
            return None;
        }
        if !value.get("query").is_some_and(Value::is_string) {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    pub fn into_request(self) -> SearchRequest {
        SearchRequest {
            entity_code: self.entity_code,
            query: self.query,
            expanded_edition: self.expanded_edition,
            start_page: self.start_page,
            end_page: self.end_page,
            start_chunk_id: self.start_chunk_id,
            end_chunk_id: self.end_chunk_id,
            expand_before: self.expand_before,
            expand_after: self.expand_after,
        }
    }
}

/// Tool schema offered to models with a native tool channel.
pub fn search_tool_spec() -> ToolSpec {
    ToolSpec {
        name: SEARCH_TOOL_NAME.to_owned(),
        description: "Look things up in an entity's disclosure document. Set query to \
            'catalog' for the table of contents, 'title-lookup: <title>' to locate a \
            section, 'content-lookup: <text>' to search passages, or leave it empty \
            and give chunk/page bounds to read a span directly."
            .to_owned(),
        parameters: json!({
            "type": "object",
            "properties": {
                "entity_code": {
                    "type": "string",
                    "description": "Entity code of the issuer, e.g. '180101.SZ'."
                },
                "query": {
                    "type": "string",
                    "description": "'catalog', 'title-lookup: ...', 'content-lookup: ...', free text, or empty for a raw range read."
                },
                "expanded_edition": {
                    "type": "boolean",
                    "description": "Read the expanded edition instead of the initial one."
                },
                "start_page": { "type": "integer" },
                "end_page": { "type": "integer" },
                "start_chunk_id": { "type": "integer" },
                "end_chunk_id": { "type": "integer" },
                "expand_before": {
                    "type": "integer",
                    "description": "Extra chunks to include before each hit."
                },
                "expand_after": {
                    "type": "integer",
                    "description": "Extra chunks to include after each hit."
                }
            },
            "required": ["entity_code", "query"]
        }),
    }
}

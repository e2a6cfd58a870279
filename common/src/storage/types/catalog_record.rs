use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{deserialize_datetime, deserialize_flexible_id, serialize_datetime, StoredObject};

/// Catalog entry describing one disclosure document for an entity.
/// `fully_indexed` marks documents whose chunks have landed in both the
/// text and vector tables; lookups that return content only consider
/// fully indexed documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogRecord {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    pub entity_code: String,
    pub document_id: String,
    pub title: String,
    pub doc_type: String,
    pub fully_indexed: bool,
    #[serde(
        serialize_with = "serialize_datetime",
        deserialize_with = "deserialize_datetime"
    )]
    pub published_at: DateTime<Utc>,
}

impl StoredObject for CatalogRecord {
    fn table_name() -> &'static str {
        "catalog_record"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

impl CatalogRecord {
    pub fn new(
        entity_code: String,
        document_id: String,
        title: String,
        doc_type: String,
        fully_indexed: bool,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            entity_code,
            document_id,
            title,
            doc_type,
            fully_indexed,
            published_at,
        }
    }
}

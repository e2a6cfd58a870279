use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient};

use super::{chunk_embedding::ChunkEmbedding, deserialize_flexible_id, StoredObject};

/// Smallest addressable unit of a disclosure document. Chunks are
/// produced by an external ingestion pipeline and are read-only here.
///
/// `chunk_id` is strictly increasing within a document and defines
/// reading order; adjacency is `chunk_id` plus/minus one. `page_label`
/// is a "-"-separated list of approximate page numbers and carries no
/// monotonicity guarantee.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    pub chunk_id: i64,
    pub document_id: String,
    pub page_label: String,
    pub text: String,
}

impl StoredObject for DocumentChunk {
    fn table_name() -> &'static str {
        "document_chunk"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

impl DocumentChunk {
    pub fn new(chunk_id: i64, document_id: String, page_label: String, text: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chunk_id,
            document_id,
            page_label,
            text,
        }
    }

    /// Stores the chunk together with its embedding row. Fixture helper;
    /// production data arrives through the ingestion pipeline.
    pub async fn store_with_embedding(
        chunk: DocumentChunk,
        embedding: Vec<f32>,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let embedding_row = ChunkEmbedding::new(
            chunk.id.clone(),
            chunk.chunk_id,
            chunk.document_id.clone(),
            embedding,
        );
        db.store_item(chunk).await?;
        db.store_item(embedding_row).await?;
        Ok(())
    }
}

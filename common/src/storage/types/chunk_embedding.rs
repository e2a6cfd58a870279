use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{deserialize_flexible_id, StoredObject};

/// Vector row for a single chunk, kept in its own table so the HNSW
/// index covers exactly one column. `chunk` holds the global id of the
/// `document_chunk` row; `chunk_id` and `document_id` are denormalized
/// so KNN hits can be range-filtered without a join.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkEmbedding {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    pub chunk: String,
    pub chunk_id: i64,
    pub document_id: String,
    pub embedding: Vec<f32>,
}

impl StoredObject for ChunkEmbedding {
    fn table_name() -> &'static str {
        "document_chunk_embedding"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

impl ChunkEmbedding {
    pub fn new(chunk: String, chunk_id: i64, document_id: String, embedding: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chunk,
            chunk_id,
            document_id,
            embedding,
        }
    }
}

use std::ops::Deref;

use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Surreal,
};
use tracing::debug;

use super::types::StoredObject;

const FTS_ANALYZER_NAME: &str = "chunk_text_analyzer";

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

impl SurrealDbClient {
    /// Connect to a running SurrealDB instance and select namespace/database.
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        db.signin(Root { username, password }).await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    /// In-memory instance, used by tests and offline runs.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    /// Defines the analyzer and the search/vector indexes the retrieval
    /// adapters depend on. Idempotent; safe to call on every startup.
    pub async fn ensure_indexes(&self, embedding_dimension: usize) -> Result<(), Error> {
        debug!(embedding_dimension, "defining analyzer and indexes");
        self.client
            .query(format!(
                "DEFINE ANALYZER IF NOT EXISTS {FTS_ANALYZER_NAME}
                    TOKENIZERS class
                    FILTERS lowercase, ascii, snowball(english);"
            ))
            .await?;

        self.client
            .query(format!(
                "DEFINE INDEX IF NOT EXISTS document_chunk_text_fts_idx \
                 ON TABLE document_chunk FIELDS text \
                 SEARCH ANALYZER {FTS_ANALYZER_NAME} BM25;"
            ))
            .await?;

        self.client
            .query(format!(
                "DEFINE INDEX OVERWRITE document_chunk_embedding_idx \
                 ON TABLE document_chunk_embedding FIELDS embedding \
                 HNSW DIMENSION {embedding_dimension};"
            ))
            .await?;

        self.client
            .query("DEFINE INDEX IF NOT EXISTS catalog_record_entity_idx ON TABLE catalog_record FIELDS entity_code;")
            .await?;

        Ok(())
    }

    /// Rebuilds the search and vector indexes. The in-memory engine does
    /// not always fold fresh writes into an index, so tests call this
    /// after seeding fixtures.
    pub async fn rebuild_indexes(&self) -> Result<(), Error> {
        self.client
            .query("REBUILD INDEX IF EXISTS document_chunk_text_fts_idx ON document_chunk")
            .await?;
        self.client
            .query("REBUILD INDEX IF EXISTS document_chunk_embedding_idx ON document_chunk_embedding")
            .await?;
        Ok(())
    }

    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client.select((T::table_name(), id)).await
    }

    pub async fn get_all_stored_items<T>(&self) -> Result<Vec<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client.select(T::table_name()).await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use surrealdb::RecordId;

use crate::db::connection::AutoembedDb;
use crate::db::schema::ensure_collection;
use crate::models::Embedding;
use crate::utils::sanitize::validate_collection_name;
use crate::AutoembedError;

/// Neighbor returned by a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId {
    pub id: String,
    pub score: f32,
}

/// Storage backend for one named collection of embeddings.
///
/// Upserts are idempotent by id. Pages are ordered by id so that
/// offset/limit scans are stable while the collection is not written to.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Stored embeddings for `ids`; missing ids are skipped.
    async fn get(&self, ids: &[String]) -> Result<Vec<Embedding>, AutoembedError>;

    async fn count(&self) -> Result<usize, AutoembedError>;

    async fn get_page(&self, limit: usize, offset: usize) -> Result<Vec<Embedding>, AutoembedError>;

    /// Up to `n` nearest ids by cosine similarity, best first.
    async fn query(&self, vector: &[f32], n: usize) -> Result<Vec<ScoredId>, AutoembedError>;

    async fn upsert(&self, embeddings: &[Embedding]) -> Result<(), AutoembedError>;
}

/// Row layout of a collection table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    embedding_id: String,
    embedding: Vec<f32>,
    metadata_json: String,
}

impl StoredRecord {
    fn from_embedding(embedding: &Embedding) -> Result<Self, AutoembedError> {
        Ok(Self {
            embedding_id: embedding.id.clone(),
            embedding: embedding.vector.clone(),
            metadata_json: serde_json::to_string(&embedding.metadata)?,
        })
    }

    fn into_embedding(self) -> Result<Embedding, AutoembedError> {
        let metadata: Map<String, Value> = if self.metadata_json.is_empty() {
            Map::new()
        } else {
            serde_json::from_str(&self.metadata_json)?
        };
        Ok(Embedding::new(self.embedding_id, self.embedding).with_metadata(metadata))
    }
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: usize,
}

#[derive(Debug, Deserialize)]
struct ScoreRow {
    embedding_id: String,
    score: f64,
}

/// SurrealDB-backed collection: one table per collection, record id = embedding id.
pub struct SurrealVectorStore {
    db: Arc<AutoembedDb>,
    collection: String,
}

impl SurrealVectorStore {
    pub fn new(db: Arc<AutoembedDb>, collection: &str) -> Result<Self, AutoembedError> {
        Ok(Self {
            db,
            collection: validate_collection_name(collection)?.to_string(),
        })
    }

    /// Define the collection table if needed and return a store bound to it.
    pub async fn open(db: Arc<AutoembedDb>, collection: &str) -> Result<Self, AutoembedError> {
        ensure_collection(&db, collection).await?;
        Self::new(db, collection)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

#[async_trait]
impl VectorStore for SurrealVectorStore {
    async fn get(&self, ids: &[String]) -> Result<Vec<Embedding>, AutoembedError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let things: Vec<RecordId> = ids
            .iter()
            .map(|id| RecordId::from_table_key(self.collection.clone(), id.clone()))
            .collect();

        let mut response = self
            .db
            .query("SELECT embedding_id, embedding, metadata_json FROM $things")
            .bind(("things", things))
            .await?;
        let rows: Vec<StoredRecord> = response.take(0)?;
        rows.into_iter().map(StoredRecord::into_embedding).collect()
    }

    async fn count(&self) -> Result<usize, AutoembedError> {
        let mut response = self
            .db
            .query("SELECT count() AS count FROM type::table($tb) GROUP ALL")
            .bind(("tb", self.collection.clone()))
            .await?;
        let rows: Vec<CountRow> = response.take(0)?;
        Ok(rows.first().map(|r| r.count).unwrap_or(0))
    }

    async fn get_page(&self, limit: usize, offset: usize) -> Result<Vec<Embedding>, AutoembedError> {
        let mut response = self
            .db
            .query(
                "SELECT embedding_id, embedding, metadata_json FROM type::table($tb) \
                 ORDER BY embedding_id LIMIT $limit START $offset",
            )
            .bind(("tb", self.collection.clone()))
            .bind(("limit", limit as i64))
            .bind(("offset", offset as i64))
            .await?;
        let rows: Vec<StoredRecord> = response.take(0)?;
        rows.into_iter().map(StoredRecord::into_embedding).collect()
    }

    async fn query(&self, vector: &[f32], n: usize) -> Result<Vec<ScoredId>, AutoembedError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        // Brute-force cosine, as HNSW indexes are not reliable in embedded RocksDB mode
        let mut response = self
            .db
            .query(
                "SELECT embedding_id, vector::similarity::cosine(embedding, $query_vector) AS score \
                 FROM type::table($tb) ORDER BY score DESC LIMIT $n",
            )
            .bind(("tb", self.collection.clone()))
            .bind(("query_vector", vector.to_vec()))
            .bind(("n", i64::try_from(n).unwrap_or(i64::MAX)))
            .await?;
        let rows: Vec<ScoreRow> = response.take(0)?;
        Ok(rows
            .into_iter()
            .map(|r| ScoredId {
                id: r.embedding_id,
                score: r.score as f32,
            })
            .collect())
    }

    async fn upsert(&self, embeddings: &[Embedding]) -> Result<(), AutoembedError> {
        if embeddings.is_empty() {
            return Ok(());
        }
        let records = embeddings
            .iter()
            .map(StoredRecord::from_embedding)
            .collect::<Result<Vec<_>, _>>()?;

        self.db
            .query("FOR $r IN $records { UPSERT type::thing($tb, $r.embedding_id) CONTENT $r; }")
            .bind(("tb", self.collection.clone()))
            .bind(("records", records))
            .await?
            .check()?;
        Ok(())
    }
}

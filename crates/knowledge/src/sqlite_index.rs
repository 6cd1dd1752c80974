//! SQLite-backed vector collection.
//!
//! Embeddings are stored as little-endian `f32` blobs and scored with a
//! linear scan, which is plenty for a few thousand passages.

use crate::document::{Document, ScoredDocument};
use crate::embeddings::EmbeddingProvider;
use crate::vector_index::{cosine_distance, IndexStats, VectorIndex};
use chrono::{DateTime, Utc};
use ragchart_core::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Persistent collection in a SQLite file.
pub struct SqliteIndex {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    collection: String,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SqliteIndex {
    /// Open (creating if needed) a collection in the given database file.
    ///
    /// Fails when the collection was built with a different embedding model,
    /// since distances between the two would be meaningless.
    pub fn open(
        db_path: &Path,
        collection: &str,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Knowledge(format!("Failed to create index directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Knowledge(format!("Failed to open SQLite index: {}", e)))?;

        let index = Self::with_connection(conn, collection, embedder)?;
        tracing::debug!("Opened SQLite index at {:?}", db_path);

        Ok(Self {
            path: Some(db_path.to_path_buf()),
            ..index
        })
    }

    /// Collection in a private in-memory database.
    pub fn open_in_memory(collection: &str, embedder: Arc<dyn EmbeddingProvider>) -> AppResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, collection, embedder)
    }

    fn with_connection(
        conn: Connection,
        collection: &str,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                embedding_provider TEXT NOT NULL,
                embedding_model TEXT NOT NULL,
                dimensions INTEGER NOT NULL,
                last_loaded_at TEXT
            );

            CREATE TABLE IF NOT EXISTS documents (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL,
                embedding BLOB NOT NULL,
                UNIQUE (collection, id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
            "#,
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to create tables: {}", e)))?;

        let existing: Option<(String, i64)> = conn
            .query_row(
                "SELECT embedding_model, dimensions FROM collections WHERE name = ?1",
                params![collection],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match existing {
            Some((model, dims))
                if model != embedder.model_name() || dims as usize != embedder.dimensions() =>
            {
                return Err(AppError::Knowledge(format!(
                    "Collection '{}' was built with {} ({} dims) but {} ({} dims) is configured. \
                     Run 'ragchart knowledge load --reindex' to rebuild it.",
                    collection,
                    model,
                    dims,
                    embedder.model_name(),
                    embedder.dimensions()
                )));
            }
            Some(_) => {}
            None => {
                conn.execute(
                    "INSERT INTO collections (name, embedding_provider, embedding_model, dimensions)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        collection,
                        embedder.provider_name(),
                        embedder.model_name(),
                        embedder.dimensions() as i64
                    ],
                )?;
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
            collection: collection.to_string(),
            embedder,
        })
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Knowledge("SQLite index lock poisoned".to_string()))
    }

    fn last_loaded_at(&self, conn: &Connection) -> AppResult<Option<DateTime<Utc>>> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT last_loaded_at FROM collections WHERE name = ?1",
                params![self.collection],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten();

        Ok(raw
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }
}

#[async_trait::async_trait]
impl VectorIndex for SqliteIndex {
    async fn upsert(&self, documents: &[Document]) -> AppResult<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for (document, embedding) in documents.iter().zip(&embeddings) {
            let metadata = serde_json::to_string(&document.metadata)?;
            tx.execute(
                "INSERT INTO documents (collection, id, content, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (collection, id) DO UPDATE SET
                     content = excluded.content,
                     metadata = excluded.metadata,
                     embedding = excluded.embedding",
                params![
                    self.collection,
                    document.id(),
                    document.content,
                    metadata,
                    embedding_to_bytes(embedding)
                ],
            )?;
        }
        tx.execute(
            "UPDATE collections SET last_loaded_at = ?1 WHERE name = ?2",
            params![Utc::now().to_rfc3339(), self.collection],
        )?;
        tx.commit()?;

        Ok(documents.len())
    }

    async fn search(&self, query_text: &str, k: usize) -> AppResult<Vec<ScoredDocument>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = self.embedder.embed(query_text).await?;

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT content, metadata, embedding FROM documents
             WHERE collection = ?1 ORDER BY seq",
        )?;

        let rows = stmt.query_map(params![self.collection], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (content, metadata, blob) = row?;
            let embedding = bytes_to_embedding(&blob)?;
            results.push(ScoredDocument {
                document: Document {
                    content,
                    metadata: serde_json::from_str(&metadata)?,
                },
                distance: cosine_distance(&query, &embedding),
            });
        }

        // Stable sort keeps insertion order among equal distances.
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results.truncate(k);

        tracing::debug!(
            "Retrieved {} documents (requested top-{})",
            results.len(),
            k
        );

        Ok(results)
    }

    async fn count(&self) -> AppResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            params![self.collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    async fn reset(&self) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM documents WHERE collection = ?1",
            params![self.collection],
        )?;
        conn.execute(
            "UPDATE collections SET last_loaded_at = NULL WHERE name = ?1",
            params![self.collection],
        )?;

        tracing::info!("Reset collection '{}'", self.collection);
        Ok(())
    }

    async fn stats(&self) -> AppResult<IndexStats> {
        let documents = self.count().await?;
        let conn = self.lock()?;

        Ok(IndexStats {
            backend: "sqlite".to_string(),
            collection: self.collection.clone(),
            documents,
            embedding_model: self.embedder.model_name().to_string(),
            dimensions: self.embedder.dimensions(),
            last_loaded_at: self.last_loaded_at(&conn)?,
            size_bytes: self
                .path
                .as_ref()
                .and_then(|p| std::fs::metadata(p).ok())
                .map(|m| m.len()),
        })
    }
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Knowledge(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SOURCE_KEY;
    use crate::embeddings::providers::TrigramProvider;
    use tempfile::TempDir;

    fn embedder() -> Arc<dyn EmbeddingProvider> {
        Arc::new(TrigramProvider::new(128))
    }

    fn doc(content: &str, source: &str) -> Document {
        Document::from_text(content).with_meta(SOURCE_KEY, source)
    }

    #[tokio::test]
    async fn test_upsert_and_search_ranks_closest_first() {
        let index = SqliteIndex::open_in_memory("chatbot", embedder()).unwrap();
        index
            .upsert(&[
                doc("Pasta recipes with tomato sauce", "cooking.pdf"),
                doc("Quarterly revenue grew in the northern region", "report.pdf"),
            ])
            .await
            .unwrap();

        let results = index.search("northern region revenue", 5).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.source().as_deref(), Some("report.pdf"));
        assert!(results[0].distance <= results[1].distance);
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.distance)));
    }

    #[tokio::test]
    async fn test_upsert_same_document_twice_keeps_one_row() {
        let index = SqliteIndex::open_in_memory("chatbot", embedder()).unwrap();
        let d = doc("Revenue was 10M", "a.pdf");
        index.upsert(&[d.clone()]).await.unwrap();
        index.upsert(&[d.with_meta("page", 2)]).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        let results = index.search("revenue", 1).await.unwrap();
        assert_eq!(results[0].document.metadata.get("page"), Some(&serde_json::json!(2)));
    }

    #[tokio::test]
    async fn test_collections_are_isolated_and_reset() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.sqlite");

        let a = SqliteIndex::open(&path, "a", embedder()).unwrap();
        let b = SqliteIndex::open(&path, "b", embedder()).unwrap();
        a.upsert(&[doc("alpha text", "a.txt")]).await.unwrap();
        b.upsert(&[doc("beta text", "b.txt")]).await.unwrap();

        a.reset().await.unwrap();
        assert_eq!(a.count().await.unwrap(), 0);
        assert_eq!(b.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stats_after_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/index.sqlite");
        let index = SqliteIndex::open(&path, "chatbot", embedder()).unwrap();
        index.upsert(&[doc("some text here", "x.txt")]).await.unwrap();

        let stats = index.stats().await.unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.dimensions, 128);
        assert!(stats.last_loaded_at.is_some());
        assert!(stats.size_bytes.unwrap_or(0) > 0);
    }

    #[test]
    fn test_model_mismatch_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.sqlite");

        SqliteIndex::open(&path, "chatbot", Arc::new(TrigramProvider::new(128))).unwrap();
        let reopened = SqliteIndex::open(&path, "chatbot", Arc::new(TrigramProvider::new(64)));
        assert!(matches!(reopened, Err(AppError::Knowledge(_))));
    }

    #[test]
    fn test_embedding_bytes_roundtrip() {
        let v = vec![0.25f32, -1.5, 3.0];
        assert_eq!(bytes_to_embedding(&embedding_to_bytes(&v)).unwrap(), v);
        assert!(bytes_to_embedding(&[0, 1, 2]).is_err());
    }
}

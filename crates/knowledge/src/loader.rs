//! Loading pre-extracted documents into a vector collection.
//!
//! Input is JSON Lines, one `{"content": ..., "metadata": {...}}` record per
//! line. Extraction from PDFs or web pages happens upstream.

use crate::document::Document;
use crate::progress::ProgressReporter;
use crate::vector_index::VectorIndex;
use ragchart_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Instant;

/// Options for a load run.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub batch_size: usize,

    /// Drop the collection before loading
    pub reindex: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            reindex: false,
        }
    }
}

/// Statistics from a load run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadStats {
    pub documents: usize,
    pub batches: usize,
    /// Collection size after loading
    pub collection_size: usize,
    pub duration_secs: f64,
}

#[derive(Debug, Deserialize)]
struct Record {
    content: String,
    #[serde(default)]
    metadata: Map<String, Value>,
}

/// Parse JSON Lines text into documents. Blank lines are skipped.
pub fn parse_jsonl(text: &str) -> AppResult<Vec<Document>> {
    let mut documents = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(line).map_err(|e| {
            AppError::Serialization(format!("line {}: {}", line_no + 1, e))
        })?;
        let document = Document::new(record.content, record.metadata)
            .map_err(|e| AppError::Knowledge(format!("line {}: {}", line_no + 1, e)))?;
        documents.push(document);
    }

    Ok(documents)
}

/// Read `path` and upsert its documents into `index` in batches.
pub async fn load_file(
    index: &dyn VectorIndex,
    path: &Path,
    options: &LoadOptions,
    progress: &ProgressReporter,
) -> AppResult<LoadStats> {
    let text = tokio::fs::read_to_string(path).await?;
    let documents = parse_jsonl(&text)?;
    progress.read(documents.len() as u64, &path.display().to_string());

    load_documents(index, &documents, options, progress).await
}

/// Upsert `documents` in batches, optionally resetting the collection first.
pub async fn load_documents(
    index: &dyn VectorIndex,
    documents: &[Document],
    options: &LoadOptions,
    progress: &ProgressReporter,
) -> AppResult<LoadStats> {
    if options.batch_size == 0 {
        return Err(AppError::Config(
            "batch size must be greater than zero".to_string(),
        ));
    }

    let start = Instant::now();

    if options.reindex {
        tracing::warn!("Reindex requested, dropping existing collection");
        index.reset().await?;
        let collection = index
            .stats()
            .await
            .map(|s| s.collection)
            .unwrap_or_default();
        progress.reset(&collection);
    }

    let total = documents.len() as u64;
    let mut stats = LoadStats::default();

    for batch in documents.chunks(options.batch_size) {
        stats.documents += index.upsert(batch).await?;
        stats.batches += 1;
        progress.index(stats.documents as u64, total, batch.len());
    }

    stats.collection_size = index.count().await?;
    stats.duration_secs = start.elapsed().as_secs_f64();

    tracing::info!(
        documents = stats.documents,
        batches = stats.batches,
        collection_size = stats.collection_size,
        "Load complete in {:.2}s",
        stats.duration_secs
    );

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SOURCE_KEY;
    use crate::embeddings::providers::TrigramProvider;
    use crate::memory_index::MemoryIndex;
    use std::io::Write;
    use std::sync::Arc;

    fn index() -> MemoryIndex {
        MemoryIndex::new("chatbot", Arc::new(TrigramProvider::new(64)))
    }

    #[test]
    fn test_parse_jsonl() {
        let text = r#"{"content": "Revenue was 10M", "metadata": {"source": "report.pdf", "page": 3}}

{"content": "No metadata here"}
"#;
        let docs = parse_jsonl(text).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].source().as_deref(), Some("report.pdf"));
        assert_eq!(docs[0].section().as_deref(), Some("3"));
        assert!(docs[1].metadata.is_empty());
    }

    #[test]
    fn test_parse_reports_line_number() {
        let err = parse_jsonl("{\"content\": \"ok\"}\nnot json\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_nested_metadata_rejected() {
        let err = parse_jsonl(r#"{"content": "x", "metadata": {"tags": ["a"]}}"#).unwrap_err();
        assert!(matches!(err, AppError::Knowledge(_)));
    }

    #[tokio::test]
    async fn test_batches_and_counts() {
        let index = index();
        let docs: Vec<Document> = (0..7)
            .map(|i| Document::from_text(format!("document number {}", i)).with_meta(SOURCE_KEY, "s"))
            .collect();
        let options = LoadOptions {
            batch_size: 3,
            reindex: false,
        };

        let stats = load_documents(&index, &docs, &options, &ProgressReporter::noop())
            .await
            .unwrap();
        assert_eq!(stats.documents, 7);
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.collection_size, 7);
    }

    #[tokio::test]
    async fn test_reload_is_idempotent_and_reindex_resets() {
        let index = index();
        let docs = vec![Document::from_text("alpha"), Document::from_text("beta")];
        let options = LoadOptions::default();
        let progress = ProgressReporter::noop();

        load_documents(&index, &docs, &options, &progress).await.unwrap();
        load_documents(&index, &docs, &options, &progress).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 2);

        let reindex = LoadOptions {
            reindex: true,
            ..LoadOptions::default()
        };
        let stats = load_documents(&index, &docs[..1], &reindex, &progress)
            .await
            .unwrap();
        assert_eq!(stats.collection_size, 1);
    }

    #[tokio::test]
    async fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"content": "gamma", "metadata": {{"source": "a.txt"}}}}"#).unwrap();
        writeln!(file, r#"{{"content": "delta"}}"#).unwrap();

        let index = index();
        let stats = load_file(&index, file.path(), &LoadOptions::default(), &ProgressReporter::noop())
            .await
            .unwrap();
        assert_eq!(stats.documents, 2);
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let options = LoadOptions {
            batch_size: 0,
            reindex: false,
        };
        let result = load_documents(&index(), &[], &options, &ProgressReporter::noop()).await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}

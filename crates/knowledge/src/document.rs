//! Document model shared by the index, retrieval and context assembly.

use ragchart_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Metadata key holding the originating file or URL.
pub const SOURCE_KEY: &str = "source";
/// Metadata key holding the section title.
pub const SECTION_KEY: &str = "section";
/// Metadata key used as section fallback for paginated sources.
pub const PAGE_KEY: &str = "page";
/// Metadata key written by retrieval.
pub const SIMILARITY_KEY: &str = "similarity_score";

/// An immutable text unit with scalar metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    /// Create a document, rejecting nested metadata values.
    pub fn new(content: impl Into<String>, metadata: Map<String, Value>) -> AppResult<Self> {
        if let Some((key, _)) = metadata
            .iter()
            .find(|(_, v)| matches!(v, Value::Array(_) | Value::Object(_)))
        {
            return Err(AppError::Knowledge(format!(
                "Metadata field '{}' must be a scalar",
                key
            )));
        }

        Ok(Self {
            content: content.into(),
            metadata,
        })
    }

    /// Create a document with no metadata.
    pub fn from_text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Map::new(),
        }
    }

    /// Add a metadata field.
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn source(&self) -> Option<String> {
        self.meta_text(SOURCE_KEY)
    }

    /// Section label, falling back to the page number.
    pub fn section(&self) -> Option<String> {
        self.meta_text(SECTION_KEY)
            .or_else(|| self.meta_text(PAGE_KEY))
    }

    /// Relevance percentage written by retrieval, if any.
    pub fn similarity_score(&self) -> Option<f64> {
        self.metadata.get(SIMILARITY_KEY).and_then(Value::as_f64)
    }

    /// Copy of this document carrying a relevance percentage.
    pub fn with_similarity_score(&self, score: f64) -> Self {
        let mut scored = self.clone();
        if let Some(number) = serde_json::Number::from_f64(score) {
            scored
                .metadata
                .insert(SIMILARITY_KEY.to_string(), Value::Number(number));
        }
        scored
    }

    /// Stable identifier derived from source and content.
    ///
    /// Loading the same record twice updates it instead of duplicating it.
    pub fn id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source().unwrap_or_default().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.content.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    fn meta_text(&self, key: &str) -> Option<String> {
        match self.metadata.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// A search candidate with its distance to the query.
///
/// Distances are normalized to `[0, 1]`, smaller is closer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: Document,
    pub distance: f64,
}

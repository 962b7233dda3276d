//! Similarity search over reference documents.
//!
//! The vector engine itself is external; this module only fixes the
//! contract: given a query and a count, return ordered chunks tagged
//! with their source document and, when available, a relevance score.

use crate::error::RetrievalError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A retrieved fragment of reference-document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// The chunk text.
    pub text: String,
    /// Identifier of the document this chunk came from.
    pub source_id: String,
    /// Relevance score (higher is better), if the engine reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,
}

impl DocumentChunk {
    pub fn new(text: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_id: source_id.into(),
            relevance_score: None,
        }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.relevance_score = Some(score);
        self
    }
}

/// Optional restriction on a similarity search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    /// Only return chunks from this source.
    pub source_id: Option<String>,
}

impl SearchFilter {
    pub fn source(source_id: impl Into<String>) -> Self {
        Self {
            source_id: Some(source_id.into()),
        }
    }
}

/// A similarity search engine over document chunks.
///
/// Implementations that cannot filter by source may return
/// [`RetrievalError::FilterUnsupported`] or simply an empty list.
#[async_trait]
pub trait SimilaritySource: Send + Sync {
    /// The engine name (e.g., "sqlite_fts", "in_memory").
    fn name(&self) -> &str;

    /// Return up to `k` chunks for `query`, most similar first.
    async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> std::result::Result<Vec<DocumentChunk>, RetrievalError>;
}

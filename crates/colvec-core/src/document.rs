use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Opaque key-value metadata attached to a document.
pub type Metadata = HashMap<String, serde_json::Value>;

/// A single token embedding vector.
pub type TokenVector = Vec<f32>;

/// Everything a token store persists for one document.
///
/// Stores write a record as a unit: readers see either the whole record or
/// nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// Pooled token vectors, addressed by position.
    pub tokens: Vec<TokenVector>,
    pub created_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Create a record stamped with the current time.
    pub fn new(
        id: Uuid,
        content: impl Into<String>,
        metadata: Metadata,
        tokens: Vec<TokenVector>,
    ) -> Self {
        Self {
            id,
            content: content.into(),
            metadata,
            tokens,
            created_at: Utc::now(),
        }
    }
}

/// A stored document as returned to callers, without its token vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub content: String,
    pub metadata: Metadata,
    /// Number of (pooled) token vectors stored for the document.
    pub token_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<DocumentRecord> for Document {
    fn from(record: DocumentRecord) -> Self {
        Self {
            id: record.id,
            content: record.content,
            metadata: record.metadata,
            token_count: record.tokens.len(),
            created_at: record.created_at,
        }
    }
}

/// One stored token returned by an ANN lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenHit {
    pub document_id: Uuid,
    pub token_index: usize,
    pub similarity: f32,
}

/// A ranked search hit.
///
/// `score` is the MaxSim aggregate: the sum over query tokens of each token's
/// best similarity to the document. It is not a probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub document_id: Uuid,
    pub score: f32,
    pub metadata: Metadata,
}

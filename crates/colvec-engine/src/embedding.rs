use async_trait::async_trait;
use colvec_core::{ColvecError, ColvecResult, TokenVector};

/// Trait for models that embed text as one vector per token.
///
/// Implementations must be deterministic for a given model and version:
/// the same text always yields the same ordered token vectors.
#[async_trait]
pub trait TokenEmbedder: Send + Sync {
    /// Compute per-token vectors for document text.
    async fn embed(&self, text: &str) -> ColvecResult<Vec<TokenVector>>;

    /// Compute per-token vectors for query text.
    ///
    /// Models that encode queries differently (query markers, padding
    /// augmentation) override this; the default reuses [`embed`](Self::embed).
    async fn embed_query(&self, text: &str) -> ColvecResult<Vec<TokenVector>> {
        self.embed(text).await
    }

    /// Dimension of every token vector produced by this embedder.
    fn dimension(&self) -> usize;

    /// Model identity, used in logs and error context.
    fn model_name(&self) -> &str;
}

/// Local per-token embedding that needs no model weights.
///
/// Each word becomes one token vector built from hashed character trigrams
/// (with word-boundary markers), so inflections such as `mammal`/`mammals`
/// land close together while unrelated words stay near-orthogonal. Good for
/// tests and offline use; plug a real late-interaction model in production.
pub struct LocalTokenEmbedding {
    dimension: usize,
    model_name: String,
}

impl LocalTokenEmbedding {
    /// Create an embedder producing `dimension`-component token vectors.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_name: "local-trigram".to_string(),
        }
    }

    /// Override the reported model name. Chainable builder method.
    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    fn embed_word(&self, word: &str) -> TokenVector {
        let mut vector = vec![0.0f32; self.dimension];
        let padded: Vec<char> = std::iter::once('^')
            .chain(word.chars())
            .chain(std::iter::once('$'))
            .collect();

        for gram in padded.windows(3) {
            let gram: String = gram.iter().collect();
            let hash = simple_hash(gram.as_bytes());
            let slot = (hash as usize) % self.dimension;
            // High bit picks the sign so collisions cancel rather than pile up.
            let sign = if hash & 0x8000_0000 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for LocalTokenEmbedding {
    fn default() -> Self {
        Self::new(96)
    }
}

#[async_trait]
impl TokenEmbedder for LocalTokenEmbedding {
    async fn embed(&self, text: &str) -> ColvecResult<Vec<TokenVector>> {
        if self.dimension == 0 {
            return Err(ColvecError::Embedding(
                "local embedder configured with zero dimension".to_string(),
            ));
        }

        let lowered = text.to_lowercase();
        // Text without alphanumeric words yields no tokens; callers decide
        // whether that is an error.
        Ok(lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| self.embed_word(w))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Simple deterministic hash function (FNV-1a).
fn simple_hash(data: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::scoring::cosine_similarity;

    #[tokio::test]
    async fn test_one_vector_per_word() {
        let emb = LocalTokenEmbedding::new(64);
        let tokens = emb.embed("cats are mammals").await.unwrap();
        assert_eq!(tokens.len(), 3);
        assert!(tokens.iter().all(|t| t.len() == 64));
        assert_eq!(emb.dimension(), 64);
    }

    #[tokio::test]
    async fn test_tokens_are_normalized() {
        let emb = LocalTokenEmbedding::default();
        for token in emb.embed("the quick brown fox").await.unwrap() {
            let norm: f32 = token.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 0.001);
        }
    }

    #[tokio::test]
    async fn test_inflections_are_close() {
        let emb = LocalTokenEmbedding::new(256);
        let mammal = &emb.embed("mammal").await.unwrap()[0];
        let mammals = &emb.embed("mammals").await.unwrap()[0];
        let vehicles = &emb.embed("vehicles").await.unwrap()[0];

        let close = cosine_similarity(mammal, mammals);
        let far = cosine_similarity(mammal, vehicles);
        assert!(close > 0.6, "sim(mammal, mammals)={close}");
        assert!(close > far, "sim(mammal, mammals)={close} <= sim(mammal, vehicles)={far}");
    }

    #[tokio::test]
    async fn test_identical_words_identical_vectors() {
        let emb = LocalTokenEmbedding::default();
        let tokens = emb.embed("data Data DATA").await.unwrap();
        assert_eq!(tokens[0], tokens[1]);
        assert_eq!(tokens[1], tokens[2]);
    }

    #[tokio::test]
    async fn test_text_without_words_yields_no_tokens() {
        let emb = LocalTokenEmbedding::default();
        assert!(emb.embed("").await.unwrap().is_empty());
        assert!(emb.embed(" ,.; ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_dimension_is_error() {
        let emb = LocalTokenEmbedding::new(0);
        assert!(matches!(emb.embed("word").await, Err(ColvecError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_query_matches_document_encoding() {
        let emb = LocalTokenEmbedding::default();
        let doc = emb.embed("vector database").await.unwrap();
        let query = emb.embed_query("vector database").await.unwrap();
        assert_eq!(doc, query);
    }

    #[test]
    fn test_model_name_override() {
        let emb = LocalTokenEmbedding::default().with_model_name("test-model");
        assert_eq!(emb.model_name(), "test-model");
    }
}

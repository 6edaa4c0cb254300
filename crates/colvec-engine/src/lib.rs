//! Late-interaction (ColBERT-style) indexing and retrieval.
//!
//! Documents and queries are embedded as one vector per token. Documents are
//! optionally pooled to fewer tokens and stored with their metadata; queries
//! are answered by per-token ANN recall followed by exact MaxSim reranking.
//!
//! # Main types
//!
//! - [`LateInteractionPipeline`]: Indexing and search facade over one table.
//! - [`TokenEmbedder`]: Trait for per-token embedding models.
//! - [`LocalTokenEmbedding`]: Weight-free trigram-hash token embedder.
//! - [`TokenStore`]: Trait for per-token vector storage with ANN queries.
//! - [`InMemoryTokenStore`]: Brute-force in-memory store.
//! - [`FileTokenStore`]: JSONL-backed persistent store.
//! - [`SearchOptions`]: Per-call `k`, filter, and recall limits.

mod call;
/// Token embedder trait and local implementation.
pub mod embedding;
mod indexer;
/// The pipeline facade.
pub mod pipeline;
/// Document and query token pooling.
pub mod pooling;
/// Cosine similarity and MaxSim scoring.
pub mod scoring;
/// Two-stage search.
pub mod search;
/// Token store trait and implementations.
pub mod store;

pub use embedding::{LocalTokenEmbedding, TokenEmbedder};
pub use pipeline::LateInteractionPipeline;
pub use pooling::{pool_document, pool_query, PooledTokens};
pub use scoring::{cosine_similarity, maxsim};
pub use search::SearchOptions;
pub use store::{FileTokenStore, InMemoryTokenStore, TokenStore};

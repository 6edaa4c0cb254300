//! Core types and error definitions for the colvec late-interaction engine.
//!
//! This crate provides the foundational types shared by the engine and its
//! storage/embedding adapters.
//!
//! # Main types
//!
//! - [`ColvecError`]: Unified error enum for every pipeline operation.
//! - [`ColvecResult`]: Convenience alias for `Result<T, ColvecError>`.
//! - [`PipelineConfig`]: Immutable per-pipeline settings.
//! - [`DocumentRecord`]: A document's content, metadata, and token vectors as stored.
//! - [`SearchResult`]: A ranked `(document_id, score, metadata)` hit.
//! - [`FilterCondition`]: Structured predicate over document metadata.

/// Pipeline configuration.
pub mod config;
/// Documents, token vectors, and search results.
pub mod document;
/// Error types.
pub mod error;
/// Metadata filter predicates.
pub mod filter;

pub use config::{EmbedderConfig, PipelineConfig};
pub use document::{Document, DocumentRecord, Metadata, SearchResult, TokenHit, TokenVector};
pub use error::{ColvecError, ColvecResult};
pub use filter::{FilterCondition, FilterOp};

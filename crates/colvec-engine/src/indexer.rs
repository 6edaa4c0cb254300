use colvec_core::{ColvecError, ColvecResult, DocumentRecord, Metadata, TokenVector};
use futures_util::stream::{self, StreamExt};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::call::{bounded, Adapter};
use crate::pipeline::Handles;
use crate::pooling::pool_document;
use crate::scoring::{ensure_dimension, ensure_finite};

/// Embed document text, rejecting empty output, foreign dimensions, and
/// non-finite components.
async fn embed_content(
    h: Handles<'_>,
    id: Uuid,
    content: &str,
) -> ColvecResult<Vec<TokenVector>> {
    let tokens = bounded(
        Adapter::Embedding,
        h.config.call_timeout(),
        || format!("embed document {id}"),
        h.embedder.embed(content),
    )
    .await?;

    if tokens.is_empty() {
        return Err(ColvecError::Embedding(format!(
            "embed document {id}: model '{}' returned zero tokens",
            h.embedder.model_name()
        )));
    }
    let context = format!("embedding of document {id}");
    ensure_dimension(&tokens, h.config.dimension, &context)?;
    ensure_finite(&tokens, &context)?;
    Ok(tokens)
}

/// Embed, pool, and persist one document under `id`.
pub(crate) async fn index_one(
    h: Handles<'_>,
    id: Uuid,
    content: &str,
    metadata: Metadata,
) -> ColvecResult<Uuid> {
    let tokens = embed_content(h, id, content).await?;
    let raw_tokens = tokens.len();

    let pooled = pool_document(tokens, h.config.effective_doc_pool_factor())?;
    let pooled_tokens = pooled.len();

    let table = h.config.table_name.as_str();
    let record = DocumentRecord::new(id, content, metadata, pooled.vectors);
    bounded(
        Adapter::Storage,
        h.config.call_timeout(),
        || format!("put_tokens for document {id} into '{table}'"),
        h.store.put_tokens(table, record),
    )
    .await?;

    debug!(
        document_id = %id,
        raw_tokens,
        pooled_tokens,
        "Indexed document"
    );
    Ok(id)
}

/// Index many documents with at most `limit` in flight.
///
/// The output has one entry per input, in input order. Items still running
/// (or not yet started) when `deadline` passes report `Cancelled`.
pub(crate) async fn index_many(
    h: Handles<'_>,
    items: Vec<(String, Metadata)>,
    limit: usize,
    deadline: Option<Instant>,
) -> Vec<ColvecResult<Uuid>> {
    stream::iter(items.into_iter().enumerate())
        .map(|(position, (content, metadata))| async move {
            let id = Uuid::new_v4();
            let work = index_one(h, id, &content, metadata);
            match deadline {
                Some(at) => match tokio::time::timeout_at(at, work).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ColvecError::Cancelled(format!(
                        "bulk item {position} (document {id}): deadline reached before completion"
                    ))),
                },
                None => work.await,
            }
        })
        .buffered(limit)
        .collect()
        .await
}

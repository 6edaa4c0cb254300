use colvec_core::{ColvecError, ColvecResult, Document, Metadata, PipelineConfig, SearchResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

use crate::call::{bounded, Adapter};
use crate::embedding::TokenEmbedder;
use crate::indexer;
use crate::search::{self, SearchOptions};
use crate::store::TokenStore;

/// Borrowed view of a pipeline's collaborators, handed to the indexing and
/// search stages.
#[derive(Clone, Copy)]
pub(crate) struct Handles<'a> {
    pub config: &'a PipelineConfig,
    pub embedder: &'a dyn TokenEmbedder,
    pub store: &'a dyn TokenStore,
}

/// Late-interaction indexing and retrieval over one storage table.
///
/// Owns an immutable configuration plus shared embedder and store handles.
/// The only mutable state is whether [`initialize`](Self::initialize) has
/// run; every other operation refuses to proceed until it has.
///
/// All methods take `&self`, so one pipeline can be shared across tasks
/// behind an `Arc`.
pub struct LateInteractionPipeline {
    config: Arc<PipelineConfig>,
    embedder: Arc<dyn TokenEmbedder>,
    store: Arc<dyn TokenStore>,
    initialized: AtomicBool,
}

impl LateInteractionPipeline {
    /// Build a pipeline, validating the configuration against the embedder.
    pub fn new(
        config: PipelineConfig,
        embedder: Arc<dyn TokenEmbedder>,
        store: Arc<dyn TokenStore>,
    ) -> ColvecResult<Self> {
        config.validate()?;
        if embedder.dimension() != config.dimension {
            return Err(ColvecError::Config(format!(
                "embedder '{}' produces {}-dimensional tokens but the pipeline expects {}",
                embedder.model_name(),
                embedder.dimension(),
                config.dimension
            )));
        }
        Ok(Self {
            config: Arc::new(config),
            embedder,
            store,
            initialized: AtomicBool::new(false),
        })
    }

    /// The configuration this pipeline was built with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Whether [`initialize`](Self::initialize) has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn handles(&self) -> Handles<'_> {
        Handles {
            config: &self.config,
            embedder: self.embedder.as_ref(),
            store: self.store.as_ref(),
        }
    }

    fn ensure_initialized(&self, operation: &str) -> ColvecResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(ColvecError::NotInitialized(operation.to_string()))
        }
    }

    /// Create the backing table if needed. Safe to call repeatedly.
    pub async fn initialize(&self) -> ColvecResult<()> {
        let table = self.config.table_name.as_str();
        let created = bounded(
            Adapter::Storage,
            self.config.call_timeout(),
            || format!("ensure_schema for '{table}'"),
            self.store.ensure_schema(table),
        )
        .await?;
        self.initialized.store(true, Ordering::Release);
        info!(
            table,
            created,
            model = self.embedder.model_name(),
            dimension = self.config.dimension,
            "Pipeline initialized"
        );
        Ok(())
    }

    /// Index one document under a fresh id.
    pub async fn index_document(&self, content: &str, metadata: Metadata) -> ColvecResult<Uuid> {
        self.index_document_with_id(Uuid::new_v4(), content, metadata).await
    }

    /// Index one document under a caller-chosen id, replacing any existing
    /// document with that id.
    pub async fn index_document_with_id(
        &self,
        id: Uuid,
        content: &str,
        metadata: Metadata,
    ) -> ColvecResult<Uuid> {
        self.ensure_initialized("index_document")?;
        indexer::index_one(self.handles(), id, content, metadata).await
    }

    /// Index many documents concurrently.
    ///
    /// `contents` and `metadata_list` pair up by position. The outer error
    /// covers whole-batch problems (arity, configuration); each inner entry is
    /// that document's own outcome, in input order, so one failure never
    /// hides the others. At most `max_concurrency` documents (default: the
    /// configured limit) are in flight at once.
    pub async fn bulk_index_documents(
        &self,
        contents: Vec<String>,
        metadata_list: Vec<Metadata>,
        max_concurrency: Option<usize>,
    ) -> ColvecResult<Vec<ColvecResult<Uuid>>> {
        self.bulk_index(contents, metadata_list, max_concurrency, None).await
    }

    /// Like [`bulk_index_documents`](Self::bulk_index_documents), but items
    /// not finished by `deadline` report [`ColvecError::Cancelled`].
    ///
    /// Documents already persisted before the deadline stay indexed.
    pub async fn bulk_index_documents_until(
        &self,
        contents: Vec<String>,
        metadata_list: Vec<Metadata>,
        max_concurrency: Option<usize>,
        deadline: Instant,
    ) -> ColvecResult<Vec<ColvecResult<Uuid>>> {
        self.bulk_index(contents, metadata_list, max_concurrency, Some(deadline)).await
    }

    async fn bulk_index(
        &self,
        contents: Vec<String>,
        metadata_list: Vec<Metadata>,
        max_concurrency: Option<usize>,
        deadline: Option<Instant>,
    ) -> ColvecResult<Vec<ColvecResult<Uuid>>> {
        self.ensure_initialized("bulk_index_documents")?;
        if contents.len() != metadata_list.len() {
            return Err(ColvecError::ArityMismatch {
                contents: contents.len(),
                metadata: metadata_list.len(),
            });
        }
        let limit = match max_concurrency {
            Some(0) => {
                return Err(ColvecError::Config("max_concurrency must be at least 1".to_string()))
            }
            Some(n) => n,
            None => self.config.default_concurrency_limit,
        };

        let total = contents.len();
        let items: Vec<(String, Metadata)> = contents.into_iter().zip(metadata_list).collect();
        let outcomes = indexer::index_many(self.handles(), items, limit, deadline).await;

        let failed = outcomes.iter().filter(|o| o.is_err()).count();
        info!(
            total,
            succeeded = total - failed,
            failed,
            concurrency = limit,
            "Bulk indexing finished"
        );
        Ok(outcomes)
    }

    /// Fetch a stored document by id.
    pub async fn get_document(&self, id: Uuid) -> ColvecResult<Document> {
        self.ensure_initialized("get_document")?;
        let table = self.config.table_name.as_str();
        let record = bounded(
            Adapter::Storage,
            self.config.call_timeout(),
            || format!("get_document {id} from '{table}'"),
            self.store.get_document(table, id),
        )
        .await?;
        record.map(Document::from).ok_or(ColvecError::NotFound(id))
    }

    /// Delete a document. Returns whether it existed.
    pub async fn delete_document(&self, id: Uuid) -> ColvecResult<bool> {
        self.ensure_initialized("delete_document")?;
        let table = self.config.table_name.as_str();
        bounded(
            Adapter::Storage,
            self.config.call_timeout(),
            || format!("delete_document {id} from '{table}'"),
            self.store.delete_document(table, id),
        )
        .await
    }

    /// Number of documents in the pipeline's table.
    pub async fn document_count(&self) -> ColvecResult<usize> {
        self.ensure_initialized("document_count")?;
        let table = self.config.table_name.as_str();
        bounded(
            Adapter::Storage,
            self.config.call_timeout(),
            || format!("count_documents in '{table}'"),
            self.store.count_documents(table),
        )
        .await
    }

    /// Return the `k` documents with the highest MaxSim score for `query`.
    pub async fn search(&self, query: &str, k: usize) -> ColvecResult<Vec<SearchResult>> {
        self.search_with(query, SearchOptions::new(k)).await
    }

    /// Search with a metadata filter and per-call recall limits.
    pub async fn search_with(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> ColvecResult<Vec<SearchResult>> {
        self.ensure_initialized("search")?;
        search::run(self.handles(), query, &options).await
    }
}

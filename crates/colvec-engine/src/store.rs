use async_trait::async_trait;
use colvec_core::{ColvecError, ColvecResult, DocumentRecord, FilterCondition, TokenHit};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::scoring::cosine_similarity;

/// Trait for storage backends holding per-token document vectors.
///
/// Every method is scoped to a table (namespace), so one store handle can
/// serve several pipelines.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Create the table if absent. Returns `true` when it was created.
    async fn ensure_schema(&self, table: &str) -> ColvecResult<bool>;

    /// Persist a document's tokens, content, and metadata as one write,
    /// replacing any existing record with the same id.
    async fn put_tokens(&self, table: &str, record: DocumentRecord) -> ColvecResult<()>;

    /// Fetch a document record by id.
    async fn get_document(&self, table: &str, id: Uuid) -> ColvecResult<Option<DocumentRecord>>;

    /// Return up to `top_n` stored tokens nearest to `vector`, most similar
    /// first, considering only documents whose metadata passes `filter`.
    async fn ann_query(
        &self,
        table: &str,
        vector: &[f32],
        top_n: usize,
        filter: Option<&FilterCondition>,
    ) -> ColvecResult<Vec<TokenHit>>;

    /// Delete a document by id.
    async fn delete_document(&self, table: &str, id: Uuid) -> ColvecResult<bool>;

    /// Count documents in a table.
    async fn count_documents(&self, table: &str) -> ColvecResult<usize>;
}

type Table = BTreeMap<Uuid, DocumentRecord>;

fn missing_table(table: &str) -> ColvecError {
    ColvecError::Storage(format!("table '{table}' does not exist"))
}

/// In-memory token store answering ANN queries by exact brute-force cosine
/// similarity. Suitable for tests and small corpora.
pub struct InMemoryTokenStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl InMemoryTokenStore {
    /// Create an empty store with no tables.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Snapshot of every record in a table, ordered by id.
    pub async fn records(&self, table: &str) -> ColvecResult<Vec<DocumentRecord>> {
        let tables = self.tables.read().await;
        let t = tables.get(table).ok_or_else(|| missing_table(table))?;
        Ok(t.values().cloned().collect())
    }

    async fn replace_table(&self, table: &str, records: Vec<DocumentRecord>) {
        let mut tables = self.tables.write().await;
        let t = tables.entry(table.to_string()).or_default();
        t.clear();
        for record in records {
            t.insert(record.id, record);
        }
    }

    async fn contains(&self, table: &str, id: Uuid) -> ColvecResult<bool> {
        let tables = self.tables.read().await;
        let t = tables.get(table).ok_or_else(|| missing_table(table))?;
        Ok(t.contains_key(&id))
    }
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn ensure_schema(&self, table: &str) -> ColvecResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.contains_key(table) {
            return Ok(false);
        }
        tables.insert(table.to_string(), Table::new());
        Ok(true)
    }

    async fn put_tokens(&self, table: &str, record: DocumentRecord) -> ColvecResult<()> {
        if record.tokens.is_empty() {
            return Err(ColvecError::Storage(format!(
                "refusing to store document {} with zero tokens",
                record.id
            )));
        }
        let mut tables = self.tables.write().await;
        let t = tables.get_mut(table).ok_or_else(|| missing_table(table))?;
        t.insert(record.id, record);
        Ok(())
    }

    async fn get_document(&self, table: &str, id: Uuid) -> ColvecResult<Option<DocumentRecord>> {
        let tables = self.tables.read().await;
        let t = tables.get(table).ok_or_else(|| missing_table(table))?;
        Ok(t.get(&id).cloned())
    }

    async fn ann_query(
        &self,
        table: &str,
        vector: &[f32],
        top_n: usize,
        filter: Option<&FilterCondition>,
    ) -> ColvecResult<Vec<TokenHit>> {
        if vector.is_empty() {
            return Err(ColvecError::Storage("empty ANN query vector".to_string()));
        }

        let tables = self.tables.read().await;
        let t = tables.get(table).ok_or_else(|| missing_table(table))?;

        let mut hits = Vec::new();
        for record in t.values() {
            if let Some(f) = filter {
                if !f.matches(&record.metadata) {
                    continue;
                }
            }
            for (token_index, token) in record.tokens.iter().enumerate() {
                if token.len() != vector.len() {
                    return Err(ColvecError::ShapeMismatch {
                        expected: vector.len(),
                        found: token.len(),
                        context: format!("ann_query over document {}", record.id),
                    });
                }
                hits.push(TokenHit {
                    document_id: record.id,
                    token_index,
                    similarity: cosine_similarity(vector, token),
                });
            }
        }

        // Sort by similarity descending; ids and positions break ties.
        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.document_id.cmp(&b.document_id))
                .then_with(|| a.token_index.cmp(&b.token_index))
        });
        hits.truncate(top_n);

        Ok(hits)
    }

    async fn delete_document(&self, table: &str, id: Uuid) -> ColvecResult<bool> {
        let mut tables = self.tables.write().await;
        let t = tables.get_mut(table).ok_or_else(|| missing_table(table))?;
        Ok(t.remove(&id).is_some())
    }

    async fn count_documents(&self, table: &str) -> ColvecResult<usize> {
        let tables = self.tables.read().await;
        let t = tables.get(table).ok_or_else(|| missing_table(table))?;
        Ok(t.len())
    }
}

/// File-backed token store that persists each table as a JSONL file
/// (`<dir>/<table>.jsonl`, one [`DocumentRecord`] per line).
///
/// Loads every table into memory on creation; appends on insert; rewrites the
/// table file on replace and delete.
pub struct FileTokenStore {
    dir: PathBuf,
    inner: InMemoryTokenStore,
    /// Serializes file writes so appended lines never interleave.
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    /// Open (or create) a store rooted at `dir`, loading existing tables.
    pub async fn new(dir: PathBuf) -> ColvecResult<Self> {
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            ColvecError::Storage(format!("Failed to create store dir {}: {e}", dir.display()))
        })?;

        // Collect first: recovery below may rename files in this directory.
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                paths.push(path);
            }
        }

        let inner = InMemoryTokenStore::new();
        for path in paths {
            let Some(table) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let loaded = load_table(&path).await?;
            if loaded.torn_tail {
                // Drop the partial line on disk too, so the next append starts
                // on a fresh line instead of extending it.
                write_table(&path, table, &loaded.records).await?;
                warn!(table = %table, "Rewrote token table after dropping a torn final line");
            }
            debug!(table = %table, documents = loaded.records.len(), "Loaded token table");
            inner.replace_table(table, loaded.records).await;
        }

        Ok(Self {
            dir,
            inner,
            write_lock: Mutex::new(()),
        })
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.jsonl"))
    }

    /// Append a single record to the table file.
    async fn append_to_file(&self, table: &str, record: &DocumentRecord) -> ColvecResult<()> {
        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.table_path(table))
            .await
            .map_err(|e| ColvecError::Storage(format!("Failed to open table '{table}': {e}")))?;
        let mut line = serde_json::to_string(record).map_err(|e| {
            ColvecError::Storage(format!("Failed to serialize document {}: {e}", record.id))
        })?;
        line.push('\n');
        file.write_all(line.as_bytes()).await.map_err(|e| {
            ColvecError::Storage(format!("Failed to write document {}: {e}", record.id))
        })?;
        file.flush()
            .await
            .map_err(|e| ColvecError::Storage(format!("Failed to flush table '{table}': {e}")))?;
        Ok(())
    }

    /// Rewrite the entire table file from the given records.
    async fn rewrite_file(&self, table: &str, records: &[DocumentRecord]) -> ColvecResult<()> {
        write_table(&self.table_path(table), table, records).await
    }
}

/// Write `records` as the full contents of a table file, via a temporary
/// file renamed over the original.
async fn write_table(path: &Path, table: &str, records: &[DocumentRecord]) -> ColvecResult<()> {
    let mut data = String::new();
    for record in records {
        let line = serde_json::to_string(record).map_err(|e| {
            ColvecError::Storage(format!("Failed to serialize document {}: {e}", record.id))
        })?;
        data.push_str(&line);
        data.push('\n');
    }
    let tmp = path.with_extension("jsonl.tmp");
    tokio::fs::write(&tmp, data.as_bytes())
        .await
        .map_err(|e| ColvecError::Storage(format!("Failed to write table '{table}': {e}")))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| ColvecError::Storage(format!("Failed to replace table '{table}': {e}")))?;
    Ok(())
}

/// Records recovered from a table file.
struct LoadedTable {
    records: Vec<DocumentRecord>,
    /// The final line was malformed and skipped.
    torn_tail: bool,
}

/// Parse a JSONL table file. A malformed final line is treated as a torn
/// write and skipped; a malformed line anywhere else is an error.
async fn load_table(path: &Path) -> ColvecResult<LoadedTable> {
    let data = tokio::fs::read_to_string(path).await.map_err(|e| {
        ColvecError::Storage(format!("Failed to read table {}: {e}", path.display()))
    })?;

    let lines: Vec<&str> = data.lines().filter(|l| !l.trim().is_empty()).collect();
    let mut by_id: BTreeMap<Uuid, DocumentRecord> = BTreeMap::new();
    let mut torn_tail = false;
    for (i, line) in lines.iter().enumerate() {
        match serde_json::from_str::<DocumentRecord>(line) {
            // Later lines win, so an appended upsert replaces the earlier copy.
            Ok(record) => {
                by_id.insert(record.id, record);
            }
            Err(e) if i + 1 == lines.len() => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Skipping torn final line in token table"
                );
                torn_tail = true;
            }
            Err(e) => {
                return Err(ColvecError::Storage(format!(
                    "Invalid JSONL entry at line {} of {}: {e}",
                    i + 1,
                    path.display()
                )));
            }
        }
    }
    Ok(LoadedTable {
        records: by_id.into_values().collect(),
        torn_tail,
    })
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn ensure_schema(&self, table: &str) -> ColvecResult<bool> {
        let _guard = self.write_lock.lock().await;
        let created = self.inner.ensure_schema(table).await?;
        if created {
            tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.table_path(table))
                .await
                .map_err(|e| {
                    ColvecError::Storage(format!("Failed to create table '{table}': {e}"))
                })?;
        }
        Ok(created)
    }

    async fn put_tokens(&self, table: &str, record: DocumentRecord) -> ColvecResult<()> {
        if record.tokens.is_empty() {
            return Err(ColvecError::Storage(format!(
                "refusing to store document {} with zero tokens",
                record.id
            )));
        }
        let _guard = self.write_lock.lock().await;
        if self.inner.contains(table, record.id).await? {
            let mut records = self.inner.records(table).await?;
            for existing in &mut records {
                if existing.id == record.id {
                    *existing = record.clone();
                }
            }
            self.rewrite_file(table, &records).await?;
        } else {
            self.append_to_file(table, &record).await?;
        }
        self.inner.put_tokens(table, record).await
    }

    async fn get_document(&self, table: &str, id: Uuid) -> ColvecResult<Option<DocumentRecord>> {
        self.inner.get_document(table, id).await
    }

    async fn ann_query(
        &self,
        table: &str,
        vector: &[f32],
        top_n: usize,
        filter: Option<&FilterCondition>,
    ) -> ColvecResult<Vec<TokenHit>> {
        self.inner.ann_query(table, vector, top_n, filter).await
    }

    async fn delete_document(&self, table: &str, id: Uuid) -> ColvecResult<bool> {
        let _guard = self.write_lock.lock().await;
        if !self.inner.contains(table, id).await? {
            return Ok(false);
        }
        let remaining: Vec<DocumentRecord> = self
            .inner
            .records(table)
            .await?
            .into_iter()
            .filter(|r| r.id != id)
            .collect();
        self.rewrite_file(table, &remaining).await?;
        self.inner.delete_document(table, id).await
    }

    async fn count_documents(&self, table: &str) -> ColvecResult<usize> {
        self.inner.count_documents(table).await
    }
}

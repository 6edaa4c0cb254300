use crate::error::{ColvecError, ColvecResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identity of the token embedding model backing a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedderConfig {
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Execution device hint passed through to the adapter (`cpu`, `cuda`, ...).
    #[serde(default = "default_device")]
    pub device: String,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            device: default_device(),
        }
    }
}

/// Immutable per-pipeline settings.
///
/// Constructed once and shared behind an `Arc`; changing any value means
/// building a new pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub embedder: EmbedderConfig,
    /// Storage table (namespace) holding this pipeline's documents.
    #[serde(default = "default_table_name")]
    pub table_name: String,
    /// Dimension of every token vector in the corpus.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Document-side compression ratio. `None` or `Some(1)` disables pooling.
    #[serde(default)]
    pub doc_pool_factor: Option<usize>,
    /// Cosine distance below which query tokens are merged. `0.0` disables.
    #[serde(default)]
    pub query_pool_distance: f32,
    /// Upper bound on simultaneous in-flight adapter calls for multi-item work.
    #[serde(default = "default_concurrency_limit")]
    pub default_concurrency_limit: usize,
    /// Stored tokens fetched per query token during ANN recall.
    #[serde(default = "default_n_ann_tokens")]
    pub n_ann_tokens: usize,
    /// Documents carried from ANN recall into exact MaxSim reranking.
    #[serde(default = "default_n_maxsim_candidates")]
    pub n_maxsim_candidates: usize,
    /// Optional timeout applied to every embedding and storage call.
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
}

fn default_model_name() -> String {
    "answerdotai/answerai-colbert-small-v1".to_string()
}

fn default_device() -> String {
    "cpu".to_string()
}

fn default_table_name() -> String {
    "colvec".to_string()
}

fn default_dimension() -> usize {
    96
}

fn default_concurrency_limit() -> usize {
    10
}

fn default_n_ann_tokens() -> usize {
    100
}

fn default_n_maxsim_candidates() -> usize {
    20
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            embedder: EmbedderConfig::default(),
            table_name: default_table_name(),
            dimension: default_dimension(),
            doc_pool_factor: None,
            query_pool_distance: 0.0,
            default_concurrency_limit: default_concurrency_limit(),
            n_ann_tokens: default_n_ann_tokens(),
            n_maxsim_candidates: default_n_maxsim_candidates(),
            call_timeout_ms: None,
        }
    }
}

impl PipelineConfig {
    /// Create a config for the given table and vector dimension, with every
    /// other setting at its default.
    pub fn new(table_name: impl Into<String>, dimension: usize) -> Self {
        Self {
            table_name: table_name.into(),
            dimension,
            ..Self::default()
        }
    }

    /// Parse a TOML document and validate the result.
    pub fn from_toml_str(input: &str) -> ColvecResult<Self> {
        let config: Self = toml::from_str(input)
            .map_err(|e| ColvecError::Config(format!("Invalid pipeline config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the embedding model identity. Chainable builder method.
    pub fn with_embedder(
        mut self,
        model_name: impl Into<String>,
        device: impl Into<String>,
    ) -> Self {
        self.embedder = EmbedderConfig {
            model_name: model_name.into(),
            device: device.into(),
        };
        self
    }

    /// Set the document-side pool factor. Chainable builder method.
    pub fn with_doc_pool_factor(mut self, factor: Option<usize>) -> Self {
        self.doc_pool_factor = factor;
        self
    }

    /// Set the query-side pooling distance. Chainable builder method.
    pub fn with_query_pool_distance(mut self, distance: f32) -> Self {
        self.query_pool_distance = distance;
        self
    }

    /// Set the default concurrency limit. Chainable builder method.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.default_concurrency_limit = limit;
        self
    }

    /// Set the default ANN fan-out and MaxSim candidate pool. Chainable builder method.
    pub fn with_search_defaults(mut self, n_ann_tokens: usize, n_maxsim_candidates: usize) -> Self {
        self.n_ann_tokens = n_ann_tokens;
        self.n_maxsim_candidates = n_maxsim_candidates;
        self
    }

    /// Set the per-call adapter timeout. Chainable builder method.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    /// The per-call adapter timeout, if one is configured.
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    /// The effective document pool factor; `None` when pooling is a no-op.
    pub fn effective_doc_pool_factor(&self) -> Option<usize> {
        self.doc_pool_factor.filter(|f| *f > 1)
    }

    /// Check every setting, returning the first problem found.
    pub fn validate(&self) -> ColvecResult<()> {
        if self.table_name.trim().is_empty() {
            return Err(ColvecError::Config("table_name is required".to_string()));
        }
        if !self
            .table_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ColvecError::Config(format!(
                "table_name '{}' must contain only ASCII letters, digits, and underscores",
                self.table_name
            )));
        }
        if self.dimension == 0 {
            return Err(ColvecError::Config("dimension must be positive".to_string()));
        }
        if self.doc_pool_factor == Some(0) {
            return Err(ColvecError::Config(
                "doc_pool_factor must be a positive integer (omit it to disable pooling)"
                    .to_string(),
            ));
        }
        if !self.query_pool_distance.is_finite() || self.query_pool_distance < 0.0 {
            return Err(ColvecError::Config(format!(
                "query_pool_distance must be a non-negative number, got {}",
                self.query_pool_distance
            )));
        }
        if self.default_concurrency_limit == 0 {
            return Err(ColvecError::Config(
                "default_concurrency_limit must be positive".to_string(),
            ));
        }
        if self.n_ann_tokens == 0 || self.n_maxsim_candidates == 0 {
            return Err(ColvecError::Config(
                "n_ann_tokens and n_maxsim_candidates must be positive".to_string(),
            ));
        }
        if self.call_timeout_ms == Some(0) {
            return Err(ColvecError::Config(
                "call_timeout_ms must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

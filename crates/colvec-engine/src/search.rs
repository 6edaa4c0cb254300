//! Two-stage late-interaction retrieval.
//!
//! Stage one sends every (pooled) query token to the store's ANN index and
//! ranks documents by a cheap proxy: the sum, over query tokens, of the
//! best token hit each document got. Stage two fetches the top candidates
//! and reranks them by exact MaxSim.

use colvec_core::{ColvecError, ColvecResult, FilterCondition, SearchResult, TokenHit, TokenVector};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::call::{bounded, with_context, Adapter};
use crate::pipeline::Handles;
use crate::pooling::pool_query;
use crate::scoring::{ensure_dimension, ensure_finite, maxsim};

/// Per-call search parameters.
///
/// Unset ANN and candidate limits fall back to the pipeline configuration.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Maximum number of results to return.
    pub k: usize,
    /// Metadata predicate applied inside the ANN stage.
    pub filter: Option<FilterCondition>,
    /// Nearest stored tokens fetched per query token.
    pub n_ann_tokens: Option<usize>,
    /// Documents carried from the ANN stage into exact reranking.
    pub n_maxsim_candidates: Option<usize>,
}

impl SearchOptions {
    /// Options returning up to `k` results with configured recall limits.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Self::default()
        }
    }

    /// Restrict results to documents whose metadata matches `filter`.
    pub fn with_filter(mut self, filter: FilterCondition) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Override the configured ANN fan-out per query token.
    pub fn with_ann_tokens(mut self, n: usize) -> Self {
        self.n_ann_tokens = Some(n);
        self
    }

    /// Override the configured candidate count for reranking.
    pub fn with_maxsim_candidates(mut self, n: usize) -> Self {
        self.n_maxsim_candidates = Some(n);
        self
    }
}

/// A document selected by the ANN stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
    pub document_id: Uuid,
    pub proxy_score: f32,
}

/// Aggregate per-query-token ANN hits into at most `limit` candidates.
///
/// Each document's proxy score is the sum over query tokens of its best hit
/// for that token; a token that did not reach the document contributes
/// nothing. Ordered by proxy score descending, then id.
pub(crate) fn select_candidates(
    per_token_hits: &[Vec<TokenHit>],
    limit: usize,
) -> Vec<Candidate> {
    let mut proxy: HashMap<Uuid, f32> = HashMap::new();
    for hits in per_token_hits {
        let mut best: HashMap<Uuid, f32> = HashMap::new();
        for hit in hits {
            best.entry(hit.document_id)
                .and_modify(|b| *b = b.max(hit.similarity))
                .or_insert(hit.similarity);
        }
        for (id, similarity) in best {
            *proxy.entry(id).or_insert(0.0) += similarity;
        }
    }

    let mut candidates: Vec<Candidate> = proxy
        .into_iter()
        .map(|(document_id, proxy_score)| Candidate {
            document_id,
            proxy_score,
        })
        .collect();
    candidates.sort_by(|a, b| {
        b.proxy_score
            .total_cmp(&a.proxy_score)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    candidates.truncate(limit);
    candidates
}

/// Sort reranked results by score descending (ties by id) and keep `k`.
pub(crate) fn rank_results(mut scored: Vec<SearchResult>, k: usize) -> Vec<SearchResult> {
    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    scored.truncate(k);
    scored
}

async fn embed_query(h: Handles<'_>, query: &str) -> ColvecResult<Vec<TokenVector>> {
    let tokens = bounded(
        Adapter::Embedding,
        h.config.call_timeout(),
        || "embed query".to_string(),
        h.embedder.embed_query(query),
    )
    .await?;

    if tokens.is_empty() {
        return Err(ColvecError::InvalidQuery(format!(
            "query produced no tokens with model '{}'",
            h.embedder.model_name()
        )));
    }
    ensure_dimension(&tokens, h.config.dimension, "query embedding")?;
    ensure_finite(&tokens, "query embedding")?;
    Ok(tokens)
}

pub(crate) async fn run(
    h: Handles<'_>,
    query: &str,
    options: &SearchOptions,
) -> ColvecResult<Vec<SearchResult>> {
    if query.trim().is_empty() {
        return Err(ColvecError::InvalidQuery("query text is empty".to_string()));
    }
    if options.k == 0 {
        return Ok(Vec::new());
    }

    let n_ann = options.n_ann_tokens.unwrap_or(h.config.n_ann_tokens);
    let n_candidates = options
        .n_maxsim_candidates
        .unwrap_or(h.config.n_maxsim_candidates);
    let limit = h.config.default_concurrency_limit;
    let timeout = h.config.call_timeout();
    let table = h.config.table_name.as_str();
    let filter = options.filter.as_ref();

    let raw = embed_query(h, query).await?;
    let raw_tokens = raw.len();
    let query_tokens = pool_query(raw, h.config.query_pool_distance)?.vectors;

    let per_token_hits: Vec<Vec<TokenHit>> = stream::iter(query_tokens.iter().enumerate())
        .map(|(position, token)| {
            bounded(
                Adapter::Storage,
                timeout,
                move || format!("ann_query for query token {position} in '{table}'"),
                h.store.ann_query(table, token, n_ann, filter),
            )
        })
        .buffered(limit)
        .try_collect()
        .await?;

    let candidates = select_candidates(&per_token_hits, n_candidates);

    let records = stream::iter(candidates.iter().map(|c| c.document_id))
        .map(|id| {
            bounded(
                Adapter::Storage,
                timeout,
                move || format!("get_document {id} from '{table}'"),
                h.store.get_document(table, id),
            )
        })
        .buffered(limit)
        .try_collect::<Vec<_>>()
        .await?;

    let mut scored = Vec::with_capacity(records.len());
    for (candidate, record) in candidates.iter().zip(records) {
        let Some(record) = record else {
            warn!(
                document_id = %candidate.document_id,
                "Candidate disappeared before reranking, skipping"
            );
            continue;
        };
        let score = maxsim(&query_tokens, &record.tokens).map_err(|e| {
            with_context(Adapter::Storage, &format!("rerank document {}", record.id), e)
        })?;
        scored.push(SearchResult {
            document_id: record.id,
            score,
            metadata: record.metadata,
        });
    }

    let results = rank_results(scored, options.k);
    debug!(
        raw_tokens,
        pooled_tokens = query_tokens.len(),
        candidates = candidates.len(),
        results = results.len(),
        "Search completed"
    );
    Ok(results)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use colvec_core::Metadata;

    fn hit(document_id: Uuid, token_index: usize, similarity: f32) -> TokenHit {
        TokenHit {
            document_id,
            token_index,
            similarity,
        }
    }

    fn ids(n: usize) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = (0..n).map(|_| Uuid::new_v4()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_proxy_uses_best_hit_per_query_token() {
        let d = ids(2);
        let per_token = vec![
            // Document 0 gets two hits from token 0; only the best counts.
            vec![hit(d[0], 0, 0.9), hit(d[0], 1, 0.8), hit(d[1], 0, 0.5)],
            vec![hit(d[1], 1, 0.7)],
        ];
        let candidates = select_candidates(&per_token, 10);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].document_id, d[1]);
        assert!((candidates[0].proxy_score - 1.2).abs() < 1e-6);
        assert_eq!(candidates[1].document_id, d[0]);
        assert!((candidates[1].proxy_score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_candidates_truncated_and_tie_broken_by_id() {
        let d = ids(3);
        let per_token = vec![vec![hit(d[2], 0, 0.5), hit(d[0], 0, 0.5), hit(d[1], 0, 0.5)]];
        let candidates = select_candidates(&per_token, 2);
        let got: Vec<Uuid> = candidates.iter().map(|c| c.document_id).collect();
        assert_eq!(got, vec![d[0], d[1]]);
    }

    #[test]
    fn test_no_hits_no_candidates() {
        assert!(select_candidates(&[], 5).is_empty());
        assert!(select_candidates(&[vec![], vec![]], 5).is_empty());
    }

    #[test]
    fn test_rank_results_orders_and_truncates() {
        let d = ids(3);
        let result = |id: Uuid, score: f32| SearchResult {
            document_id: id,
            score,
            metadata: Metadata::new(),
        };
        let ranked = rank_results(
            vec![result(d[2], 1.0), result(d[0], 2.5), result(d[1], 1.0)],
            2,
        );
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].document_id, d[0]);
        // Equal scores fall back to id order.
        assert_eq!(ranked[1].document_id, d[1]);
    }

    #[test]
    fn test_non_finite_scores_sort_without_panic() {
        let d = ids(40);
        let scored: Vec<SearchResult> = d
            .iter()
            .enumerate()
            .map(|(i, id)| SearchResult {
                document_id: *id,
                score: if i % 3 == 0 { f32::NAN } else { i as f32 },
                metadata: Metadata::new(),
            })
            .collect();
        let ranked = rank_results(scored, 40);
        assert_eq!(ranked.len(), 40);

        let per_token = vec![d
            .iter()
            .enumerate()
            .map(|(i, id)| hit(*id, 0, if i % 2 == 0 { f32::NAN } else { 0.5 }))
            .collect::<Vec<_>>()];
        assert_eq!(select_candidates(&per_token, 40).len(), 40);
    }

    #[test]
    fn test_options_builder() {
        let opts = SearchOptions::new(5)
            .with_ann_tokens(32)
            .with_maxsim_candidates(8)
            .with_filter(FilterCondition::eq("lang", "en"));
        assert_eq!(opts.k, 5);
        assert_eq!(opts.n_ann_tokens, Some(32));
        assert_eq!(opts.n_maxsim_candidates, Some(8));
        assert!(opts.filter.is_some());
    }
}

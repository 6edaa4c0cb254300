//! Token pooling: merge near-duplicate token vectors into fewer representatives.
//!
//! Both document-side and query-side pooling run the same deterministic
//! centroid-linkage agglomeration and differ only in when they stop:
//!
//! - documents stop at a target count of `max(1, N / factor)`,
//! - queries stop once the closest pair is no longer within the cosine
//!   distance threshold.
//!
//! Each step merges the pair of clusters whose centroids have the highest
//! cosine similarity. Ties go to the pair whose first cluster starts earliest,
//! then whose second cluster starts earliest, so identical input always pools
//! identically.

use colvec_core::{ColvecResult, TokenVector};

use crate::scoring::{cosine_similarity, ensure_dimension};

/// Pooled token vectors plus the original positions each one absorbed.
#[derive(Debug, Clone, PartialEq)]
pub struct PooledTokens {
    /// Representative vectors, ordered by their earliest original position.
    pub vectors: Vec<TokenVector>,
    /// `groups[i]` lists, ascending, the input positions merged into `vectors[i]`.
    pub groups: Vec<Vec<usize>>,
}

impl PooledTokens {
    fn identity(tokens: Vec<TokenVector>) -> Self {
        let groups = (0..tokens.len()).map(|i| vec![i]).collect();
        Self {
            vectors: tokens,
            groups,
        }
    }

    /// Number of pooled vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether pooling produced no vectors (only for empty input).
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// When the agglomeration stops merging.
#[derive(Debug, Clone, Copy)]
enum StopRule {
    /// Stop once this many clusters remain.
    TargetCount(usize),
    /// Stop once the closest pair's cosine distance is not below this.
    MaxDistance(f32),
}

/// Document-side pooling by compression factor.
///
/// `None` or a factor of 1 returns the input unchanged.
pub fn pool_document(
    tokens: Vec<TokenVector>,
    factor: Option<usize>,
) -> ColvecResult<PooledTokens> {
    check_shape(&tokens, "document pooling")?;
    match factor {
        Some(f) if f > 1 && tokens.len() > 1 => {
            let target = (tokens.len() / f).max(1);
            Ok(agglomerate(tokens, StopRule::TargetCount(target)))
        }
        _ => Ok(PooledTokens::identity(tokens)),
    }
}

/// Query-side pooling by cosine distance threshold.
///
/// A threshold of 0 (or below) returns the input unchanged.
pub fn pool_query(tokens: Vec<TokenVector>, max_distance: f32) -> ColvecResult<PooledTokens> {
    check_shape(&tokens, "query pooling")?;
    if max_distance > 0.0 && tokens.len() > 1 {
        Ok(agglomerate(tokens, StopRule::MaxDistance(max_distance)))
    } else {
        Ok(PooledTokens::identity(tokens))
    }
}

fn check_shape(tokens: &[TokenVector], context: &str) -> ColvecResult<()> {
    match tokens.first() {
        Some(first) => ensure_dimension(tokens, first.len(), context),
        None => Ok(()),
    }
}

struct Cluster {
    members: Vec<usize>,
    /// Component-wise sum of member vectors; same direction as the mean.
    sum: Vec<f32>,
}

fn agglomerate(tokens: Vec<TokenVector>, stop: StopRule) -> PooledTokens {
    let n = tokens.len();
    let mut clusters: Vec<Option<Cluster>> = tokens
        .iter()
        .enumerate()
        .map(|(i, t)| {
            Some(Cluster {
                members: vec![i],
                sum: t.clone(),
            })
        })
        .collect();

    // Upper triangle of pairwise centroid similarities, sim[i][j] for i < j.
    let mut sim = vec![vec![0.0f32; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            sim[i][j] = cosine_similarity(&tokens[i], &tokens[j]);
        }
    }

    let mut active = n;
    while active > 1 {
        if let StopRule::TargetCount(target) = stop {
            if active <= target {
                break;
            }
        }

        // Active slots stay ordered by their earliest member, so scanning
        // (i, j) ascending and replacing only on a strictly better score
        // implements the positional tie-break.
        let mut best: Option<(usize, usize, f32)> = None;
        for i in 0..n {
            if clusters[i].is_none() {
                continue;
            }
            for j in (i + 1)..n {
                if clusters[j].is_none() {
                    continue;
                }
                let s = sim[i][j];
                if best.map_or(true, |(_, _, b)| s > b) {
                    best = Some((i, j, s));
                }
            }
        }

        let Some((i, j, s)) = best else {
            break;
        };
        if let StopRule::MaxDistance(threshold) = stop {
            if 1.0 - s >= threshold {
                break;
            }
        }

        let Some(absorbed) = clusters[j].take() else {
            break;
        };
        if let Some(keep) = clusters[i].as_mut() {
            for (acc, v) in keep.sum.iter_mut().zip(absorbed.sum.iter()) {
                *acc += v;
            }
            keep.members.extend(absorbed.members);
            keep.members.sort_unstable();
        }
        active -= 1;

        if let Some(keep) = clusters[i].as_ref() {
            for k in 0..n {
                if k == i {
                    continue;
                }
                if let Some(other) = clusters[k].as_ref() {
                    let s = cosine_similarity(&keep.sum, &other.sum);
                    if k < i {
                        sim[k][i] = s;
                    } else {
                        sim[i][k] = s;
                    }
                }
            }
        }
    }

    let mut vectors = Vec::with_capacity(active);
    let mut groups = Vec::with_capacity(active);
    for cluster in clusters.into_iter().flatten() {
        let vector = if cluster.members.len() == 1 {
            tokens[cluster.members[0]].clone()
        } else {
            let count = cluster.members.len() as f32;
            cluster.sum.iter().map(|x| x / count).collect()
        };
        vectors.push(vector);
        groups.push(cluster.members);
    }

    PooledTokens { vectors, groups }
}

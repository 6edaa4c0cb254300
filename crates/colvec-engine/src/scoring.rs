use colvec_core::{ColvecError, ColvecResult, TokenVector};

/// Cosine similarity between two vectors of equal length.
///
/// Returns 0.0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Check that every vector has exactly `expected` components.
pub fn ensure_dimension(
    vectors: &[TokenVector],
    expected: usize,
    context: &str,
) -> ColvecResult<()> {
    match vectors.iter().find(|v| v.len() != expected) {
        Some(bad) => Err(ColvecError::ShapeMismatch {
            expected,
            found: bad.len(),
            context: context.to_string(),
        }),
        None => Ok(()),
    }
}

/// Check that every component of every vector is finite.
pub fn ensure_finite(vectors: &[TokenVector], context: &str) -> ColvecResult<()> {
    for (position, vector) in vectors.iter().enumerate() {
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(ColvecError::Embedding(format!(
                "{context}: token {position} has non-finite components"
            )));
        }
    }
    Ok(())
}

/// Late-interaction MaxSim score.
///
/// For every query token, take its best cosine similarity against any
/// document token, then sum those maxima. A document with no tokens scores
/// 0.0.
pub fn maxsim(query: &[TokenVector], doc: &[TokenVector]) -> ColvecResult<f32> {
    let Some(first) = query.first() else {
        return Ok(0.0);
    };
    let dim = first.len();
    ensure_dimension(query, dim, "maxsim query")?;
    ensure_dimension(doc, dim, "maxsim document")?;

    if doc.is_empty() {
        return Ok(0.0);
    }

    let score = query
        .iter()
        .map(|q| {
            doc.iter()
                .map(|d| cosine_similarity(q, d))
                .fold(f32::NEG_INFINITY, f32::max)
        })
        .sum();
    Ok(score)
}

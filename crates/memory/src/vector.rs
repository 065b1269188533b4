//! Vector similarity and ranking utilities.

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the lengths differ or either vector is empty or all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Order candidate indices by descending similarity to `query`.
///
/// Returns `(index, score)` pairs, at most `limit` of them. The sort is
/// stable, so equal scores keep their original relative order.
pub fn rank_by_similarity<'a, I>(query: &[f32], candidates: I, limit: usize) -> Vec<(usize, f32)>
where
    I: IntoIterator<Item = (usize, &'a [f32])>,
{
    let mut scored: Vec<(usize, f32)> = candidates
        .into_iter()
        .map(|(i, v)| (i, cosine_similarity(query, v)))
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

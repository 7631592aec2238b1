//! Vector similarity helpers.

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1]; 0.0 when lengths differ or either vector is
/// empty or zero.
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

/// Keep the `limit` candidates most similar to `query`, best first.
///
/// Ties keep their input order.
pub fn rank_by_similarity<'a, T>(
    candidates: impl IntoIterator<Item = (&'a [f32], T)>,
    query: &[f32],
    limit: usize,
) -> Vec<(f32, T)> {
    let mut scored: Vec<(f32, T)> = candidates
        .into_iter()
        .map(|(embedding, item)| (cosine_similarity(embedding, query), item))
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        let v = [0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_and_degenerate() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn ranking_is_descending_and_limited() {
        let a = vec![1.0, 0.0];
        let b = vec![0.7, 0.7];
        let c = vec![0.0, 1.0];
        let ranked = rank_by_similarity(
            [(a.as_slice(), "a"), (b.as_slice(), "b"), (c.as_slice(), "c")],
            &[1.0, 0.1],
            2,
        );
        let names: Vec<_> = ranked.iter().map(|(_, n)| *n).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(ranked[0].0 >= ranked[1].0);
    }
}

//! Cosine distance primitive shared by every matching path.

/// Distance reported when either vector has zero norm (similarity undefined).
pub const NO_SIMILARITY_DISTANCE: f32 = 1.0;

/// Cosine distance = 1 - cosine similarity, in [0, 2].
///
/// Similarity is clamped to [-1, 1] before subtraction so rounding can never
/// push the result outside the range. A zero-norm input yields
/// [`NO_SIMILARITY_DISTANCE`] instead of NaN.
///
/// # Panics
///
/// Panics if `a` and `b` differ in length. Mismatched sizes mean the
/// embeddings came from different models; callers validate before calling.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(
        a.len(),
        b.len(),
        "embedding vectors must have the same length"
    );

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return NO_SIMILARITY_DISTANCE;
    }

    1.0 - (dot / denom).clamp(-1.0, 1.0)
}

/// Scale `v` to unit L2 norm. A zero vector is returned as-is.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

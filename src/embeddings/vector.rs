// Vector math for unit-length embeddings.
//
// Everything downstream of the provider (anchors, scoring, clustering) works on
// L2-normalized f64 vectors, so cosine similarity collapses to a dot product.
// The zero vector is a legal value: it normalizes to itself and scores 0.0
// against everything.

/// Rescale a vector to unit L2 length. A zero-magnitude input is returned
/// unchanged (as zeros) rather than treated as an error.
pub fn normalize(vector: &[f64]) -> Vec<f64> {
    let norm = l2_norm(vector);
    if norm == 0.0 || !norm.is_finite() {
        return vec![0.0; vector.len()];
    }
    vector.iter().map(|v| v / norm).collect()
}

/// Euclidean length of a vector.
pub fn l2_norm(vector: &[f64]) -> f64 {
    vector.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Plain dot product. Callers check that lengths match; mismatched
/// lengths compare over the shared prefix.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity of two unit vectors, clipped to [-1, 1] to absorb
/// floating-point drift.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let score = dot(a, b);
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(-1.0, 1.0)
}

/// Distance reported on peer links: `max(0, 1 - cosine)` rounded to 4 decimals.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    let distance = (1.0 - cosine(a, b)).max(0.0);
    (distance * 10_000.0).round() / 10_000.0
}

/// Component-wise mean of the given vectors, renormalized to unit length.
///
/// Returns an empty vector for empty input. Vectors shorter than the first one
/// contribute zeros for their missing components.
pub fn centroid<V: AsRef<[f64]>>(vectors: &[V]) -> Vec<f64> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };

    let dim = first.as_ref().len();
    let mut sum = vec![0.0_f64; dim];
    for vector in vectors {
        for (slot, value) in sum.iter_mut().zip(vector.as_ref().iter()) {
            *slot += value;
        }
    }

    let n = vectors.len() as f64;
    for slot in &mut sum {
        *slot /= n;
    }

    normalize(&sum)
}

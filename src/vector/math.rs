//! Vector normalization and similarity primitives.
//!
//! Every vector entering an index is L2-normalized here so that inner
//! product and cosine similarity coincide. The zero vector is the one
//! documented degenerate case: it passes through unchanged (there is no
//! meaningful direction to normalize onto) and emits a warning instead of
//! an error.

use tracing::warn;

/// Norms below this are treated as zero.
pub(crate) const NORM_EPSILON: f32 = 1e-10;

/// Computes the L2 norm of a vector.
#[must_use]
pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Normalizes a vector in-place to unit length.
///
/// The zero vector is left unchanged; this is a documented degenerate case,
/// not an error.
pub fn normalize(vector: &mut [f32]) {
    let norm = l2_norm(vector);
    if norm > NORM_EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    } else {
        warn!(
            dimension = vector.len(),
            "normalizing a zero-norm vector; passing through unchanged"
        );
    }
}

/// Creates a normalized copy of a vector.
#[must_use]
pub fn normalized(vector: &[f32]) -> Vec<f32> {
    let mut copy = vector.to_vec();
    normalize(&mut copy);
    copy
}

/// Returns true iff the vector is non-empty and has the expected length.
#[must_use]
pub fn validate_dimensions(vector: &[f32], expected: usize) -> bool {
    !vector.is_empty() && vector.len() == expected
}

/// Computes the inner product of two vectors.
///
/// For unit-norm vectors this equals cosine similarity, which is why the
/// indexes score candidates with this cheaper form.
#[must_use]
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Computes cosine similarity between two vectors.
///
/// Returns a value in [-1, 1], where 1 is most similar. Either operand
/// having zero norm yields 0.0.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

    let dot_product = inner_product(a, b);
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_produces_unit_norm() {
        let mut vector = vec![3.0, 4.0];
        normalize(&mut vector);

        let norm = l2_norm(&vector);
        assert!((norm - 1.0).abs() < f32::EPSILON);
        assert!((vector[0] - 0.6).abs() < f32::EPSILON);
        assert!((vector[1] - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_normalize_zero_vector_unchanged() {
        let mut vector = vec![0.0, 0.0, 0.0];
        normalize(&mut vector);
        assert_eq!(vector, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_normalized_arbitrary_vectors() {
        for scale in [0.001_f32, 1.0, 42.0, 1e6] {
            let vector: Vec<f32> = (1..=16).map(|i| i as f32 * scale).collect();
            let unit = normalized(&vector);
            assert!(
                (l2_norm(&unit) - 1.0).abs() < 1e-5,
                "norm should be ~1.0 at scale {scale}"
            );
        }
    }

    #[test]
    fn test_validate_dimensions() {
        assert!(validate_dimensions(&[0.0; 4], 4));
        assert!(!validate_dimensions(&[0.0; 3], 4));
        assert!(!validate_dimensions(&[], 0));
    }

    #[test]
    fn test_cosine_similarity() {
        // Identical vectors
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < f32::EPSILON);

        // Orthogonal vectors
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_similarity(&a, &b) - 0.0).abs() < f32::EPSILON);

        // Opposite vectors
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-1.0, -2.0, -3.0];
        assert!((cosine_similarity(&a, &b) - (-1.0)).abs() < f32::EPSILON);

        // Zero vector
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![0.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_self_similarity_is_maximal() {
        let vector = normalized(&[0.3, -0.7, 0.9, 0.1]);
        assert!((cosine_similarity(&vector, &vector) - 1.0).abs() < 1e-6);
        assert!((inner_product(&vector, &vector) - 1.0).abs() < 1e-6);
    }
}

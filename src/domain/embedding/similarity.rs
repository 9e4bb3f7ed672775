//! Vector similarity helpers

use crate::domain::DomainError;

/// Calculate cosine similarity between two vectors
///
/// Returns 0.0 for empty, mismatched or zero-norm inputs. Sums are taken in
/// f64 so a vector compared with itself yields exactly 1.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot_product, norm_a, norm_b) =
        a.iter()
            .zip(b.iter())
            .fold((0.0f64, 0.0f64, 0.0f64), |(dot, na, nb), (&x, &y)| {
                let (x, y) = (x as f64, y as f64);
                (dot + x * y, na + x * x, nb + y * y)
            });

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

/// Check a vector against the fixed dimensionality of a cache instance
pub fn validate_vector(vector: &[f32], dimensions: usize) -> Result<(), DomainError> {
    if vector.len() != dimensions {
        return Err(DomainError::dimension_mismatch(dimensions, vector.len()));
    }

    if vector.iter().any(|v| !v.is_finite()) {
        return Err(DomainError::invalid_argument(
            "vector contains non-finite components",
        ));
    }

    Ok(())
}

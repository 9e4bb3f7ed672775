//! Local feature-hashing embedder
//!
//! Maps word unigrams and bigrams onto a fixed number of buckets with a signed
//! SHA-256 hash, then L2-normalizes. Texts sharing vocabulary land close
//! together; no network or model is involved, so it suits offline use and
//! tests.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::domain::DomainError;
use crate::domain::embedding::Embedder;

pub const DEFAULT_HASHING_DIMENSIONS: usize = 256;

/// Deterministic bag-of-words embedder
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Result<Self, DomainError> {
        if dimensions == 0 {
            return Err(DomainError::configuration(
                "hashing embedder dimensions must be greater than 0",
            ));
        }

        Ok(Self { dimensions })
    }

    /// Compute the vector synchronously
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        let mut vector = vec![0.0f32; self.dimensions];

        for token in &tokens {
            self.accumulate(&mut vector, token.as_bytes(), 1.0);
        }

        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut vector, bigram.as_bytes(), 0.5);
        }

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for x in &mut vector {
                *x /= magnitude;
            }
        }

        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let digest = Sha256::digest(feature);

        let mut bucket = [0u8; 8];
        bucket.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };

        vector[index] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_HASHING_DIMENSIONS,
        }
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        Ok(self.vectorize(text))
    }

    fn name(&self) -> &'static str {
        "hashing"
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.dimensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::cosine_similarity;

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(HashingEmbedder::new(0).is_err());
    }

    #[test]
    fn test_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64).unwrap();

        let a = embedder.vectorize("user: What is the capital of France?");
        let b = embedder.vectorize("user: What is the capital of France?");

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let embedder = HashingEmbedder::default();

        let a = embedder.vectorize("Capital of France?");
        let b = embedder.vectorize("capital OF france");

        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_vocabulary_is_closer() {
        let embedder = HashingEmbedder::default();

        let query = embedder.vectorize("user: what is the capital of france");
        let close = embedder.vectorize("user: what's the capital of france");
        let far = embedder.vectorize("user: how do I bake sourdough bread");

        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8).unwrap();

        assert_eq!(embedder.vectorize("  ?! "), vec![0.0; 8]);
    }

    #[tokio::test]
    async fn test_embedder_trait() {
        let embedder = HashingEmbedder::new(32).unwrap();

        assert_eq!(embedder.name(), "hashing");
        assert_eq!(embedder.dimensions(), Some(32));
        assert_eq!(embedder.embed("hello").await.unwrap().len(), 32);
    }
}

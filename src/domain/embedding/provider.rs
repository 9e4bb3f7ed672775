//! Embedder trait definition

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Converts rendered conversation context into a fixed-dimension vector
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Embedder: Send + Sync + Debug {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError>;

    /// Provider name, used in logs and error messages
    fn name(&self) -> &'static str;

    /// Dimensionality of the produced vectors, when known up front
    fn dimensions(&self) -> Option<usize>;
}

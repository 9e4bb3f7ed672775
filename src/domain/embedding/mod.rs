//! Embedder domain trait and vector math

mod provider;
mod similarity;

pub use provider::Embedder;
pub use similarity::{cosine_similarity, validate_vector};

#[cfg(test)]
pub use provider::MockEmbedder;
#[cfg(test)]
pub use provider::mock::ScriptedEmbedder;

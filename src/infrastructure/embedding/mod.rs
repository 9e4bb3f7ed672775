//! Embedder implementations

mod factory;
mod hashing;
mod http_client;
mod openai;

pub use factory::{EmbeddingConfig, EmbeddingProviderKind, create_embedder};
pub use hashing::{DEFAULT_HASHING_DIMENSIONS, HashingEmbedder};
pub use http_client::{HttpClient, HttpClientTrait};
pub use openai::{DEFAULT_EMBEDDING_MODEL, OpenAiEmbedder};

#[cfg(test)]
pub use http_client::mock::MockHttpClient;

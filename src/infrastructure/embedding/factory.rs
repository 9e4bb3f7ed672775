//! Embedder factory for runtime provider selection

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::hashing::{DEFAULT_HASHING_DIMENSIONS, HashingEmbedder};
use super::openai::{DEFAULT_EMBEDDING_MODEL, DEFAULT_OPENAI_BASE_URL, OpenAiEmbedder};
use super::HttpClient;
use crate::domain::DomainError;
use crate::domain::embedding::Embedder;

/// Supported embedding providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Local feature hashing, no network
    #[default]
    Hashing,
    /// OpenAI-compatible `/v1/embeddings` endpoint
    OpenAi,
}

impl std::fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProviderKind::Hashing => write!(f, "hashing"),
            EmbeddingProviderKind::OpenAi => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for EmbeddingProviderKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hashing" | "local" => Ok(EmbeddingProviderKind::Hashing),
            "openai" | "open_ai" => Ok(EmbeddingProviderKind::OpenAi),
            _ => Err(DomainError::configuration(format!(
                "Unknown embedding provider: {}. Valid providers: hashing, openai",
                s
            ))),
        }
    }
}

/// Embedder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Requested vector size; the hashing provider defaults to 256
    #[serde(default)]
    pub dimensions: Option<usize>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            model: None,
            base_url: None,
            api_key_env: default_api_key_env(),
            dimensions: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl EmbeddingConfig {
    pub fn hashing(dimensions: usize) -> Self {
        Self {
            dimensions: Some(dimensions),
            ..Default::default()
        }
    }

    pub fn openai(model: impl Into<String>) -> Self {
        Self {
            provider: EmbeddingProviderKind::OpenAi,
            model: Some(model.into()),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = var.into();
        self
    }
}

/// Build the configured embedder
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, DomainError> {
    match config.provider {
        EmbeddingProviderKind::Hashing => {
            let dimensions = config.dimensions.unwrap_or(DEFAULT_HASHING_DIMENSIONS);
            Ok(Arc::new(HashingEmbedder::new(dimensions)?))
        }
        EmbeddingProviderKind::OpenAi => {
            let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                DomainError::configuration(format!(
                    "{} must be set for the openai embedding provider",
                    config.api_key_env
                ))
            })?;

            let client = HttpClient::with_timeout(Duration::from_millis(config.request_timeout_ms))?;
            let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_OPENAI_BASE_URL);
            let model = config.model.as_deref().unwrap_or(DEFAULT_EMBEDDING_MODEL);

            let mut embedder = OpenAiEmbedder::with_base_url(client, api_key, base_url).with_model(model);
            if let Some(dimensions) = config.dimensions {
                embedder = embedder.with_dimensions(dimensions);
            }

            Ok(Arc::new(embedder))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_str() {
        assert_eq!(
            "hashing".parse::<EmbeddingProviderKind>().unwrap(),
            EmbeddingProviderKind::Hashing
        );
        assert_eq!(
            "OpenAI".parse::<EmbeddingProviderKind>().unwrap(),
            EmbeddingProviderKind::OpenAi
        );
        assert!("cohere".parse::<EmbeddingProviderKind>().is_err());
    }

    #[test]
    fn test_provider_display() {
        assert_eq!(EmbeddingProviderKind::Hashing.to_string(), "hashing");
        assert_eq!(EmbeddingProviderKind::OpenAi.to_string(), "openai");
    }

    #[test]
    fn test_config_defaults() {
        let config: EmbeddingConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config.provider, EmbeddingProviderKind::Hashing);
        assert_eq!(config.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.request_timeout_ms, 30_000);
    }

    #[test]
    fn test_create_hashing_embedder() {
        let embedder = create_embedder(&EmbeddingConfig::hashing(64)).unwrap();

        assert_eq!(embedder.name(), "hashing");
        assert_eq!(embedder.dimensions(), Some(64));
    }

    #[test]
    fn test_create_openai_requires_key() {
        let config = EmbeddingConfig::openai("text-embedding-3-small")
            .with_api_key_env("SEMANTIC_CACHE_TEST_MISSING_KEY");

        let result = create_embedder(&config);

        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }
}

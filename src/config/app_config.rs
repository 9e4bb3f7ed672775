use serde::Deserialize;

use crate::domain::DomainError;
use crate::domain::semantic_cache::SemanticCacheConfig;
use crate::infrastructure::embedding::EmbeddingConfig;
use crate::infrastructure::semantic_cache::{IndexBackend, IndexBackendConfig};

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub semantic_cache: SemanticCacheConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub backend: IndexBackendConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Layer `config/default`, `config/local` and `APP__*` environment
    /// variables, later sources winning
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        self.semantic_cache.validate()?;

        if self.embedding.dimensions == Some(0) {
            return Err(DomainError::configuration(
                "embedding.dimensions must be greater than 0",
            ));
        }

        if self.backend.backend == IndexBackend::Redis && self.backend.redis_url.is_none() {
            return Err(DomainError::configuration(
                "backend.redis_url is required for the redis backend",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::semantic_cache::EvictionPolicy;
    use crate::infrastructure::embedding::EmbeddingProviderKind;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.backend.backend, IndexBackend::InMemory);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "logging": {"level": "debug", "format": "json"},
            "semantic_cache": {"min_relevance": 0.92, "eviction_policy": "lfu", "ttl_secs": 3600},
            "embedding": {"provider": "openai", "model": "text-embedding-3-large"}
        }))
        .unwrap();

        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.semantic_cache.min_relevance, 0.92);
        assert_eq!(config.semantic_cache.eviction_policy, EvictionPolicy::Lfu);
        assert_eq!(config.semantic_cache.max_entries, Some(10_000));
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::OpenAi);
        assert_eq!(config.backend.backend, IndexBackend::InMemory);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = AppConfig::default();
        config.semantic_cache.min_relevance = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.backend.backend = IndexBackend::Redis;
        assert!(matches!(
            config.validate(),
            Err(DomainError::Configuration { .. })
        ));

        let mut config = AppConfig::default();
        config.embedding.dimensions = Some(0);
        assert!(config.validate().is_err());
    }
}

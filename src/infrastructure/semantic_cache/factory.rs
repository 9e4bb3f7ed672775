//! Index factory for runtime backend selection

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;
use crate::domain::semantic_cache::{SemanticCacheConfig, SemanticIndex};

use super::in_memory::InMemorySemanticIndex;
use super::redis::{RedisSemanticIndex, RedisSemanticIndexConfig};

/// Supported index backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    /// Process-local index
    #[default]
    InMemory,
    /// Shared index in Redis
    Redis,
}

impl std::fmt::Display for IndexBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexBackend::InMemory => write!(f, "in_memory"),
            IndexBackend::Redis => write!(f, "redis"),
        }
    }
}

impl std::str::FromStr for IndexBackend {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(IndexBackend::InMemory),
            "redis" => Ok(IndexBackend::Redis),
            _ => Err(DomainError::configuration(format!(
                "Unknown index backend: {}. Valid backends: in_memory, redis",
                s
            ))),
        }
    }
}

/// Where the index lives
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexBackendConfig {
    #[serde(default)]
    pub backend: IndexBackend,
    /// Redis URL (required for the Redis backend)
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Key prefix for namespacing
    #[serde(default)]
    pub key_prefix: Option<String>,
}

impl IndexBackendConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            backend: IndexBackend::Redis,
            redis_url: Some(url.into()),
            key_prefix: None,
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }
}

/// Factory for creating index instances
#[derive(Debug, Default)]
pub struct SemanticIndexFactory;

impl SemanticIndexFactory {
    pub fn new() -> Self {
        Self
    }

    /// Creates an index for the backend, bounded by the cache's capacity and
    /// eviction settings
    pub async fn create(
        &self,
        backend: &IndexBackendConfig,
        cache: &SemanticCacheConfig,
    ) -> Result<Arc<dyn SemanticIndex>, DomainError> {
        match backend.backend {
            IndexBackend::InMemory => Ok(Arc::new(InMemorySemanticIndex::with_policy(
                cache.max_entries,
                cache.eviction_policy,
            ))),
            IndexBackend::Redis => {
                let url = backend.redis_url.clone().ok_or_else(|| {
                    DomainError::configuration("Redis URL is required for the Redis backend")
                })?;

                let mut config = RedisSemanticIndexConfig::new(url)
                    .with_max_entries(cache.max_entries)
                    .with_eviction_policy(cache.eviction_policy);

                if let Some(prefix) = &backend.key_prefix {
                    config = config.with_key_prefix(prefix.clone());
                }

                Ok(Arc::new(RedisSemanticIndex::new(config).await?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::semantic_cache::EvictionPolicy;

    #[test]
    fn test_index_backend_from_str() {
        assert_eq!("in_memory".parse::<IndexBackend>().unwrap(), IndexBackend::InMemory);
        assert_eq!("memory".parse::<IndexBackend>().unwrap(), IndexBackend::InMemory);
        assert_eq!("REDIS".parse::<IndexBackend>().unwrap(), IndexBackend::Redis);
        assert!("postgres".parse::<IndexBackend>().is_err());
    }

    #[test]
    fn test_index_backend_display() {
        assert_eq!(IndexBackend::InMemory.to_string(), "in_memory");
        assert_eq!(IndexBackend::Redis.to_string(), "redis");
    }

    #[test]
    fn test_backend_config_deserialize() {
        let config: IndexBackendConfig =
            serde_json::from_str(r#"{"backend": "redis", "redis_url": "redis://cache:6379"}"#)
                .unwrap();

        assert_eq!(config.backend, IndexBackend::Redis);
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
        assert!(config.key_prefix.is_none());
    }

    #[tokio::test]
    async fn test_factory_create_in_memory() {
        let cache = SemanticCacheConfig::default()
            .with_max_entries(5)
            .with_eviction_policy(EvictionPolicy::Lfu);

        let index = SemanticIndexFactory::new()
            .create(&IndexBackendConfig::in_memory(), &cache)
            .await
            .unwrap();

        assert_eq!(index.name(), "in_memory");
        assert_eq!(index.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_factory_create_redis_missing_url() {
        let backend = IndexBackendConfig {
            backend: IndexBackend::Redis,
            ..Default::default()
        };

        let result = SemanticIndexFactory::new()
            .create(&backend, &SemanticCacheConfig::default())
            .await;

        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }
}

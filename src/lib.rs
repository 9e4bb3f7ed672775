//! Semantic Cache
//!
//! Serves previously generated chat responses for conversations that are
//! semantically close to one seen before:
//! - Context-aware keys (prompt plus trailing history, embedded as a vector)
//! - Runtime-adjustable relevance threshold
//! - Bounded in-memory index with LRU/LFU/oldest eviction, or a shared Redis index
//! - JSON snapshot persistence

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use domain::{DomainError, SemanticCacheService};
use infrastructure::embedding::create_embedder;
use infrastructure::semantic_cache::SemanticIndexFactory;
use infrastructure::services::DefaultSemanticCacheService;
use tracing::info;

/// Create an initialized semantic cache with default configuration
pub async fn create_semantic_cache() -> anyhow::Result<DefaultSemanticCacheService> {
    create_semantic_cache_with_config(&AppConfig::default()).await
}

/// Create an initialized semantic cache from application configuration
pub async fn create_semantic_cache_with_config(
    config: &AppConfig,
) -> anyhow::Result<DefaultSemanticCacheService> {
    let service = build_semantic_cache(config).await?;
    service.initialize().await?;

    Ok(service)
}

/// Wire embedder, index and service without initializing
pub async fn build_semantic_cache(
    config: &AppConfig,
) -> Result<DefaultSemanticCacheService, DomainError> {
    config.validate()?;

    let embedder = create_embedder(&config.embedding)?;
    let index = SemanticIndexFactory::new()
        .create(&config.backend, &config.semantic_cache)
        .await?;

    info!(
        embedder = embedder.name(),
        backend = index.name(),
        "Building semantic cache"
    );

    DefaultSemanticCacheService::with_config(index, embedder, config.semantic_cache.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{CacheLookup, CancelSignal, ChatMessage};
    use serde_json::json;

    #[tokio::test]
    async fn test_create_semantic_cache_with_defaults() {
        let service = create_semantic_cache().await.unwrap();

        assert!(service.is_initialized());
        assert_eq!(service.dimensions(), Some(256));
        assert_eq!(service.min_relevance().value(), 0.85);
    }

    #[tokio::test]
    async fn test_end_to_end_with_hashing_embedder() {
        let service = create_semantic_cache().await.unwrap();
        let history = vec![ChatMessage::user("I'm planning a trip to Europe")];

        let lookup = service
            .get_cache_item("What is the capital of France?", &history)
            .await
            .unwrap();
        let CacheLookup::Miss(miss) = lookup else {
            panic!("empty cache should miss");
        };
        service
            .set_cache_item(miss.into_item(json!("Paris")))
            .await
            .unwrap();

        let hit = service
            .get_cache_item("what is the capital of france", &history)
            .await
            .unwrap()
            .into_hit()
            .expect("same words should hit");
        assert_eq!(hit.entry.response(), &json!("Paris"));

        let other = service
            .get_cache_item("How do I bake sourdough bread?", &[])
            .await
            .unwrap();
        assert!(!other.is_hit());

        service
            .cache_response("Recommend a museum", &history, json!("Louvre"), CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(service.stats().await.unwrap().total_entries, 2);
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let mut config = AppConfig::default();
        config.semantic_cache.min_relevance = -1.0;

        let result = build_semantic_cache(&config).await;

        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }
}

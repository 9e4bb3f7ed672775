//! The semantic cache contract

use std::fmt::Debug;

use async_trait::async_trait;

use super::{CacheEntry, CacheLookup, CancelSignal, MinRelevance, NewCacheItem, SemanticCacheStats};
use crate::domain::DomainError;
use crate::domain::chat::ChatMessage;

/// Semantic cache operations shared by every backend
///
/// Lifecycle: `Uninitialized -> Ready` via [`initialize`](Self::initialize),
/// `Ready -> Ready` via [`reset`](Self::reset). Data operations before
/// initialization fail with [`DomainError::NotInitialized`].
#[async_trait]
pub trait SemanticCacheService: Send + Sync + Debug {
    /// Prepare the index; a no-op when already initialized
    async fn initialize(&self) -> Result<(), DomainError>;

    /// Atomically drop every entry, keeping the configuration
    async fn reset(&self) -> Result<(), DomainError>;

    /// Replace the relevance threshold for all subsequent lookups
    fn set_min_relevance_override(&self, min_relevance: f32) -> Result<(), DomainError>;

    /// Current relevance threshold
    fn min_relevance(&self) -> MinRelevance;

    /// Look up a cached response for a prompt asked after `history`
    async fn get_cache_item(
        &self,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Result<CacheLookup, DomainError> {
        self.get_cache_item_cancellable(prompt, history, CancelSignal::never())
            .await
    }

    /// Like [`get_cache_item`](Self::get_cache_item), abandoning the embedder
    /// call when `cancel` fires
    async fn get_cache_item_cancellable(
        &self,
        prompt: &str,
        history: &[ChatMessage],
        cancel: CancelSignal,
    ) -> Result<CacheLookup, DomainError>;

    /// Store a response under its precomputed key vector
    async fn set_cache_item(&self, item: NewCacheItem) -> Result<CacheEntry, DomainError>;

    /// Embed the context and store a response in one step
    async fn cache_response(
        &self,
        prompt: &str,
        history: &[ChatMessage],
        response: serde_json::Value,
        cancel: CancelSignal,
    ) -> Result<CacheEntry, DomainError>;

    /// Invalidate the entry stored for exactly this prompt and history
    async fn remove_cache_item(
        &self,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Result<bool, DomainError>;

    /// Drop entries older than the configured TTL
    async fn purge_expired(&self) -> Result<usize, DomainError>;

    /// Write the current contents to the configured snapshot
    async fn persist(&self) -> Result<(), DomainError>;

    /// Cache statistics
    async fn stats(&self) -> Result<SemanticCacheStats, DomainError>;
}

//! Domain layer - Core cache entities and contracts

pub mod chat;
pub mod embedding;
pub mod error;
pub mod semantic_cache;

pub use chat::{ChatMessage, ConversationContext, HistoryFingerprint, MessageRole};
pub use embedding::{Embedder, cosine_similarity};
pub use error::DomainError;
pub use semantic_cache::{
    CacheEntry, CacheHit, CacheLookup, CacheMiss, CancelHandle, CancelSignal, EvictionPolicy,
    MinRelevance, NewCacheItem, SemanticCacheConfig, SemanticCacheService, SemanticCacheStats,
    SemanticIndex,
};

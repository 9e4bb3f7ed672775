//! Semantic cache domain models and traits
//!
//! Provides vector-based caching that matches semantically similar
//! conversations rather than requiring exact key matches.

mod cancel;
mod config;
mod entry;
mod index;
mod lookup;
mod relevance;
mod service;

pub use cancel::{CancelHandle, CancelSignal};
pub use config::{EvictionPolicy, SemanticCacheConfig};
pub use entry::{CacheEntry, NewCacheItem, entry_id};
pub use index::{
    IndexMatch, IndexQuery, IndexSearch, SemanticCacheStats, SemanticIndex, UpsertOutcome,
};
pub use lookup::{CacheHit, CacheLookup, CacheMiss};
pub use relevance::{MinRelevance, SharedRelevance};
pub use service::SemanticCacheService;

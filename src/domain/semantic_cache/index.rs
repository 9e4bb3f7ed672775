//! Vector index trait and types

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{CacheEntry, MinRelevance};
use crate::domain::DomainError;

/// Parameters of a nearest-neighbour lookup
#[derive(Debug, Clone, Copy)]
pub struct IndexQuery {
    /// Threshold the best match has to clear
    pub min_relevance: MinRelevance,
    /// Entries older than this are skipped
    pub ttl: Option<Duration>,
}

impl IndexQuery {
    pub fn new(min_relevance: MinRelevance) -> Self {
        Self {
            min_relevance,
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }
}

/// The entry served by a lookup
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub entry: CacheEntry,
    pub similarity: f32,
}

/// Outcome of a nearest-neighbour lookup
#[derive(Debug, Clone, Default)]
pub struct IndexSearch {
    /// Best entry, present only when it cleared the threshold
    pub matched: Option<IndexMatch>,
    /// Similarity of the closest live entry regardless of the threshold
    pub best_similarity: Option<f32>,
}

/// Outcome of an insertion
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    /// The entry as stored after the upsert
    pub stored: CacheEntry,
    /// An entry with the same identity already existed
    pub replaced: bool,
    /// Id of the entry evicted to make room
    pub evicted: Option<String>,
}

/// Statistics for the semantic cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemanticCacheStats {
    /// Total number of entries
    pub total_entries: usize,
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Total entries evicted
    pub evictions: u64,
    /// Lookups that failed in the embedder
    pub embedding_failures: u64,
    /// Average similarity of hits
    pub avg_hit_similarity: f32,
}

impl SemanticCacheStats {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f32 {
        let total = self.hits + self.misses;

        if total == 0 {
            return 0.0;
        }

        self.hits as f32 / total as f32
    }
}

/// Storage and similarity search over cache entries
///
/// Every method is atomic with respect to the others: a `clear` racing a
/// `search` or `upsert` is observed either entirely before or entirely after.
#[async_trait]
pub trait SemanticIndex: Send + Sync + Debug {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Make the index ready for vectors of the given dimensionality
    async fn prepare(&self, dimensions: usize) -> Result<(), DomainError>;

    /// Find the most similar live entry and record a hit on it when it clears
    /// the threshold. Ties go to the most recently created entry.
    async fn search(&self, vector: &[f32], query: &IndexQuery)
    -> Result<IndexSearch, DomainError>;

    /// Insert or replace by identity, evicting one entry first if the index
    /// is full and the identity is new
    async fn upsert(&self, entry: CacheEntry) -> Result<UpsertOutcome, DomainError>;

    /// Remove an entry by id
    async fn remove(&self, id: &str) -> Result<bool, DomainError>;

    /// Remove every entry, returning how many were dropped
    async fn clear(&self) -> Result<usize, DomainError>;

    /// Number of stored entries
    async fn len(&self) -> Result<usize, DomainError>;

    /// Copy of every stored entry with its current hit count
    async fn entries(&self) -> Result<Vec<CacheEntry>, DomainError>;

    /// Bulk load previously exported entries, keeping their metadata
    async fn restore(&self, entries: Vec<CacheEntry>) -> Result<usize, DomainError>;

    /// Drop entries older than `ttl`
    async fn purge_stale(&self, ttl: Duration) -> Result<usize, DomainError>;

    /// Evictions performed since creation
    fn evictions(&self) -> u64;
}

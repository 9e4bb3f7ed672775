//! Semantic cache configuration

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::MinRelevance;
use crate::domain::DomainError;

/// Which entry to drop when an insert would exceed capacity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently inserted, updated or hit
    #[default]
    Lru,
    /// Fewest hits, least recently used first among equals
    Lfu,
    /// Earliest created
    Oldest,
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionPolicy::Lru => write!(f, "lru"),
            EvictionPolicy::Lfu => write!(f, "lfu"),
            EvictionPolicy::Oldest => write!(f, "oldest"),
        }
    }
}

impl FromStr for EvictionPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "oldest" | "fifo" => Ok(EvictionPolicy::Oldest),
            _ => Err(DomainError::configuration(format!(
                "Unknown eviction policy: {}. Valid policies: lru, lfu, oldest",
                s
            ))),
        }
    }
}

/// Configuration for semantic caching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticCacheConfig {
    /// Minimum cosine similarity for a cache hit (0.0 to 1.0)
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f32,

    /// Fixed vector dimensionality; resolved from the embedder when unset
    #[serde(default)]
    pub dimensions: Option<usize>,

    /// Maximum number of entries; unbounded when unset
    #[serde(default = "default_max_entries")]
    pub max_entries: Option<usize>,

    /// Eviction policy applied when `max_entries` is reached
    #[serde(default)]
    pub eviction_policy: EvictionPolicy,

    /// Entries older than this are never served
    #[serde(default)]
    pub ttl_secs: Option<u64>,

    /// Number of trailing history messages rendered into the embedded text
    #[serde(default = "default_context_window_messages")]
    pub context_window_messages: usize,

    /// Upper bound on a single embedder call
    #[serde(default = "default_embedding_timeout_ms")]
    pub embedding_timeout_ms: u64,

    /// Probe the embedder during initialization
    #[serde(default = "default_true")]
    pub verify_embedder_on_init: bool,

    /// JSON snapshot file loaded on initialize and written on persist
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

fn default_min_relevance() -> f32 {
    MinRelevance::DEFAULT
}

fn default_max_entries() -> Option<usize> {
    Some(10_000)
}

fn default_context_window_messages() -> usize {
    6
}

fn default_embedding_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

impl Default for SemanticCacheConfig {
    fn default() -> Self {
        Self {
            min_relevance: default_min_relevance(),
            dimensions: None,
            max_entries: default_max_entries(),
            eviction_policy: EvictionPolicy::default(),
            ttl_secs: None,
            context_window_messages: default_context_window_messages(),
            embedding_timeout_ms: default_embedding_timeout_ms(),
            verify_embedder_on_init: default_true(),
            snapshot_path: None,
        }
    }
}

impl SemanticCacheConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Get TTL as Duration
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }

    /// Get the embedding timeout as Duration
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }

    pub fn with_min_relevance(mut self, min_relevance: f32) -> Self {
        self.min_relevance = min_relevance;
        self
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.max_entries = None;
        self
    }

    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Set the entry TTL, rounding sub-second remainders up to whole seconds
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = Some(ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0));
        self
    }

    pub fn with_context_window(mut self, messages: usize) -> Self {
        self.context_window_messages = messages;
        self
    }

    pub fn with_embedding_timeout(mut self, timeout: Duration) -> Self {
        self.embedding_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_verify_embedder(mut self, verify: bool) -> Self {
        self.verify_embedder_on_init = verify;
        self
    }

    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Reject settings that cannot produce a working cache
    pub fn validate(&self) -> Result<(), DomainError> {
        MinRelevance::new(self.min_relevance)
            .map_err(|e| DomainError::configuration(format!("min_relevance: {}", e)))?;

        if self.dimensions == Some(0) {
            return Err(DomainError::configuration("dimensions must be greater than 0"));
        }

        if self.max_entries == Some(0) {
            return Err(DomainError::configuration(
                "max_entries must be greater than 0 (omit it for an unbounded cache)",
            ));
        }

        if self.ttl_secs == Some(0) {
            return Err(DomainError::configuration(
                "ttl_secs must be greater than 0 (omit it to disable expiry)",
            ));
        }

        if self.embedding_timeout_ms == 0 {
            return Err(DomainError::configuration(
                "embedding_timeout_ms must be greater than 0",
            ));
        }

        Ok(())
    }
}

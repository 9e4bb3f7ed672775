//! In-memory semantic index

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::DomainError;
use crate::domain::embedding::{cosine_similarity, validate_vector};
use crate::domain::semantic_cache::{
    CacheEntry, EvictionPolicy, IndexMatch, IndexQuery, IndexSearch, SemanticIndex, UpsertOutcome,
};

const NO_HIT: i64 = i64::MIN;

/// An entry plus the bookkeeping that lookups update under the shared lock
#[derive(Debug)]
struct StoredEntry {
    entry: CacheEntry,
    hits: AtomicU64,
    last_hit_ms: AtomicI64,
    last_access: AtomicU64,
    created_seq: u64,
}

impl StoredEntry {
    fn new(entry: CacheEntry, tick: u64) -> Self {
        let last_hit_ms = entry
            .last_hit_at()
            .map(|t| t.timestamp_millis())
            .unwrap_or(NO_HIT);

        Self {
            hits: AtomicU64::new(entry.hit_count()),
            last_hit_ms: AtomicI64::new(last_hit_ms),
            last_access: AtomicU64::new(tick),
            created_seq: tick,
            entry,
        }
    }

    fn snapshot(&self) -> CacheEntry {
        let last_hit_at = match self.last_hit_ms.load(Ordering::Acquire) {
            NO_HIT => None,
            ms => DateTime::<Utc>::from_timestamp_millis(ms),
        };

        self.entry
            .clone()
            .with_hits(self.hits.load(Ordering::Acquire), last_hit_at)
    }
}

/// In-memory semantic index using linear search
///
/// A single `RwLock` guards the entry map: lookups share it and account hits
/// through atomics, while inserts, evictions and clears take it exclusively
/// for a short, non-suspending critical section.
#[derive(Debug)]
pub struct InMemorySemanticIndex {
    entries: RwLock<HashMap<String, StoredEntry>>,
    max_entries: Option<usize>,
    policy: EvictionPolicy,
    dimensions: AtomicUsize,
    clock: AtomicU64,
    evictions: AtomicU64,
}

impl InMemorySemanticIndex {
    /// Create a new index holding at most `max_entries` entries
    pub fn new(max_entries: usize) -> Self {
        Self::with_policy(Some(max_entries), EvictionPolicy::default())
    }

    /// Create an index without a capacity bound
    pub fn unbounded() -> Self {
        Self::with_policy(None, EvictionPolicy::default())
    }

    pub fn with_policy(max_entries: Option<usize>, policy: EvictionPolicy) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
            policy,
            dimensions: AtomicUsize::new(0),
            clock: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, StoredEntry>>, DomainError> {
        self.entries
            .read()
            .map_err(|e| DomainError::internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, StoredEntry>>, DomainError> {
        self.entries
            .write()
            .map_err(|e| DomainError::internal(format!("Failed to acquire write lock: {}", e)))
    }

    fn check_dimensions(&self, entry: &CacheEntry) -> Result<(), DomainError> {
        match self.dimensions.load(Ordering::Acquire) {
            0 => Ok(()),
            dims => validate_vector(entry.key_vector(), dims),
        }
    }

    /// Pick the entry the eviction policy drops first
    fn select_victim(&self, entries: &HashMap<String, StoredEntry>) -> Option<String> {
        let victim = match self.policy {
            EvictionPolicy::Lru => entries
                .iter()
                .min_by_key(|(_, s)| s.last_access.load(Ordering::Acquire)),
            EvictionPolicy::Lfu => entries.iter().min_by_key(|(_, s)| {
                (
                    s.hits.load(Ordering::Acquire),
                    s.last_access.load(Ordering::Acquire),
                )
            }),
            EvictionPolicy::Oldest => entries.iter().min_by_key(|(_, s)| s.created_seq),
        };

        victim.map(|(id, _)| id.clone())
    }

    /// Insert or replace inside an already held write lock
    fn upsert_locked(
        &self,
        entries: &mut HashMap<String, StoredEntry>,
        entry: CacheEntry,
    ) -> UpsertOutcome {
        let tick = self.tick();

        if let Some(stored) = entries.get_mut(entry.id()) {
            stored.entry.replace_response(entry);
            stored.created_seq = tick;
            stored.last_access.store(tick, Ordering::Release);

            return UpsertOutcome {
                stored: stored.snapshot(),
                replaced: true,
                evicted: None,
            };
        }

        let mut evicted = None;

        if let Some(max) = self.max_entries {
            while entries.len() >= max {
                let Some(victim) = self.select_victim(entries) else {
                    break;
                };

                entries.remove(&victim);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(entry_id = %victim, policy = %self.policy, "Evicted semantic cache entry");
                evicted = Some(victim);
            }
        }

        let stored = entry.clone();
        entries.insert(entry.id().to_string(), StoredEntry::new(entry, tick));

        UpsertOutcome {
            stored,
            replaced: false,
            evicted,
        }
    }
}

#[async_trait]
impl SemanticIndex for InMemorySemanticIndex {
    fn name(&self) -> &'static str {
        "in_memory"
    }

    async fn prepare(&self, dimensions: usize) -> Result<(), DomainError> {
        if dimensions == 0 {
            return Err(DomainError::initialization("dimensions must be greater than 0"));
        }

        self.dimensions.store(dimensions, Ordering::Release);
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        query: &IndexQuery,
    ) -> Result<IndexSearch, DomainError> {
        let entries = self.read()?;
        let now = Utc::now();

        let best = entries
            .values()
            .filter(|stored| match query.ttl {
                Some(ttl) => !stored.entry.is_stale(ttl, now),
                None => true,
            })
            .map(|stored| (stored, cosine_similarity(vector, stored.entry.key_vector())))
            .max_by(|(a, sim_a), (b, sim_b)| {
                sim_a
                    .partial_cmp(sim_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.created_seq.cmp(&b.created_seq))
            });

        let Some((stored, similarity)) = best else {
            return Ok(IndexSearch::default());
        };

        if !query.min_relevance.admits(similarity) {
            return Ok(IndexSearch {
                matched: None,
                best_similarity: Some(similarity),
            });
        }

        stored.hits.fetch_add(1, Ordering::AcqRel);
        stored
            .last_hit_ms
            .store(now.timestamp_millis(), Ordering::Release);
        stored.last_access.store(self.tick(), Ordering::Release);

        Ok(IndexSearch {
            matched: Some(IndexMatch {
                entry: stored.snapshot(),
                similarity,
            }),
            best_similarity: Some(similarity),
        })
    }

    async fn upsert(&self, entry: CacheEntry) -> Result<UpsertOutcome, DomainError> {
        self.check_dimensions(&entry)?;

        let mut entries = self.write()?;
        Ok(self.upsert_locked(&mut entries, entry))
    }

    async fn remove(&self, id: &str) -> Result<bool, DomainError> {
        let mut entries = self.write()?;

        Ok(entries.remove(id).is_some())
    }

    async fn clear(&self) -> Result<usize, DomainError> {
        let mut entries = self.write()?;
        let dropped = entries.len();

        *entries = HashMap::new();

        Ok(dropped)
    }

    async fn len(&self) -> Result<usize, DomainError> {
        Ok(self.read()?.len())
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>, DomainError> {
        let entries = self.read()?;

        let mut stored: Vec<&StoredEntry> = entries.values().collect();
        stored.sort_by_key(|s| s.created_seq);

        Ok(stored.into_iter().map(StoredEntry::snapshot).collect())
    }

    async fn restore(&self, mut restored: Vec<CacheEntry>) -> Result<usize, DomainError> {
        for entry in &restored {
            self.check_dimensions(entry)?;
        }

        restored.sort_by_key(|e| e.created_at());
        let count = restored.len();

        let mut entries = self.write()?;

        for entry in restored {
            let id = entry.id().to_string();
            let hits = entry.hit_count();
            let last_hit_at = entry.last_hit_at();

            self.upsert_locked(&mut entries, entry);

            // Restored metadata wins over whatever was there before
            if let Some(stored) = entries.get(&id) {
                stored.hits.store(hits, Ordering::Release);
                stored.last_hit_ms.store(
                    last_hit_at.map(|t| t.timestamp_millis()).unwrap_or(NO_HIT),
                    Ordering::Release,
                );
            }
        }

        Ok(count)
    }

    async fn purge_stale(&self, ttl: Duration) -> Result<usize, DomainError> {
        let mut entries = self.write()?;
        let now = Utc::now();
        let before = entries.len();

        entries.retain(|_, stored| !stored.entry.is_stale(ttl, now));

        Ok(before - entries.len())
    }

    fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

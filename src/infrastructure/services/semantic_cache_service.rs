//! Semantic cache service
//!
//! Serves cached chat responses for conversations that are semantically close
//! to one seen before. Lookups embed the conversation context, search the
//! index by cosine similarity and gate the best match on the relevance
//! threshold. Embedding always happens before the index is touched, so no
//! lock is held across the embedder call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::DomainError;
use crate::domain::chat::{ChatMessage, ConversationContext, HistoryFingerprint};
use crate::domain::embedding::{Embedder, validate_vector};
use crate::domain::semantic_cache::{
    CacheEntry, CacheHit, CacheLookup, CacheMiss, CancelSignal, IndexQuery, MinRelevance,
    NewCacheItem, SemanticCacheConfig, SemanticCacheService, SemanticCacheStats, SemanticIndex,
    SharedRelevance, entry_id,
};
use crate::infrastructure::metrics::{self, LookupOutcome};
use crate::infrastructure::semantic_cache::{CacheSnapshot, SnapshotStore};

const PROBE_TEXT: &str = "user: semantic cache embedder probe";

/// Lookup counters; reset together with the entries
#[derive(Debug, Default)]
struct LookupCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    embedding_failures: AtomicU64,
    /// Sum of hit similarities in millionths
    hit_similarity_micros: AtomicU64,
}

impl LookupCounters {
    fn record_hit(&self, similarity: f32) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.hit_similarity_micros.fetch_add(
            (similarity.max(0.0) as f64 * 1_000_000.0).round() as u64,
            Ordering::Relaxed,
        );
    }

    fn average_hit_similarity(&self) -> f32 {
        let hits = self.hits.load(Ordering::Relaxed);

        if hits == 0 {
            return 0.0;
        }

        (self.hit_similarity_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0 / hits as f64)
            as f32
    }

    fn clear(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.embedding_failures.store(0, Ordering::Relaxed);
        self.hit_similarity_micros.store(0, Ordering::Relaxed);
    }
}

/// Semantic cache over a pluggable index and embedder
#[derive(Debug)]
pub struct DefaultSemanticCacheService {
    index: Arc<dyn SemanticIndex>,
    embedder: Arc<dyn Embedder>,
    config: SemanticCacheConfig,
    min_relevance: SharedRelevance,
    dimensions: OnceLock<usize>,
    init_lock: Mutex<()>,
    snapshot: Option<SnapshotStore>,
    counters: LookupCounters,
}

impl DefaultSemanticCacheService {
    /// Create a service with default configuration
    pub fn new(
        index: Arc<dyn SemanticIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, DomainError> {
        Self::with_config(index, embedder, SemanticCacheConfig::default())
    }

    /// Create a service with custom configuration
    pub fn with_config(
        index: Arc<dyn SemanticIndex>,
        embedder: Arc<dyn Embedder>,
        config: SemanticCacheConfig,
    ) -> Result<Self, DomainError> {
        config.validate()?;
        let min_relevance = MinRelevance::new(config.min_relevance)?;

        Ok(Self {
            index,
            embedder,
            min_relevance: SharedRelevance::new(min_relevance),
            dimensions: OnceLock::new(),
            init_lock: Mutex::new(()),
            snapshot: config.snapshot_path.clone().map(SnapshotStore::new),
            counters: LookupCounters::default(),
            config,
        })
    }

    pub fn config(&self) -> &SemanticCacheConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.dimensions.get().is_some()
    }

    /// Vector dimensionality, known once initialized
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions.get().copied()
    }

    fn ready_dimensions(&self) -> Result<usize, DomainError> {
        self.dimensions
            .get()
            .copied()
            .ok_or(DomainError::NotInitialized)
    }

    /// Work out the vector size, probing the embedder when configured to
    async fn resolve_dimensions(&self) -> Result<usize, DomainError> {
        let advertised = self.config.dimensions.or_else(|| self.embedder.dimensions());

        if !self.config.verify_embedder_on_init {
            return advertised.ok_or_else(|| {
                DomainError::initialization(
                    "vector dimensions are unknown: set dimensions or enable verify_embedder_on_init",
                )
            });
        }

        let probe = self
            .embed(PROBE_TEXT, CancelSignal::never())
            .await
            .map_err(|e| DomainError::initialization(format!("embedder probe failed: {}", e)))?;

        if probe.is_empty() {
            return Err(DomainError::initialization("embedder returned an empty vector"));
        }

        match advertised {
            Some(expected) if expected != probe.len() => Err(DomainError::initialization(format!(
                "embedder '{}' produced {} dimensions, expected {}",
                self.embedder.name(),
                probe.len(),
                expected
            ))),
            _ => Ok(probe.len()),
        }
    }

    async fn load_snapshot(
        &self,
        store: &SnapshotStore,
        dimensions: usize,
    ) -> Result<(), DomainError> {
        let Some(snapshot) = store
            .load()
            .await
            .map_err(|e| DomainError::initialization(format!("failed to load snapshot: {}", e)))?
        else {
            debug!(path = %store.path().display(), "No semantic cache snapshot to restore");
            return Ok(());
        };

        if snapshot.dimensions != dimensions {
            return Err(DomainError::initialization(format!(
                "snapshot {} holds {}-dimensional vectors, embedder produces {}",
                store.path().display(),
                snapshot.dimensions,
                dimensions
            )));
        }

        let persisted = MinRelevance::new(snapshot.min_relevance)
            .map_err(|e| DomainError::initialization(format!("snapshot min_relevance: {}", e)))?;
        if !self.min_relevance.restore(persisted) {
            debug!(
                %persisted,
                current = %self.min_relevance.load(),
                "Keeping overridden relevance threshold over snapshot value"
            );
        }

        let restored = self
            .index
            .restore(snapshot.entries)
            .await
            .map_err(|e| DomainError::initialization(format!("failed to restore snapshot: {}", e)))?;

        info!(
            path = %store.path().display(),
            entries = restored,
            min_relevance = %self.min_relevance.load(),
            "Restored semantic cache snapshot"
        );

        Ok(())
    }

    /// Call the embedder, bounded by the configured timeout and `cancel`
    async fn embed(&self, text: &str, mut cancel: CancelSignal) -> Result<Vec<f32>, DomainError> {
        if cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }

        let provider = self.embedder.name();
        let timeout = self.config.embedding_timeout();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DomainError::Cancelled),
            result = tokio::time::timeout(timeout, self.embedder.embed(text)) => match result {
                Ok(Ok(vector)) => Ok(vector),
                Ok(Err(e @ DomainError::Embedding { .. })) => Err(e),
                Ok(Err(DomainError::Cancelled)) => Err(DomainError::Cancelled),
                Ok(Err(e)) => Err(DomainError::embedding(provider, e.to_string())),
                Err(_) => Err(DomainError::embedding(
                    provider,
                    format!("timed out after {}ms", timeout.as_millis()),
                )),
            },
        }
    }

    /// Embed a conversation context and check the vector against the index
    async fn embed_context(
        &self,
        prompt: &str,
        history: &[ChatMessage],
        dimensions: usize,
        cancel: CancelSignal,
    ) -> Result<Vec<f32>, DomainError> {
        let text = ConversationContext::new(prompt, history, self.config.context_window_messages)
            .render();

        let vector = match self.embed(&text, cancel).await {
            Ok(vector) => vector,
            Err(DomainError::Cancelled) => return Err(DomainError::Cancelled),
            Err(e) => {
                self.counters.embedding_failures.fetch_add(1, Ordering::Relaxed);
                metrics::record_embedding_failure(self.embedder.name());
                warn!(
                    provider = self.embedder.name(),
                    error = %e,
                    "Failed to embed conversation context"
                );
                return Err(e);
            }
        };

        match validate_vector(&vector, dimensions) {
            Ok(()) => Ok(vector),
            Err(DomainError::InvalidArgument { message }) => {
                Err(DomainError::embedding(self.embedder.name(), message))
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh_entry_gauge(&self) {
        if let Ok(entries) = self.index.len().await {
            metrics::set_entry_count(self.index.name(), entries);
        }
    }
}

#[async_trait]
impl SemanticCacheService for DefaultSemanticCacheService {
    async fn initialize(&self) -> Result<(), DomainError> {
        let _guard = self.init_lock.lock().await;

        if self.is_initialized() {
            debug!("Semantic cache already initialized");
            return Ok(());
        }

        let dimensions = self.resolve_dimensions().await?;

        self.index.prepare(dimensions).await.map_err(|e| {
            DomainError::initialization(format!(
                "failed to prepare {} index: {}",
                self.index.name(),
                e
            ))
        })?;

        if let Some(store) = &self.snapshot {
            self.load_snapshot(store, dimensions).await?;
        }

        self.dimensions
            .set(dimensions)
            .map_err(|_| DomainError::internal("semantic cache initialized twice"))?;

        self.refresh_entry_gauge().await;

        info!(
            backend = self.index.name(),
            embedder = self.embedder.name(),
            dimensions,
            min_relevance = %self.min_relevance.load(),
            "Semantic cache initialized"
        );

        Ok(())
    }

    async fn reset(&self) -> Result<(), DomainError> {
        let dimensions = self.ready_dimensions()?;

        let dropped = self.index.clear().await?;
        self.counters.clear();

        if let Some(store) = &self.snapshot {
            store
                .save(&CacheSnapshot::new(
                    dimensions,
                    self.min_relevance.load().value(),
                    Vec::new(),
                ))
                .await?;
        }

        metrics::record_reset(self.index.name());
        metrics::set_entry_count(self.index.name(), 0);
        info!(dropped, "Semantic cache reset");

        Ok(())
    }

    fn set_min_relevance_override(&self, min_relevance: f32) -> Result<(), DomainError> {
        let min_relevance = MinRelevance::new(min_relevance)?;
        let previous = self.min_relevance.load();

        self.min_relevance.set_override(min_relevance);
        info!(%previous, current = %min_relevance, "Semantic cache relevance threshold overridden");

        Ok(())
    }

    fn min_relevance(&self) -> MinRelevance {
        self.min_relevance.load()
    }

    async fn get_cache_item_cancellable(
        &self,
        prompt: &str,
        history: &[ChatMessage],
        cancel: CancelSignal,
    ) -> Result<CacheLookup, DomainError> {
        let dimensions = self.ready_dimensions()?;
        let backend = self.index.name();

        let vector = self
            .embed_context(prompt, history, dimensions, cancel)
            .await
            .inspect_err(|_| metrics::record_lookup(backend, LookupOutcome::Error, None))?;

        let query = IndexQuery::new(self.min_relevance.load()).with_ttl(self.config.ttl());
        let search = self.index.search(&vector, &query).await?;

        match search.matched {
            Some(matched) => {
                self.counters.record_hit(matched.similarity);
                metrics::record_lookup(backend, LookupOutcome::Hit, Some(matched.similarity));
                debug!(
                    entry_id = matched.entry.id(),
                    similarity = matched.similarity,
                    hit_count = matched.entry.hit_count(),
                    "Semantic cache hit"
                );

                Ok(CacheLookup::Hit(CacheHit {
                    entry: matched.entry,
                    similarity: matched.similarity,
                }))
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                metrics::record_lookup(backend, LookupOutcome::Miss, None);
                debug!(
                    best_similarity = ?search.best_similarity,
                    min_relevance = %query.min_relevance,
                    "Semantic cache miss"
                );

                Ok(CacheLookup::Miss(CacheMiss {
                    prompt: prompt.to_string(),
                    history_fingerprint: HistoryFingerprint::of(history),
                    key_vector: vector,
                    best_similarity: search.best_similarity,
                }))
            }
        }
    }

    async fn set_cache_item(&self, item: NewCacheItem) -> Result<CacheEntry, DomainError> {
        let dimensions = self.ready_dimensions()?;
        validate_vector(item.key_vector(), dimensions)?;

        let outcome = self.index.upsert(CacheEntry::from_item(item)).await?;

        if let Some(ref evicted) = outcome.evicted {
            metrics::record_eviction(self.index.name());
            warn!(
                entry_id = %evicted,
                policy = %self.config.eviction_policy,
                "Semantic cache full, evicted entry"
            );
        }

        debug!(
            entry_id = outcome.stored.id(),
            replaced = outcome.replaced,
            "Stored semantic cache entry"
        );
        self.refresh_entry_gauge().await;

        Ok(outcome.stored)
    }

    async fn cache_response(
        &self,
        prompt: &str,
        history: &[ChatMessage],
        response: serde_json::Value,
        cancel: CancelSignal,
    ) -> Result<CacheEntry, DomainError> {
        let dimensions = self.ready_dimensions()?;
        let vector = self
            .embed_context(prompt, history, dimensions, cancel)
            .await?;

        self.set_cache_item(NewCacheItem::new(prompt, history, vector, response))
            .await
    }

    async fn remove_cache_item(
        &self,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Result<bool, DomainError> {
        self.ready_dimensions()?;

        let id = entry_id(prompt, &HistoryFingerprint::of(history));
        let removed = self.index.remove(&id).await?;

        if removed {
            debug!(entry_id = %id, "Removed semantic cache entry");
            self.refresh_entry_gauge().await;
        }

        Ok(removed)
    }

    async fn purge_expired(&self) -> Result<usize, DomainError> {
        self.ready_dimensions()?;

        let Some(ttl) = self.config.ttl() else {
            return Ok(0);
        };

        let purged = self.index.purge_stale(ttl).await?;

        if purged > 0 {
            info!(purged, "Purged expired semantic cache entries");
            self.refresh_entry_gauge().await;
        }

        Ok(purged)
    }

    async fn persist(&self) -> Result<(), DomainError> {
        let dimensions = self.ready_dimensions()?;

        let store = self
            .snapshot
            .as_ref()
            .ok_or_else(|| DomainError::configuration("no snapshot_path configured"))?;

        let entries = self.index.entries().await?;
        store
            .save(&CacheSnapshot::new(
                dimensions,
                self.min_relevance.load().value(),
                entries,
            ))
            .await
    }

    async fn stats(&self) -> Result<SemanticCacheStats, DomainError> {
        Ok(SemanticCacheStats {
            total_entries: self.index.len().await?,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.index.evictions(),
            embedding_failures: self.counters.embedding_failures.load(Ordering::Relaxed),
            avg_hit_similarity: self.counters.average_hit_similarity(),
        })
    }
}

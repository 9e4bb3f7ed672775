//! Redis-backed semantic index
//!
//! Entries live in Redis so several processes can share one cache. Similarity
//! is computed client-side over a consistent snapshot; every mutation (upsert
//! with eviction, hit accounting, removal, reset) runs as a single Lua script
//! or MULTI transaction so it is atomic on the server.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use tracing::{debug, warn};

use crate::domain::DomainError;
use crate::domain::embedding::cosine_similarity;
use crate::domain::semantic_cache::{
    CacheEntry, EvictionPolicy, IndexMatch, IndexQuery, IndexSearch, SemanticIndex, UpsertOutcome,
};

const UPSERT_SCRIPT: &str = r#"
local entries, vectors, hits, lasthit, recency, created, clock =
    KEYS[1], KEYS[2], KEYS[3], KEYS[4], KEYS[5], KEYS[6], KEYS[7]
local id, json, vector, max, policy = ARGV[1], ARGV[2], ARGV[3], tonumber(ARGV[4]), ARGV[5]

local tick = redis.call('INCR', clock)
local existed = redis.call('HEXISTS', entries, id) == 1
local evicted = ''

if not existed and max > 0 then
    while redis.call('HLEN', entries) >= max do
        local victim = nil
        if policy == 'oldest' then
            victim = redis.call('ZRANGE', created, 0, 0)[1]
        elseif policy == 'lfu' then
            local best_hits, best_tick = nil, nil
            local all = redis.call('HGETALL', hits)
            for i = 1, #all, 2 do
                local h = tonumber(all[i + 1])
                local t = tonumber(redis.call('ZSCORE', recency, all[i]) or 0)
                if best_hits == nil or h < best_hits or (h == best_hits and t < best_tick) then
                    victim, best_hits, best_tick = all[i], h, t
                end
            end
        else
            victim = redis.call('ZRANGE', recency, 0, 0)[1]
        end
        if victim == nil then break end
        redis.call('HDEL', entries, victim)
        redis.call('HDEL', vectors, victim)
        redis.call('HDEL', hits, victim)
        redis.call('HDEL', lasthit, victim)
        redis.call('ZREM', recency, victim)
        redis.call('ZREM', created, victim)
        evicted = victim
    end
end

redis.call('HSET', entries, id, json)
redis.call('HSETNX', vectors, id, vector)
redis.call('HSETNX', hits, id, 0)
redis.call('ZADD', recency, tick, id)
redis.call('ZADD', created, tick, id)

local stored_vector = redis.call('HGET', vectors, id)
local hit_count = redis.call('HGET', hits, id) or '0'
local last_hit = redis.call('HGET', lasthit, id) or ''

if existed then return {1, evicted, stored_vector, hit_count, last_hit} end
return {0, evicted, stored_vector, hit_count, last_hit}
"#;

const RECORD_HIT_SCRIPT: &str = r#"
local entries, hits, lasthit, recency, clock = KEYS[1], KEYS[2], KEYS[3], KEYS[4], KEYS[5]
local id, now = ARGV[1], ARGV[2]

if redis.call('HEXISTS', entries, id) == 0 then
    return -1
end

local tick = redis.call('INCR', clock)
local count = redis.call('HINCRBY', hits, id, 1)
redis.call('HSET', lasthit, id, now)
redis.call('ZADD', recency, tick, id)
return count
"#;

/// `{replaced, evicted id, stored vector, hit count, last hit millis}`
type UpsertReply = (i64, String, String, u64, String);

/// Configuration for the Redis semantic index
#[derive(Debug, Clone)]
pub struct RedisSemanticIndexConfig {
    /// Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub url: String,
    /// Key prefix for namespacing
    pub key_prefix: String,
    /// Maximum number of entries; unbounded when unset
    pub max_entries: Option<usize>,
    /// Policy used when `max_entries` is reached
    pub eviction_policy: EvictionPolicy,
}

impl Default for RedisSemanticIndexConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "semantic-cache".to_string(),
            max_entries: Some(10_000),
            eviction_policy: EvictionPolicy::default(),
        }
    }
}

impl RedisSemanticIndexConfig {
    /// Creates a new configuration with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sets the key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }
}

/// Names of the Redis keys under one prefix
#[derive(Debug, Clone)]
struct IndexKeys {
    entries: String,
    vectors: String,
    hits: String,
    lasthit: String,
    recency: String,
    created: String,
    clock: String,
    meta: String,
}

impl IndexKeys {
    fn new(prefix: &str) -> Self {
        let key = |suffix: &str| format!("{}:{}", prefix, suffix);

        Self {
            entries: key("entries"),
            vectors: key("vectors"),
            hits: key("hits"),
            lasthit: key("lasthit"),
            recency: key("recency"),
            created: key("created"),
            clock: key("clock"),
            meta: key("meta"),
        }
    }

    /// Keys dropped by a reset; the clock and metadata survive
    fn data_keys(&self) -> [&str; 6] {
        [
            &self.entries,
            &self.vectors,
            &self.hits,
            &self.lasthit,
            &self.recency,
            &self.created,
        ]
    }
}

/// An entry read back from Redis with its creation order
struct LoadedEntry {
    entry: CacheEntry,
    created_seq: f64,
}

/// Redis semantic index
///
/// Writes are atomic server-side scripts, but similarity search is a linear
/// scan done client-side: every lookup transfers all entries, vectors and hit
/// counts in one MULTI. Cost per lookup is O(entries) in network traffic and
/// decoding, so keep `max_entries` bounded; the 10 000 default is near the
/// practical limit for interactive lookups. Larger shared caches
/// need a server-side vector index (RediSearch KNN) instead.
pub struct RedisSemanticIndex {
    connection: ConnectionManager,
    config: RedisSemanticIndexConfig,
    keys: IndexKeys,
    upsert_script: Script,
    record_hit_script: Script,
    evictions: AtomicU64,
}

impl fmt::Debug for RedisSemanticIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisSemanticIndex")
            .field("config", &self.config)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisSemanticIndex {
    /// Creates a new Redis index connection
    pub async fn new(config: RedisSemanticIndexConfig) -> Result<Self, DomainError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| DomainError::backend(format!("Failed to create Redis client: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| DomainError::backend(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            connection,
            keys: IndexKeys::new(&config.key_prefix),
            config,
            upsert_script: Script::new(UPSERT_SCRIPT),
            record_hit_script: Script::new(RECORD_HIT_SCRIPT),
            evictions: AtomicU64::new(0),
        })
    }

    /// Read every entry in one MULTI so the view is consistent
    async fn load_all(&self) -> Result<Vec<LoadedEntry>, DomainError> {
        let mut conn = self.connection.clone();

        let (entries, vectors, hits, lasthit, created): (
            HashMap<String, String>,
            HashMap<String, String>,
            HashMap<String, u64>,
            HashMap<String, i64>,
            Vec<(String, f64)>,
        ) = redis::pipe()
            .atomic()
            .hgetall(&self.keys.entries)
            .hgetall(&self.keys.vectors)
            .hgetall(&self.keys.hits)
            .hgetall(&self.keys.lasthit)
            .zrange_withscores(&self.keys.created, 0, -1)
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::backend(format!("Failed to load entries: {}", e)))?;

        let created: HashMap<String, f64> = created.into_iter().collect();
        let mut loaded = Vec::with_capacity(entries.len());

        for (id, json) in entries {
            let entry: CacheEntry = match serde_json::from_str(&json) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(entry_id = %id, error = %e, "Skipping undecodable cache entry");
                    continue;
                }
            };

            let entry = match vectors.get(&id).map(|v| serde_json::from_str::<Vec<f32>>(v)) {
                Some(Ok(vector)) => entry.with_key_vector(vector),
                _ => entry,
            };

            let last_hit_at = lasthit
                .get(&id)
                .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(*ms));

            loaded.push(LoadedEntry {
                entry: entry.with_hits(hits.get(&id).copied().unwrap_or(0), last_hit_at),
                created_seq: created.get(&id).copied().unwrap_or(0.0),
            });
        }

        loaded.sort_by(|a, b| {
            a.created_seq
                .partial_cmp(&b.created_seq)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(loaded)
    }

    async fn record_hit(&self, id: &str, now: DateTime<Utc>) -> Result<Option<u64>, DomainError> {
        let mut conn = self.connection.clone();

        let count: i64 = self
            .record_hit_script
            .key(&self.keys.entries)
            .key(&self.keys.hits)
            .key(&self.keys.lasthit)
            .key(&self.keys.recency)
            .key(&self.keys.clock)
            .arg(id)
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| DomainError::backend(format!("Failed to record hit: {}", e)))?;

        Ok(u64::try_from(count).ok())
    }

    async fn upsert_raw(&self, entry: &CacheEntry) -> Result<UpsertOutcome, DomainError> {
        let json = serde_json::to_string(entry)
            .map_err(|e| DomainError::internal(format!("Failed to serialize entry: {}", e)))?;
        let vector = serde_json::to_string(entry.key_vector())
            .map_err(|e| DomainError::internal(format!("Failed to serialize vector: {}", e)))?;

        let mut conn = self.connection.clone();

        let (replaced, evicted, stored_vector, hits, last_hit): UpsertReply = self
            .upsert_script
            .key(&self.keys.entries)
            .key(&self.keys.vectors)
            .key(&self.keys.hits)
            .key(&self.keys.lasthit)
            .key(&self.keys.recency)
            .key(&self.keys.created)
            .key(&self.keys.clock)
            .arg(entry.id())
            .arg(json)
            .arg(vector)
            .arg(self.config.max_entries.unwrap_or(0))
            .arg(self.config.eviction_policy.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| DomainError::backend(format!("Failed to store entry: {}", e)))?;

        let evicted = (!evicted.is_empty()).then_some(evicted);

        if let Some(ref victim) = evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(entry_id = %victim, "Evicted semantic cache entry from Redis");
        }

        let mut stored = entry.clone().with_hits(
            hits,
            last_hit
                .parse::<i64>()
                .ok()
                .and_then(DateTime::<Utc>::from_timestamp_millis),
        );
        if let Ok(vector) = serde_json::from_str::<Vec<f32>>(&stored_vector) {
            stored = stored.with_key_vector(vector);
        }

        Ok(UpsertOutcome {
            stored,
            replaced: replaced == 1,
            evicted,
        })
    }

    async fn remove_many(&self, ids: &[String]) -> Result<usize, DomainError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection.clone();

        let (removed,): (usize,) = redis::pipe()
            .atomic()
            .hdel(&self.keys.entries, ids)
            .hdel(&self.keys.vectors, ids)
            .ignore()
            .hdel(&self.keys.hits, ids)
            .ignore()
            .hdel(&self.keys.lasthit, ids)
            .ignore()
            .zrem(&self.keys.recency, ids)
            .ignore()
            .zrem(&self.keys.created, ids)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::backend(format!("Failed to remove entries: {}", e)))?;

        Ok(removed)
    }
}

#[async_trait]
impl SemanticIndex for RedisSemanticIndex {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn prepare(&self, dimensions: usize) -> Result<(), DomainError> {
        let mut conn = self.connection.clone();

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::backend(format!("Redis is unreachable: {}", e)))?;

        let (stored,): (usize,) = redis::pipe()
            .atomic()
            .hset_nx(&self.keys.meta, "dimensions", dimensions)
            .ignore()
            .hget(&self.keys.meta, "dimensions")
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::backend(format!("Failed to read index metadata: {}", e)))?;

        if stored != dimensions {
            return Err(DomainError::dimension_mismatch(stored, dimensions));
        }

        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        query: &IndexQuery,
    ) -> Result<IndexSearch, DomainError> {
        let now = Utc::now();
        let loaded = self.load_all().await?;

        let best = loaded
            .into_iter()
            .filter(|l| match query.ttl {
                Some(ttl) => !l.entry.is_stale(ttl, now),
                None => true,
            })
            .map(|l| {
                let similarity = cosine_similarity(vector, l.entry.key_vector());
                (l, similarity)
            })
            .max_by(|(a, sim_a), (b, sim_b)| {
                sim_a
                    .partial_cmp(sim_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(
                        a.created_seq
                            .partial_cmp(&b.created_seq)
                            .unwrap_or(std::cmp::Ordering::Equal),
                    )
            });

        let Some((loaded, similarity)) = best else {
            return Ok(IndexSearch::default());
        };

        if !query.min_relevance.admits(similarity) {
            return Ok(IndexSearch {
                matched: None,
                best_similarity: Some(similarity),
            });
        }

        let entry = loaded.entry;
        // A concurrent reset may have removed the entry; the lookup still
        // completes against the snapshot it read
        let hits = self
            .record_hit(entry.id(), now)
            .await?
            .unwrap_or(entry.hit_count() + 1);

        Ok(IndexSearch {
            matched: Some(IndexMatch {
                entry: entry.with_hits(hits, Some(now)),
                similarity,
            }),
            best_similarity: Some(similarity),
        })
    }

    async fn upsert(&self, entry: CacheEntry) -> Result<UpsertOutcome, DomainError> {
        self.upsert_raw(&entry).await
    }

    async fn remove(&self, id: &str) -> Result<bool, DomainError> {
        Ok(self.remove_many(&[id.to_string()]).await? > 0)
    }

    async fn clear(&self) -> Result<usize, DomainError> {
        let mut conn = self.connection.clone();

        let (dropped,): (usize,) = redis::pipe()
            .atomic()
            .hlen(&self.keys.entries)
            .del(&self.keys.data_keys()[..])
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::backend(format!("Failed to clear index: {}", e)))?;

        Ok(dropped)
    }

    async fn len(&self) -> Result<usize, DomainError> {
        let mut conn = self.connection.clone();

        redis::cmd("HLEN")
            .arg(&self.keys.entries)
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::backend(format!("Failed to count entries: {}", e)))
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>, DomainError> {
        Ok(self.load_all().await?.into_iter().map(|l| l.entry).collect())
    }

    async fn restore(&self, mut entries: Vec<CacheEntry>) -> Result<usize, DomainError> {
        entries.sort_by_key(|e| e.created_at());
        let count = entries.len();

        for entry in entries {
            self.upsert_raw(&entry).await?;

            let mut conn = self.connection.clone();
            let mut pipe = redis::pipe();
            pipe.atomic()
                .hset(&self.keys.hits, entry.id(), entry.hit_count())
                .ignore();

            if let Some(last_hit_at) = entry.last_hit_at() {
                pipe.hset(&self.keys.lasthit, entry.id(), last_hit_at.timestamp_millis())
                    .ignore();
            }

            pipe.query_async::<()>(&mut conn)
                .await
                .map_err(|e| DomainError::backend(format!("Failed to restore entry: {}", e)))?;
        }

        Ok(count)
    }

    async fn purge_stale(&self, ttl: Duration) -> Result<usize, DomainError> {
        let now = Utc::now();

        let stale: Vec<String> = self
            .load_all()
            .await?
            .into_iter()
            .filter(|l| l.entry.is_stale(ttl, now))
            .map(|l| l.entry.id().to_string())
            .collect();

        self.remove_many(&stale).await
    }

    fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

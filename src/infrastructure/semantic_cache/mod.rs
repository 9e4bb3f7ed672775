//! Semantic index implementations and snapshot persistence

mod factory;
mod in_memory;
mod redis;
mod snapshot;

pub use factory::{IndexBackend, IndexBackendConfig, SemanticIndexFactory};
pub use in_memory::InMemorySemanticIndex;
pub use redis::{RedisSemanticIndex, RedisSemanticIndexConfig};
pub use snapshot::{CacheSnapshot, SNAPSHOT_VERSION, SnapshotStore};

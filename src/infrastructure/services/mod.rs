//! Infrastructure services

mod semantic_cache_service;

pub use semantic_cache_service::DefaultSemanticCacheService;

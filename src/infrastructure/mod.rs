//! Infrastructure layer - Index backends, embedders and the cache service

pub mod embedding;
pub mod logging;
pub mod metrics;
pub mod semantic_cache;
pub mod services;

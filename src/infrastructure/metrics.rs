//! Semantic cache metrics
//!
//! Emitted through the `metrics` facade; the host process installs whichever
//! recorder it exports with. Without a recorder every call is a no-op.

use metrics::{counter, gauge, histogram};

/// Label value for the lookup outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    Hit,
    Miss,
    Error,
}

impl LookupOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupOutcome::Hit => "hit",
            LookupOutcome::Miss => "miss",
            LookupOutcome::Error => "error",
        }
    }
}

/// Record a lookup and, for hits, the similarity it was served at
pub fn record_lookup(backend: &'static str, outcome: LookupOutcome, similarity: Option<f32>) {
    let labels = [("backend", backend), ("outcome", outcome.as_str())];

    counter!("semantic_cache_lookups_total", &labels).increment(1);

    if let (LookupOutcome::Hit, Some(similarity)) = (outcome, similarity) {
        histogram!("semantic_cache_hit_similarity", "backend" => backend)
            .record(similarity as f64);
    }
}

pub fn record_eviction(backend: &'static str) {
    counter!("semantic_cache_evictions_total", "backend" => backend).increment(1);
}

pub fn record_embedding_failure(provider: &'static str) {
    counter!("semantic_cache_embedding_failures_total", "provider" => provider).increment(1);
}

pub fn record_reset(backend: &'static str) {
    counter!("semantic_cache_resets_total", "backend" => backend).increment(1);
}

pub fn set_entry_count(backend: &'static str, entries: usize) {
    gauge!("semantic_cache_entries", "backend" => backend).set(entries as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_outcome_labels() {
        assert_eq!(LookupOutcome::Hit.as_str(), "hit");
        assert_eq!(LookupOutcome::Miss.as_str(), "miss");
        assert_eq!(LookupOutcome::Error.as_str(), "error");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_lookup("in_memory", LookupOutcome::Hit, Some(0.93));
        record_lookup("in_memory", LookupOutcome::Miss, None);
        record_eviction("in_memory");
        record_embedding_failure("openai");
        record_reset("in_memory");
        set_entry_count("in_memory", 3);
    }
}

//! Lookup outcomes

use serde::Serialize;

use super::{CacheEntry, NewCacheItem};
use crate::domain::chat::HistoryFingerprint;

/// A stored entry that cleared the relevance threshold
#[derive(Debug, Clone, Serialize)]
pub struct CacheHit {
    /// Snapshot of the entry, hit count already incremented
    pub entry: CacheEntry,
    /// Cosine similarity between the query and the entry
    pub similarity: f32,
}

/// No stored entry was relevant enough
///
/// Carries the computed key so the caller can store a fresh response without
/// embedding the same context twice.
#[derive(Debug, Clone, Serialize)]
pub struct CacheMiss {
    pub prompt: String,
    pub history_fingerprint: HistoryFingerprint,
    pub key_vector: Vec<f32>,
    /// Similarity of the closest entry, if the index was not empty
    pub best_similarity: Option<f32>,
}

impl CacheMiss {
    /// Turn the miss into an insertion once the caller has a response
    pub fn into_item(self, response: serde_json::Value) -> NewCacheItem {
        NewCacheItem::with_fingerprint(
            self.prompt,
            self.history_fingerprint,
            self.key_vector,
            response,
        )
    }
}

/// Result of a cache lookup
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum CacheLookup {
    Hit(CacheHit),
    Miss(CacheMiss),
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }

    pub fn hit(&self) -> Option<&CacheHit> {
        match self {
            CacheLookup::Hit(hit) => Some(hit),
            CacheLookup::Miss(_) => None,
        }
    }

    pub fn into_hit(self) -> Option<CacheHit> {
        match self {
            CacheLookup::Hit(hit) => Some(hit),
            CacheLookup::Miss(_) => None,
        }
    }

    pub fn into_miss(self) -> Option<CacheMiss> {
        match self {
            CacheLookup::Hit(_) => None,
            CacheLookup::Miss(miss) => Some(miss),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chat::ChatMessage;
    use serde_json::json;

    #[test]
    fn test_miss_into_item_keeps_key() {
        let history = vec![ChatMessage::user("hi")];
        let miss = CacheMiss {
            prompt: "What's new?".to_string(),
            history_fingerprint: HistoryFingerprint::of(&history),
            key_vector: vec![0.5, 0.5],
            best_similarity: Some(0.4),
        };

        let item = miss.into_item(json!("nothing much"));

        assert_eq!(item.prompt(), "What's new?");
        assert_eq!(item.key_vector(), &[0.5, 0.5]);
        assert_eq!(item.history_fingerprint(), &HistoryFingerprint::of(&history));
        assert_eq!(item.response(), &json!("nothing much"));
    }

    #[test]
    fn test_lookup_accessors() {
        let miss = CacheLookup::Miss(CacheMiss {
            prompt: "q".to_string(),
            history_fingerprint: HistoryFingerprint::of(&[]),
            key_vector: vec![1.0],
            best_similarity: None,
        });

        assert!(!miss.is_hit());
        assert!(miss.hit().is_none());
        assert!(miss.into_miss().is_some());
    }

    #[test]
    fn test_lookup_serializes_outcome_tag() {
        let miss = CacheLookup::Miss(CacheMiss {
            prompt: "q".to_string(),
            history_fingerprint: HistoryFingerprint::of(&[]),
            key_vector: vec![1.0],
            best_similarity: None,
        });

        let json = serde_json::to_value(&miss).unwrap();
        assert_eq!(json["outcome"], "miss");
    }
}

//! Cache entries and insertion input

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::DomainError;
use crate::domain::chat::{ChatMessage, HistoryFingerprint};

/// Derive the identity of an entry from its prompt and history fingerprint
pub fn entry_id(prompt: &str, fingerprint: &HistoryFingerprint) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.as_bytes());
    hex::encode(hasher.finalize())
}

/// A response stored in the semantic cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Identity derived from (prompt, history fingerprint)
    id: String,
    /// Embedding of the conversation context
    key_vector: Vec<f32>,
    /// The user prompt as asked
    prompt: String,
    /// Digest of the history the prompt was asked in
    history_fingerprint: HistoryFingerprint,
    /// The cached payload
    response: serde_json::Value,
    /// When the response was stored (reset by upserts)
    created_at: DateTime<Utc>,
    /// Number of lookups served by this entry
    hit_count: u64,
    /// When the entry last served a lookup
    #[serde(default)]
    last_hit_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Create a fresh entry from insertion input
    pub fn from_item(item: NewCacheItem) -> Self {
        let id = entry_id(&item.prompt, &item.history_fingerprint);

        Self {
            id,
            key_vector: item.key_vector,
            prompt: item.prompt,
            history_fingerprint: item.history_fingerprint,
            response: item.response,
            created_at: Utc::now(),
            hit_count: 0,
            last_hit_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key_vector(&self) -> &[f32] {
        &self.key_vector
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn history_fingerprint(&self) -> &HistoryFingerprint {
        &self.history_fingerprint
    }

    pub fn response(&self) -> &serde_json::Value {
        &self.response
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    pub fn last_hit_at(&self) -> Option<DateTime<Utc>> {
        self.last_hit_at
    }

    /// Whether the entry is older than `ttl` at `now`
    pub fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - self.created_at >= ttl,
            Err(_) => false,
        }
    }

    /// Deserialize the cached response
    pub fn deserialize_response<T: for<'de> Deserialize<'de>>(&self) -> Result<T, DomainError> {
        serde_json::from_value(self.response.clone()).map_err(|e| {
            DomainError::internal(format!("Failed to deserialize cached response: {}", e))
        })
    }

    /// Upsert: take the new response and creation time, keep the stored
    /// vector and the hit history
    pub(crate) fn replace_response(&mut self, newer: CacheEntry) {
        self.response = newer.response;
        self.created_at = newer.created_at;
    }

    pub(crate) fn with_hits(mut self, hit_count: u64, last_hit_at: Option<DateTime<Utc>>) -> Self {
        self.hit_count = hit_count;
        self.last_hit_at = last_hit_at;
        self
    }

    pub(crate) fn with_key_vector(mut self, key_vector: Vec<f32>) -> Self {
        self.key_vector = key_vector;
        self
    }

    pub(crate) fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Input of an insertion
#[derive(Debug, Clone)]
pub struct NewCacheItem {
    prompt: String,
    history_fingerprint: HistoryFingerprint,
    key_vector: Vec<f32>,
    response: serde_json::Value,
}

impl NewCacheItem {
    pub fn new(
        prompt: impl Into<String>,
        history: &[ChatMessage],
        key_vector: Vec<f32>,
        response: serde_json::Value,
    ) -> Self {
        Self::with_fingerprint(prompt, HistoryFingerprint::of(history), key_vector, response)
    }

    pub fn with_fingerprint(
        prompt: impl Into<String>,
        history_fingerprint: HistoryFingerprint,
        key_vector: Vec<f32>,
        response: serde_json::Value,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            history_fingerprint,
            key_vector,
            response,
        }
    }

    /// Build an item from any serializable response
    pub fn from_serializable<T: Serialize>(
        prompt: impl Into<String>,
        history: &[ChatMessage],
        key_vector: Vec<f32>,
        response: &T,
    ) -> Result<Self, DomainError> {
        let response = serde_json::to_value(response).map_err(|e| {
            DomainError::invalid_argument(format!("Response is not serializable: {}", e))
        })?;

        Ok(Self::new(prompt, history, key_vector, response))
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn history_fingerprint(&self) -> &HistoryFingerprint {
        &self.history_fingerprint
    }

    pub fn key_vector(&self) -> &[f32] {
        &self.key_vector
    }

    pub fn response(&self) -> &serde_json::Value {
        &self.response
    }

    pub fn id(&self) -> String {
        entry_id(&self.prompt, &self.history_fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(prompt: &str, history: &[ChatMessage]) -> NewCacheItem {
        NewCacheItem::new(prompt, history, vec![0.1, 0.2, 0.3], json!({"answer": "42"}))
    }

    #[test]
    fn test_entry_from_item() {
        let entry = CacheEntry::from_item(item("What is the answer?", &[]));

        assert_eq!(entry.prompt(), "What is the answer?");
        assert_eq!(entry.key_vector(), &[0.1, 0.2, 0.3]);
        assert_eq!(entry.response(), &json!({"answer": "42"}));
        assert_eq!(entry.hit_count(), 0);
        assert!(entry.last_hit_at().is_none());
        assert_eq!(entry.id().len(), 64);
    }

    #[test]
    fn test_identity_depends_on_history() {
        let a = item("Tell me more", &[ChatMessage::user("about Paris")]);
        let b = item("Tell me more", &[ChatMessage::user("about Tokyo")]);
        let c = item("Tell me more", &[ChatMessage::user("about Paris")]);

        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), c.id());
        assert_eq!(a.id(), CacheEntry::from_item(c).id());
    }

    #[test]
    fn test_replace_response_keeps_vector_and_hits() {
        let mut stored = CacheEntry::from_item(item("q", &[])).with_hits(7, Some(Utc::now()));
        let newer = CacheEntry::from_item(NewCacheItem::new(
            "q",
            &[],
            vec![0.9, 0.9, 0.9],
            json!("fresh"),
        ));

        stored.replace_response(newer);

        assert_eq!(stored.response(), &json!("fresh"));
        assert_eq!(stored.key_vector(), &[0.1, 0.2, 0.3]);
        assert_eq!(stored.hit_count(), 7);
    }

    #[test]
    fn test_is_stale() {
        let entry = CacheEntry::from_item(item("q", &[]))
            .with_created_at(Utc::now() - chrono::Duration::seconds(120));

        assert!(entry.is_stale(Duration::from_secs(60), Utc::now()));
        assert!(!entry.is_stale(Duration::from_secs(600), Utc::now()));
    }

    #[test]
    fn test_deserialize_response() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Answer {
            answer: String,
        }

        let entry = CacheEntry::from_item(item("q", &[]));
        let answer: Answer = entry.deserialize_response().unwrap();

        assert_eq!(answer.answer, "42");
    }

    #[test]
    fn test_entry_serialization_roundtrip_keeps_metadata() {
        let entry = CacheEntry::from_item(item("q", &[])).with_hits(3, None);
        let json = serde_json::to_string(&entry).unwrap();
        let restored: CacheEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, entry);
    }
}

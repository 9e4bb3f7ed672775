//! History fingerprints and embedding context rendering

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::ChatMessage;

const FIELD_SEPARATOR: u8 = 0x00;
const RECORD_SEPARATOR: u8 = 0x1e;

/// Order-sensitive digest of a conversation history
///
/// Two identical prompts asked after different conversations must not
/// collide, so the fingerprint takes part in the identity of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryFingerprint(String);

impl HistoryFingerprint {
    /// Compute the fingerprint of an ordered message history
    pub fn of(history: &[ChatMessage]) -> Self {
        let mut hasher = Sha256::new();

        for message in history {
            hasher.update(message.role.as_str().as_bytes());
            hasher.update([FIELD_SEPARATOR]);
            hasher.update(message.content.as_bytes());
            hasher.update([RECORD_SEPARATOR]);
        }

        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap an already computed fingerprint (e.g. loaded from storage)
    pub fn from_hex(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HistoryFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The text that gets embedded for a lookup or an insert
///
/// Only the trailing `window` messages of the history are rendered, followed
/// by the prompt as the final user turn.
#[derive(Debug, Clone)]
pub struct ConversationContext<'a> {
    prompt: &'a str,
    history: &'a [ChatMessage],
    window: usize,
}

impl<'a> ConversationContext<'a> {
    pub fn new(prompt: &'a str, history: &'a [ChatMessage], window: usize) -> Self {
        Self {
            prompt,
            history,
            window,
        }
    }

    /// Messages that fall inside the context window
    pub fn windowed_history(&self) -> &'a [ChatMessage] {
        let start = self.history.len().saturating_sub(self.window);
        &self.history[start..]
    }

    pub fn render(&self) -> String {
        let mut lines: Vec<String> = self
            .windowed_history()
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content.trim()))
            .collect();

        lines.push(format!("user: {}", self.prompt.trim()));
        lines.join("\n")
    }
}

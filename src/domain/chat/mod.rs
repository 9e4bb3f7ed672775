//! Conversation history models used to key the semantic cache

mod history;
mod message;

pub use history::{ConversationContext, HistoryFingerprint};
pub use message::{ChatMessage, MessageRole};

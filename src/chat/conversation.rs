//! Conversation history, keyed by an opaque conversation id.
//!
//! The gateway holds no per-session chat state of its own; handlers look
//! history up through `ConversationStore`. The in-memory store is the
//! default; any other implementation of the trait can back `AppState`.

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use std::time::{Duration, Instant};

use crate::chat::types::ChatMessage;
use crate::config::ChatConfig;

/// Storage for conversation history.
pub trait ConversationStore: Send + Sync {
    /// Messages of a conversation, oldest first. Unknown ids are empty.
    fn history<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Vec<ChatMessage>>;

    /// Append one message.
    fn append<'a>(&'a self, id: &'a str, message: ChatMessage) -> BoxFuture<'a, ()>;

    /// Forget a conversation. Returns whether it existed.
    fn clear<'a>(&'a self, id: &'a str) -> BoxFuture<'a, bool>;
}

/// The most recent `window` messages.
pub fn window(history: &[ChatMessage], window: usize) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(window);
    history[start..].to_vec()
}

/// Process-local store.
///
/// Each conversation keeps at most `max_messages`. Conversations untouched
/// for `idle_ttl` are dropped, and the least recently used ones go once
/// there are more than `max_conversations`. Pruning runs whenever a new
/// conversation is started.
#[derive(Debug)]
pub struct InMemoryConversationStore {
    conversations: DashMap<String, Conversation>,
    max_messages: usize,
    max_conversations: usize,
    idle_ttl: Duration,
}

#[derive(Debug)]
struct Conversation {
    messages: Vec<ChatMessage>,
    touched: Instant,
}

impl InMemoryConversationStore {
    pub const DEFAULT_MAX_MESSAGES: usize = 200;

    pub fn new(max_messages: usize, max_conversations: usize, idle_ttl: Duration) -> Self {
        Self {
            conversations: DashMap::new(),
            max_messages: max_messages.max(1),
            max_conversations: max_conversations.max(1),
            idle_ttl,
        }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(
            Self::DEFAULT_MAX_MESSAGES,
            config.max_conversations,
            config.conversation_idle_ttl(),
        )
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Drop idle conversations, then the least recently used beyond
    /// `keep`. Returns how many were removed.
    fn prune(&self, keep: usize) -> usize {
        let before = self.conversations.len();
        self.conversations
            .retain(|_, conversation| conversation.touched.elapsed() < self.idle_ttl);

        let excess = self.conversations.len().saturating_sub(keep);
        if excess > 0 {
            let mut by_age: Vec<(String, Instant)> = self
                .conversations
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().touched))
                .collect();
            by_age.sort_by_key(|(_, touched)| *touched);
            for (id, _) in by_age.into_iter().take(excess) {
                self.conversations.remove(&id);
            }
        }

        let removed = before.saturating_sub(self.conversations.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.conversations.len(), "Pruned conversations");
        }
        removed
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::from_config(&ChatConfig::default())
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn history<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Vec<ChatMessage>> {
        let history = self
            .conversations
            .get_mut(id)
            .map(|mut entry| {
                entry.touched = Instant::now();
                entry.messages.clone()
            })
            .unwrap_or_default();
        Box::pin(async move { history })
    }

    fn append<'a>(&'a self, id: &'a str, message: ChatMessage) -> BoxFuture<'a, ()> {
        if !self.conversations.contains_key(id) {
            self.prune(self.max_conversations - 1);
        }
        {
            let mut entry = self
                .conversations
                .entry(id.to_string())
                .or_insert_with(|| Conversation {
                    messages: Vec::new(),
                    touched: Instant::now(),
                });
            entry.touched = Instant::now();
            entry.messages.push(message);
            let excess = entry.messages.len().saturating_sub(self.max_messages);
            if excess > 0 {
                entry.messages.drain(..excess);
            }
        }
        Box::pin(async {})
    }

    fn clear<'a>(&'a self, id: &'a str) -> BoxFuture<'a, bool> {
        let existed = self.conversations.remove(id).is_some();
        Box::pin(async move { existed })
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::message::PendingMessage;

/// Denormalized summary of the latest message in a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub text: String,
    pub sender_id: String,
    pub created_at_ms: i64,
}

/// A direct conversation between two participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub participants: Vec<String>,
    /// Unread counter per participant.
    #[serde(default)]
    pub unread_counts: BTreeMap<String, u32>,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    pub updated_at_ms: i64,
    pub created_at_ms: i64,
}

impl Chat {
    pub fn unread_for(&self, user_id: &str) -> u32 {
        self.unread_counts.get(user_id).copied().unwrap_or(0)
    }

    /// Resets the reader's own counter; every other counter is left alone.
    pub fn mark_read(&mut self, user_id: &str) {
        if let Some(count) = self.unread_counts.get_mut(user_id) {
            *count = 0;
        }
    }

    pub fn has_participants(&self, first: &str, second: &str) -> bool {
        self.participants.iter().any(|p| p == first) && self.participants.iter().any(|p| p == second)
    }

    /// Local projection of a committed conversation update.
    pub fn apply_update(&mut self, update: &ConversationUpdate) {
        self.last_message = Some(update.last_message.clone());
        self.updated_at_ms = self.updated_at_ms.max(update.updated_at_ms);

        let count = self
            .unread_counts
            .entry(update.unread_increment_for.clone())
            .or_insert(0);
        *count = count.saturating_add(1);
    }
}

/// The batched conversation write that accompanies every delivered message.
///
/// The remote store commits all three parts together or none of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationUpdate {
    pub last_message: LastMessage,
    pub updated_at_ms: i64,
    pub unread_increment_for: String,
}

impl ConversationUpdate {
    pub fn for_message(pending: &PendingMessage) -> Self {
        Self {
            last_message: LastMessage {
                text: pending.text.clone(),
                sender_id: pending.sender_id.clone(),
                created_at_ms: pending.created_at_ms,
            },
            updated_at_ms: pending.created_at_ms,
            unread_increment_for: pending.recipient_id.clone(),
        }
    }
}

/// Orders chats for the list: most recently updated first.
pub fn sort_by_recency(chats: &mut [Chat]) {
    chats.sort_by(|a, b| {
        b.updated_at_ms
            .cmp(&a.updated_at_ms)
            .then_with(|| a.id.cmp(&b.id))
    });
}

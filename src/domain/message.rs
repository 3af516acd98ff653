use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on message text length, counted in characters.
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Client-generated identifier that follows a message from compose to confirmation.
///
/// It never changes and is the join key between an optimistic entry and the
/// confirmed record the remote store pushes back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(String);

impl LocalId {
    pub fn generate() -> Self {
        Self(format!("local_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LocalId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status shown next to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Failed,
}

impl MessageStatus {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

/// Delivery lifecycle of one outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Admitted locally and displayed, not attempted yet.
    Optimistic,
    /// Remote write in flight.
    Attempting,
    /// Remote store accepted the message.
    Confirmed,
    /// No connectivity at attempt time; waits in the outbox.
    Deferred,
}

impl DeliveryState {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Optimistic => "optimistic",
            Self::Attempting => "attempting",
            Self::Confirmed => "confirmed",
            Self::Deferred => "deferred",
        }
    }

    pub fn display_status(self) -> MessageStatus {
        match self {
            Self::Optimistic | Self::Attempting => MessageStatus::Sending,
            Self::Confirmed => MessageStatus::Sent,
            Self::Deferred => MessageStatus::Failed,
        }
    }
}

/// A message captured for deferred delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMessage {
    pub local_id: LocalId,
    pub chat_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub text: String,
    pub created_at_ms: i64,
}

/// One chat utterance, either local-only or confirmed by the remote store.
///
/// `id` is present exactly when `status` is `Sent`; the constructors and
/// mutators below are the only way to move between the two shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: Option<String>,
    local_id: LocalId,
    chat_id: String,
    sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recipient_id: Option<String>,
    text: String,
    created_at_ms: i64,
    status: MessageStatus,
}

impl Message {
    pub fn optimistic(pending: &PendingMessage) -> Self {
        Self {
            id: None,
            local_id: pending.local_id.clone(),
            chat_id: pending.chat_id.clone(),
            sender_id: pending.sender_id.clone(),
            recipient_id: Some(pending.recipient_id.clone()),
            text: pending.text.clone(),
            created_at_ms: pending.created_at_ms,
            status: MessageStatus::Sending,
        }
    }

    pub fn confirmed(
        id: impl Into<String>,
        local_id: LocalId,
        chat_id: impl Into<String>,
        sender_id: impl Into<String>,
        text: impl Into<String>,
        created_at_ms: i64,
    ) -> Self {
        Self {
            id: Some(id.into()),
            local_id,
            chat_id: chat_id.into(),
            sender_id: sender_id.into(),
            recipient_id: None,
            text: text.into(),
            created_at_ms,
            status: MessageStatus::Sent,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn local_id(&self) -> &LocalId {
        &self.local_id
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn recipient_id(&self) -> Option<&str> {
        self.recipient_id.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn created_at_ms(&self) -> i64 {
        self.created_at_ms
    }

    pub fn status(&self) -> MessageStatus {
        self.status
    }

    pub fn is_confirmed(&self) -> bool {
        self.id.is_some()
    }

    /// Returns false for records that break the id/status invariant, e.g. a
    /// hand-edited cache file.
    pub fn is_consistent(&self) -> bool {
        self.id.is_some() == (self.status == MessageStatus::Sent)
    }

    pub fn confirm(&mut self, server_id: impl Into<String>) {
        self.id = Some(server_id.into());
        self.status = MessageStatus::Sent;
        self.recipient_id = None;
    }

    /// Moves a local-only message between `Sending` and `Failed`.
    ///
    /// Confirmed messages are never demoted, and `Sent` can only be reached
    /// through [`Message::confirm`].
    pub fn set_local_status(&mut self, status: MessageStatus) -> bool {
        if self.is_confirmed() || status == MessageStatus::Sent {
            return false;
        }

        self.status = status;
        true
    }

    /// Rebuilds the pending record for a local-only message, used by manual retry.
    pub fn to_pending(&self) -> Option<PendingMessage> {
        if self.is_confirmed() {
            return None;
        }

        Some(PendingMessage {
            local_id: self.local_id.clone(),
            chat_id: self.chat_id.clone(),
            sender_id: self.sender_id.clone(),
            recipient_id: self.recipient_id.clone()?,
            text: self.text.clone(),
            created_at_ms: self.created_at_ms,
        })
    }
}

/// Position of a confirmed message in newest-first history order.
///
/// Ordered by creation time, then server id, so messages sharing a
/// millisecond still have a strict order across page boundaries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageCursor {
    pub created_at_ms: i64,
    pub message_id: String,
}

impl PageCursor {
    pub fn of(message: &Message) -> Option<Self> {
        message.id().map(|id| Self {
            created_at_ms: message.created_at_ms(),
            message_id: id.to_owned(),
        })
    }
}

/// Hands out creation timestamps that never go backwards for a sender.
#[derive(Debug, Default)]
pub struct MessageClock {
    last_by_sender: HashMap<String, i64>,
}

impl MessageClock {
    pub fn next(&mut self, sender_id: &str, now_ms: i64) -> i64 {
        let stamp = match self.last_by_sender.get(sender_id) {
            Some(last) if now_ms <= *last => last.saturating_add(1),
            _ => now_ms,
        };

        self.last_by_sender.insert(sender_id.to_owned(), stamp);
        stamp
    }

    /// Seeds the clock from messages restored from the cache.
    pub fn observe(&mut self, sender_id: &str, created_at_ms: i64) {
        let last = self
            .last_by_sender
            .entry(sender_id.to_owned())
            .or_insert(created_at_ms);
        *last = (*last).max(created_at_ms);
    }
}

pub fn now_unix_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

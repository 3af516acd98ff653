//! Validation for outgoing messages.
//!
//! A [`SendMessageCommand`] comes from the compose box. [`prepare_message`]
//! turns it into a [`PendingMessage`] with a fresh local id and a timestamp
//! that never goes backwards for the sender; delivery itself belongs to the
//! reconciler.

use crate::domain::message::{LocalId, MessageClock, PendingMessage, MAX_MESSAGE_CHARS};

/// Command to send a message to a specific chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessageCommand {
    pub chat_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub text: String,
}

/// Reasons a command is refused before it reaches the outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendMessageError {
    /// Message text is empty after trimming whitespace.
    EmptyMessage,
    /// Message text is longer than [`MAX_MESSAGE_CHARS`] characters.
    MessageTooLong { chars: usize },
    /// Recipient is missing, so the unread counter could not be updated.
    MissingRecipient,
    MissingChat,
}

/// Validates the command and builds the pending record for it.
///
/// # Errors
/// Returns `SendMessageError::EmptyMessage` if text is empty/whitespace and
/// `SendMessageError::MessageTooLong` past the character limit.
pub fn prepare_message(
    command: SendMessageCommand,
    clock: &mut MessageClock,
    now_ms: i64,
) -> Result<PendingMessage, SendMessageError> {
    let text = command.text.trim();
    if text.is_empty() {
        return Err(SendMessageError::EmptyMessage);
    }

    let chars = text.chars().count();
    if chars > MAX_MESSAGE_CHARS {
        return Err(SendMessageError::MessageTooLong { chars });
    }

    if command.chat_id.trim().is_empty() {
        return Err(SendMessageError::MissingChat);
    }

    if command.recipient_id.trim().is_empty() {
        return Err(SendMessageError::MissingRecipient);
    }

    Ok(PendingMessage {
        local_id: LocalId::generate(),
        created_at_ms: clock.next(&command.sender_id, now_ms),
        text: text.to_owned(),
        chat_id: command.chat_id,
        sender_id: command.sender_id,
        recipient_id: command.recipient_id,
    })
}

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::{
    chat::{Chat, ConversationUpdate},
    message::{Message, PageCursor, PendingMessage},
};

/// Errors reported by the remote document store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Connection lost or transport timeout.
    #[error("remote store unavailable")]
    Unavailable,
    /// The store refused the write (validation, permission, quota).
    #[error("remote store rejected the request: {reason}")]
    Rejected { reason: String },
    #[error("remote document not found")]
    NotFound,
}

/// Hosted realtime document database, seen from the client.
///
/// Every call may suspend; callers await each one before moving on.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Creates the message document and returns its server id. Never called
    /// again for a local id once a call succeeded.
    async fn write_message(
        &self,
        chat_id: &str,
        message: &PendingMessage,
    ) -> Result<String, RemoteError>;

    /// Commits summary, update time and the recipient's unread increment together.
    async fn batch_update_conversation(
        &self,
        chat_id: &str,
        update: &ConversationUpdate,
    ) -> Result<(), RemoteError>;

    /// One page of confirmed messages, newest first by [`PageCursor`], strictly
    /// older than `before`.
    async fn load_messages(
        &self,
        chat_id: &str,
        before: Option<&PageCursor>,
        limit: usize,
    ) -> Result<Vec<Message>, RemoteError>;

    async fn subscribe_messages(
        &self,
        chat_id: &str,
    ) -> Result<mpsc::Receiver<Vec<Message>>, RemoteError>;

    async fn subscribe_chats(&self, user_id: &str)
        -> Result<mpsc::Receiver<Vec<Chat>>, RemoteError>;

    async fn reset_unread(&self, chat_id: &str, user_id: &str) -> Result<(), RemoteError>;

    async fn create_chat(&self, participants: [&str; 2]) -> Result<Chat, RemoteError>;

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), RemoteError>;

    async fn delete_chat(&self, chat_id: &str) -> Result<(), RemoteError>;
}

//! Chat maintenance: delete, mark as read, get-or-create.
//!
//! Each action calls the remote store first and only then updates the view;
//! persisting the result is left to the session.

use crate::{
    domain::{chat::Chat, conversation_view::ConversationView},
    usecases::contracts::{RemoteError, RemoteStore},
};

const MARK_READ_REMOTE_FAILED: &str = "MARK_READ_REMOTE_FAILED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatActionError {
    TemporarilyUnavailable,
    Rejected { reason: String },
    NotFound,
    /// Two-party chats need two distinct participants.
    InvalidParticipants,
}

impl From<RemoteError> for ChatActionError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Unavailable => Self::TemporarilyUnavailable,
            RemoteError::Rejected { reason } => Self::Rejected { reason },
            RemoteError::NotFound => Self::NotFound,
        }
    }
}

pub async fn delete_message<R>(
    remote: &R,
    view: &mut ConversationView,
    chat_id: &str,
    message_id: &str,
) -> Result<(), ChatActionError>
where
    R: RemoteStore + ?Sized,
{
    remote.delete_message(chat_id, message_id).await?;
    view.remove_message(chat_id, message_id);
    Ok(())
}

pub async fn delete_chat<R>(
    remote: &R,
    view: &mut ConversationView,
    chat_id: &str,
) -> Result<(), ChatActionError>
where
    R: RemoteStore + ?Sized,
{
    remote.delete_chat(chat_id).await?;
    view.remove_chat(chat_id);
    Ok(())
}

/// Clears the reader's unread counter. The local reset always applies; a
/// remote failure is logged and reported as `false`.
pub async fn mark_as_read<R>(
    remote: &R,
    view: &mut ConversationView,
    chat_id: &str,
    user_id: &str,
) -> bool
where
    R: RemoteStore + ?Sized,
{
    view.mark_read(chat_id, user_id);

    match remote.reset_unread(chat_id, user_id).await {
        Ok(()) => true,
        Err(error) => {
            tracing::warn!(
                code = MARK_READ_REMOTE_FAILED,
                chat_id,
                error = %error,
                "unread counter reset only applied locally"
            );
            false
        }
    }
}

/// Returns the existing chat between the two users, creating it remotely if
/// the view has none.
pub async fn get_or_create_chat<R>(
    remote: &R,
    view: &mut ConversationView,
    user_id: &str,
    other_user_id: &str,
) -> Result<Chat, ChatActionError>
where
    R: RemoteStore + ?Sized,
{
    if user_id.trim().is_empty() || other_user_id.trim().is_empty() || user_id == other_user_id {
        return Err(ChatActionError::InvalidParticipants);
    }

    if let Some(existing) = view
        .chats()
        .iter()
        .find(|chat| chat.has_participants(user_id, other_user_id))
    {
        return Ok(existing.clone());
    }

    let chat = remote.create_chat([user_id, other_user_id]).await?;
    view.upsert_chat(chat.clone());
    Ok(chat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::message::{LocalId, Message},
        test_support::{two_party_chat, ScriptedRemoteStore},
    };

    fn view_with_chat() -> ConversationView {
        let mut view = ConversationView::default();
        view.set_chats(vec![two_party_chat("c1", 10)]);
        view
    }

    #[tokio::test]
    async fn delete_message_removes_it_after_remote_success() {
        let remote = ScriptedRemoteStore::default();
        let mut view = view_with_chat();
        view.merge_confirmed(
            "c1",
            vec![Message::confirmed("srv1", LocalId::from("l1"), "c1", "alice", "hi", 1)],
        );

        delete_message(&remote, &mut view, "c1", "srv1")
            .await
            .expect("delete should succeed");

        assert!(view.messages("c1").is_empty());
        assert_eq!(
            remote.deleted_messages(),
            [("c1".to_owned(), "srv1".to_owned())]
        );
    }

    #[tokio::test]
    async fn delete_chat_keeps_view_when_remote_fails() {
        let remote = ScriptedRemoteStore::default();
        remote.fail_other_calls(RemoteError::Unavailable);
        let mut view = view_with_chat();

        let result = delete_chat(&remote, &mut view, "c1").await;

        assert_eq!(result, Err(ChatActionError::TemporarilyUnavailable));
        assert!(view.chat("c1").is_some());
    }

    #[tokio::test]
    async fn mark_as_read_resets_only_the_readers_counter() {
        let remote = ScriptedRemoteStore::default();
        let mut chat = two_party_chat("c1", 10);
        chat.unread_counts.insert("alice".to_owned(), 3);
        chat.unread_counts.insert("bob".to_owned(), 2);
        let mut view = ConversationView::default();
        view.set_chats(vec![chat]);

        assert!(mark_as_read(&remote, &mut view, "c1", "alice").await);

        let chat = view.chat("c1").expect("chat present");
        assert_eq!(chat.unread_for("alice"), 0);
        assert_eq!(chat.unread_for("bob"), 2);
        assert_eq!(
            remote.reset_unread_calls(),
            [("c1".to_owned(), "alice".to_owned())]
        );
    }

    #[tokio::test]
    async fn mark_as_read_remote_failure_is_not_fatal() {
        let remote = ScriptedRemoteStore::default();
        remote.fail_other_calls(RemoteError::Unavailable);
        let mut chat = two_party_chat("c1", 10);
        chat.unread_counts.insert("alice".to_owned(), 3);
        let mut view = ConversationView::default();
        view.set_chats(vec![chat]);

        assert!(!mark_as_read(&remote, &mut view, "c1", "alice").await);
        assert_eq!(view.chat("c1").map(|c| c.unread_for("alice")), Some(0));
    }

    #[tokio::test]
    async fn get_or_create_reuses_existing_chat() {
        let remote = ScriptedRemoteStore::default();
        let mut view = view_with_chat();

        let chat = get_or_create_chat(&remote, &mut view, "bob", "alice")
            .await
            .expect("chat should resolve");

        assert_eq!(chat.id, "c1");
        assert!(remote.created_chats().is_empty());
    }

    #[tokio::test]
    async fn get_or_create_creates_missing_chat() {
        let remote = ScriptedRemoteStore::default();
        let mut view = view_with_chat();

        let chat = get_or_create_chat(&remote, &mut view, "alice", "carol")
            .await
            .expect("chat should be created");

        assert_eq!(chat.id, "chat1");
        assert!(view.chat("chat1").is_some());
    }

    #[tokio::test]
    async fn get_or_create_refuses_self_chat() {
        let remote = ScriptedRemoteStore::default();
        let mut view = ConversationView::default();

        let result = get_or_create_chat(&remote, &mut view, "alice", "alice").await;

        assert_eq!(result, Err(ChatActionError::InvalidParticipants));
    }
}

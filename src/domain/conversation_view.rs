use std::collections::HashMap;

use super::{
    chat::{sort_by_recency, Chat, ConversationUpdate},
    message::{LocalId, Message, MessageStatus, PageCursor},
    outbox_queue::OutboxQueue,
};

/// Badge rendered next to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryBadge {
    Sending,
    /// Failed for now, but still waiting in the outbox for the next reconnect.
    Queued,
    Failed,
    Sent,
}

/// In-memory projection of chats and messages handed to the UI.
///
/// Messages are keyed by local id so an optimistic entry and the confirmed
/// record for the same send never show up twice.
#[derive(Debug, Default)]
pub struct ConversationView {
    chats: Vec<Chat>,
    messages: HashMap<String, Vec<Message>>,
}

impl ConversationView {
    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn chat(&self, chat_id: &str) -> Option<&Chat> {
        self.chats.iter().find(|chat| chat.id == chat_id)
    }

    pub fn set_chats(&mut self, mut chats: Vec<Chat>) {
        sort_by_recency(&mut chats);
        self.chats = chats;
    }

    pub fn upsert_chat(&mut self, chat: Chat) {
        match self.chats.iter_mut().find(|existing| existing.id == chat.id) {
            Some(existing) => *existing = chat,
            None => self.chats.push(chat),
        }
        sort_by_recency(&mut self.chats);
    }

    /// Messages for a chat: unconfirmed entries first, newest first within each group.
    pub fn messages(&self, chat_id: &str) -> &[Message] {
        self.messages
            .get(chat_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn confirmed_messages(&self, chat_id: &str) -> Vec<Message> {
        self.messages(chat_id)
            .iter()
            .filter(|message| message.is_confirmed())
            .cloned()
            .collect()
    }

    pub fn find(&self, chat_id: &str, local_id: &LocalId) -> Option<&Message> {
        self.messages(chat_id)
            .iter()
            .find(|message| message.local_id() == local_id)
    }

    pub fn find_any(&self, local_id: &LocalId) -> Option<&Message> {
        self.messages
            .values()
            .flatten()
            .find(|message| message.local_id() == local_id)
    }

    /// Cursor of the oldest confirmed message, where "load more" continues.
    pub fn oldest_confirmed_cursor(&self, chat_id: &str) -> Option<PageCursor> {
        self.messages(chat_id).iter().filter_map(PageCursor::of).min()
    }

    /// Chats that have messages in the view, listed or not.
    pub fn message_chat_ids(&self) -> Vec<String> {
        self.messages.keys().cloned().collect()
    }

    /// Shows a local-only entry. Ignored when the local id is already present,
    /// which also covers the confirmed record having arrived first.
    pub fn insert_optimistic(&mut self, message: Message) {
        let chat_id = message.chat_id().to_owned();
        let entries = self.messages.entry(chat_id).or_default();
        if entries.iter().any(|m| m.local_id() == message.local_id()) {
            return;
        }

        entries.push(message);
        order_messages(entries);
    }

    pub fn set_local_status(
        &mut self,
        chat_id: &str,
        local_id: &LocalId,
        status: MessageStatus,
    ) -> bool {
        self.entry_mut(chat_id, local_id)
            .map(|message| message.set_local_status(status))
            .unwrap_or(false)
    }

    pub fn confirm(&mut self, chat_id: &str, local_id: &LocalId, server_id: &str) -> bool {
        let Some(message) = self.entry_mut(chat_id, local_id) else {
            return false;
        };

        message.confirm(server_id);
        if let Some(entries) = self.messages.get_mut(chat_id) {
            order_messages(entries);
        }
        true
    }

    /// Merges records pushed by the remote store; they are ground truth.
    ///
    /// Returns the local ids whose unconfirmed entry was replaced by a
    /// confirmed one.
    pub fn merge_confirmed(&mut self, chat_id: &str, incoming: Vec<Message>) -> Vec<LocalId> {
        let entries = self.messages.entry(chat_id.to_owned()).or_default();
        let mut superseded = Vec::new();

        for message in incoming.into_iter().filter(Message::is_confirmed) {
            match entries
                .iter_mut()
                .find(|existing| existing.local_id() == message.local_id())
            {
                Some(existing) => {
                    if !existing.is_confirmed() {
                        superseded.push(message.local_id().clone());
                    }
                    *existing = message;
                }
                None => entries.push(message),
            }
        }

        order_messages(entries);
        superseded
    }

    /// Replaces the confirmed entries of a chat, keeping unconfirmed ones.
    pub fn replace_confirmed(&mut self, chat_id: &str, page: Vec<Message>) -> Vec<LocalId> {
        if let Some(entries) = self.messages.get_mut(chat_id) {
            entries.retain(|message| !message.is_confirmed());
        }
        self.merge_confirmed(chat_id, page)
    }

    pub fn remove_message(&mut self, chat_id: &str, server_id: &str) -> bool {
        let Some(entries) = self.messages.get_mut(chat_id) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|message| message.id() != Some(server_id));
        entries.len() != before
    }

    pub fn remove_chat(&mut self, chat_id: &str) -> bool {
        let before = self.chats.len();
        self.chats.retain(|chat| chat.id != chat_id);
        let had_messages = self.messages.remove(chat_id).is_some();
        self.chats.len() != before || had_messages
    }

    pub fn apply_conversation_update(&mut self, chat_id: &str, update: &ConversationUpdate) {
        if let Some(chat) = self.chats.iter_mut().find(|chat| chat.id == chat_id) {
            chat.apply_update(update);
            sort_by_recency(&mut self.chats);
        }
    }

    pub fn mark_read(&mut self, chat_id: &str, user_id: &str) {
        if let Some(chat) = self.chats.iter_mut().find(|chat| chat.id == chat_id) {
            chat.mark_read(user_id);
        }
    }

    pub fn badge(&self, message: &Message, outbox: &OutboxQueue) -> DeliveryBadge {
        match message.status() {
            MessageStatus::Sent => DeliveryBadge::Sent,
            MessageStatus::Sending => DeliveryBadge::Sending,
            MessageStatus::Failed if outbox.contains(message.local_id()) => DeliveryBadge::Queued,
            MessageStatus::Failed => DeliveryBadge::Failed,
        }
    }

    pub fn clear(&mut self) {
        self.chats.clear();
        self.messages.clear();
    }

    fn entry_mut(&mut self, chat_id: &str, local_id: &LocalId) -> Option<&mut Message> {
        self.messages
            .get_mut(chat_id)?
            .iter_mut()
            .find(|message| message.local_id() == local_id)
    }
}

fn order_messages(messages: &mut [Message]) {
    messages.sort_by(|a, b| {
        a.is_confirmed()
            .cmp(&b.is_confirmed())
            .then_with(|| b.created_at_ms().cmp(&a.created_at_ms()))
            .then_with(|| b.id().cmp(&a.id()))
    });
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::message::PendingMessage;

    fn pending(local_id: &str, created_at_ms: i64) -> PendingMessage {
        PendingMessage {
            local_id: LocalId::from(local_id),
            chat_id: "c1".to_owned(),
            sender_id: "alice".to_owned(),
            recipient_id: "bob".to_owned(),
            text: format!("text {local_id}"),
            created_at_ms,
        }
    }

    fn confirmed(id: &str, local_id: &str, created_at_ms: i64) -> Message {
        Message::confirmed(
            id,
            LocalId::from(local_id),
            "c1",
            "alice",
            format!("text {local_id}"),
            created_at_ms,
        )
    }

    fn chat(id: &str, updated_at_ms: i64) -> Chat {
        Chat {
            id: id.to_owned(),
            participants: vec!["alice".to_owned(), "bob".to_owned()],
            unread_counts: BTreeMap::new(),
            last_message: None,
            updated_at_ms,
            created_at_ms: 0,
        }
    }

    #[test]
    fn confirmed_entry_supersedes_optimistic_one() {
        let mut view = ConversationView::default();
        view.insert_optimistic(Message::optimistic(&pending("a1", 10)));

        let superseded = view.merge_confirmed("c1", vec![confirmed("srv1", "a1", 10)]);

        assert_eq!(superseded, vec![LocalId::from("a1")]);
        let messages = view.messages("c1");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id(), Some("srv1"));
        assert_eq!(messages[0].status(), MessageStatus::Sent);
    }

    #[test]
    fn optimistic_insert_after_confirmation_is_ignored() {
        let mut view = ConversationView::default();
        view.merge_confirmed("c1", vec![confirmed("srv1", "a1", 10)]);

        view.insert_optimistic(Message::optimistic(&pending("a1", 10)));

        assert_eq!(view.messages("c1").len(), 1);
        assert_eq!(view.messages("c1")[0].id(), Some("srv1"));
    }

    #[test]
    fn unconfirmed_entries_come_first_newest_first() {
        let mut view = ConversationView::default();
        view.merge_confirmed(
            "c1",
            vec![confirmed("srv1", "x1", 5), confirmed("srv2", "x2", 30)],
        );
        view.insert_optimistic(Message::optimistic(&pending("a1", 10)));
        view.insert_optimistic(Message::optimistic(&pending("a2", 20)));

        let order: Vec<_> = view
            .messages("c1")
            .iter()
            .map(|m| m.local_id().as_str())
            .collect();
        assert_eq!(order, ["a2", "a1", "x2", "x1"]);
    }

    #[test]
    fn replace_confirmed_keeps_pending_entries() {
        let mut view = ConversationView::default();
        view.merge_confirmed("c1", vec![confirmed("srv1", "x1", 5)]);
        view.insert_optimistic(Message::optimistic(&pending("a1", 10)));

        view.replace_confirmed("c1", vec![confirmed("srv9", "x9", 7)]);

        let order: Vec<_> = view
            .messages("c1")
            .iter()
            .map(|m| m.local_id().as_str())
            .collect();
        assert_eq!(order, ["a1", "x9"]);
    }

    #[test]
    fn badge_reports_queued_for_failed_entries_in_outbox() {
        let mut view = ConversationView::default();
        let queued = pending("a1", 10);
        view.insert_optimistic(Message::optimistic(&queued));
        view.insert_optimistic(Message::optimistic(&pending("a2", 11)));
        view.set_local_status("c1", &LocalId::from("a1"), MessageStatus::Failed);
        view.set_local_status("c1", &LocalId::from("a2"), MessageStatus::Failed);
        let outbox = OutboxQueue::from_entries(vec![queued]);

        let a1 = view.find("c1", &LocalId::from("a1")).expect("a1 present");
        let a2 = view.find("c1", &LocalId::from("a2")).expect("a2 present");

        assert_eq!(view.badge(a1, &outbox), DeliveryBadge::Queued);
        assert_eq!(view.badge(a2, &outbox), DeliveryBadge::Failed);
    }

    #[test]
    fn oldest_cursor_uses_server_id_for_equal_timestamps() {
        let mut view = ConversationView::default();
        view.merge_confirmed(
            "c1",
            vec![
                confirmed("m3", "x3", 30),
                confirmed("m2b", "x2b", 20),
                confirmed("m2a", "x2a", 20),
            ],
        );
        view.insert_optimistic(Message::optimistic(&pending("a1", 1)));

        let cursor = view.oldest_confirmed_cursor("c1").expect("confirmed entries exist");

        assert_eq!(cursor.created_at_ms, 20);
        assert_eq!(cursor.message_id, "m2a");
    }

    #[test]
    fn remove_message_matches_server_id() {
        let mut view = ConversationView::default();
        view.merge_confirmed("c1", vec![confirmed("srv1", "x1", 5)]);

        assert!(view.remove_message("c1", "srv1"));
        assert!(!view.remove_message("c1", "srv1"));
        assert!(view.messages("c1").is_empty());
    }

    #[test]
    fn chat_list_stays_sorted_after_update() {
        let mut view = ConversationView::default();
        view.set_chats(vec![chat("c1", 10), chat("c2", 20)]);

        let update = ConversationUpdate::for_message(&pending("a1", 30));
        view.apply_conversation_update("c1", &update);

        let ids: Vec<_> = view.chats().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["c1", "c2"]);
        assert_eq!(view.chat("c1").map(|c| c.unread_for("bob")), Some(1));
    }

    #[test]
    fn remove_chat_drops_its_messages() {
        let mut view = ConversationView::default();
        view.set_chats(vec![chat("c1", 10)]);
        view.merge_confirmed("c1", vec![confirmed("srv1", "x1", 5)]);

        assert!(view.remove_chat("c1"));
        assert!(view.chats().is_empty());
        assert!(view.messages("c1").is_empty());
    }
}

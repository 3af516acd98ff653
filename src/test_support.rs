use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    domain::{
        chat::{Chat, ConversationUpdate},
        message::{LocalId, Message, PageCursor, PendingMessage},
    },
    usecases::contracts::{RemoteError, RemoteStore},
};

static ENV_LOCK: Mutex<()> = Mutex::new(());

pub fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn two_party_chat(id: &str, updated_at_ms: i64) -> Chat {
    Chat {
        id: id.to_owned(),
        participants: vec!["alice".to_owned(), "bob".to_owned()],
        unread_counts: BTreeMap::from([("alice".to_owned(), 0), ("bob".to_owned(), 0)]),
        last_message: None,
        updated_at_ms,
        created_at_ms: 0,
    }
}

pub fn pending(local_id: &str, chat_id: &str, created_at_ms: i64) -> PendingMessage {
    PendingMessage {
        local_id: LocalId::from(local_id),
        chat_id: chat_id.to_owned(),
        sender_id: "alice".to_owned(),
        recipient_id: "bob".to_owned(),
        text: format!("text {local_id}"),
        created_at_ms,
    }
}

/// Remote store double: records every call in order and answers from a script.
///
/// Writes without a scripted answer succeed with ids `srv1`, `srv2`, ...
#[derive(Debug, Default)]
pub struct ScriptedRemoteStore {
    state: Mutex<RemoteState>,
}

#[derive(Debug, Default)]
struct RemoteState {
    next_id: usize,
    write_script: VecDeque<Result<String, RemoteError>>,
    batch_script: VecDeque<Result<(), RemoteError>>,
    other_calls_error: Option<RemoteError>,
    writes: Vec<(String, LocalId)>,
    batches: Vec<(String, ConversationUpdate)>,
    pages: HashMap<String, Vec<Message>>,
    load_calls: Vec<(String, Option<PageCursor>, usize)>,
    message_feeds: HashMap<String, mpsc::Sender<Vec<Message>>>,
    chat_feeds: HashMap<String, mpsc::Sender<Vec<Chat>>>,
    created_chats: Vec<Chat>,
    reset_unread_calls: Vec<(String, String)>,
    deleted_messages: Vec<(String, String)>,
    deleted_chats: Vec<String>,
}

impl ScriptedRemoteStore {
    fn state(&self) -> MutexGuard<'_, RemoteState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn script_write(&self, result: Result<String, RemoteError>) {
        self.state().write_script.push_back(result);
    }

    pub fn script_batch(&self, result: Result<(), RemoteError>) {
        self.state().batch_script.push_back(result);
    }

    pub fn fail_other_calls(&self, error: RemoteError) {
        self.state().other_calls_error = Some(error);
    }

    pub fn set_page(&self, chat_id: &str, messages: Vec<Message>) {
        self.state().pages.insert(chat_id.to_owned(), messages);
    }

    pub fn written_local_ids(&self) -> Vec<String> {
        self.state()
            .writes
            .iter()
            .map(|(_, local_id)| local_id.to_string())
            .collect()
    }

    pub fn batch_calls(&self) -> Vec<(String, ConversationUpdate)> {
        self.state().batches.clone()
    }

    pub fn load_calls(&self) -> Vec<(String, Option<PageCursor>, usize)> {
        self.state().load_calls.clone()
    }

    pub fn created_chats(&self) -> Vec<Chat> {
        self.state().created_chats.clone()
    }

    pub fn reset_unread_calls(&self) -> Vec<(String, String)> {
        self.state().reset_unread_calls.clone()
    }

    pub fn deleted_messages(&self) -> Vec<(String, String)> {
        self.state().deleted_messages.clone()
    }

    pub fn deleted_chats(&self) -> Vec<String> {
        self.state().deleted_chats.clone()
    }

    pub fn has_message_feed(&self, chat_id: &str) -> bool {
        self.state()
            .message_feeds
            .get(chat_id)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Pushes a live-feed snapshot for a chat; false when nobody listens.
    pub async fn push_messages(&self, chat_id: &str, messages: Vec<Message>) -> bool {
        let sender = self.state().message_feeds.get(chat_id).cloned();
        match sender {
            Some(sender) => sender.send(messages).await.is_ok(),
            None => false,
        }
    }

    pub async fn push_chats(&self, user_id: &str, chats: Vec<Chat>) -> bool {
        let sender = self.state().chat_feeds.get(user_id).cloned();
        match sender {
            Some(sender) => sender.send(chats).await.is_ok(),
            None => false,
        }
    }

    fn other_call(&self) -> Result<(), RemoteError> {
        match self.state().other_calls_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteStore for ScriptedRemoteStore {
    async fn write_message(
        &self,
        chat_id: &str,
        message: &PendingMessage,
    ) -> Result<String, RemoteError> {
        let mut state = self.state();
        state
            .writes
            .push((chat_id.to_owned(), message.local_id.clone()));

        match state.write_script.pop_front() {
            Some(result) => result,
            None => {
                state.next_id += 1;
                Ok(format!("srv{}", state.next_id))
            }
        }
    }

    async fn batch_update_conversation(
        &self,
        chat_id: &str,
        update: &ConversationUpdate,
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        state.batches.push((chat_id.to_owned(), update.clone()));
        state.batch_script.pop_front().unwrap_or(Ok(()))
    }

    async fn load_messages(
        &self,
        chat_id: &str,
        before: Option<&PageCursor>,
        limit: usize,
    ) -> Result<Vec<Message>, RemoteError> {
        self.other_call()?;
        let mut state = self.state();
        state
            .load_calls
            .push((chat_id.to_owned(), before.cloned(), limit));

        let mut page: Vec<Message> = state
            .pages
            .get(chat_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|m| {
                before.map_or(true, |before| {
                    PageCursor::of(m).map_or(true, |cursor| cursor < *before)
                })
            })
            .collect();
        page.sort_by_key(|m| {
            std::cmp::Reverse((m.created_at_ms(), m.id().map(str::to_owned)))
        });
        page.truncate(limit);
        Ok(page)
    }

    async fn subscribe_messages(
        &self,
        chat_id: &str,
    ) -> Result<mpsc::Receiver<Vec<Message>>, RemoteError> {
        self.other_call()?;
        let (tx, rx) = mpsc::channel(16);
        self.state().message_feeds.insert(chat_id.to_owned(), tx);
        Ok(rx)
    }

    async fn subscribe_chats(
        &self,
        user_id: &str,
    ) -> Result<mpsc::Receiver<Vec<Chat>>, RemoteError> {
        self.other_call()?;
        let (tx, rx) = mpsc::channel(16);
        self.state().chat_feeds.insert(user_id.to_owned(), tx);
        Ok(rx)
    }

    async fn reset_unread(&self, chat_id: &str, user_id: &str) -> Result<(), RemoteError> {
        self.other_call()?;
        self.state()
            .reset_unread_calls
            .push((chat_id.to_owned(), user_id.to_owned()));
        Ok(())
    }

    async fn create_chat(&self, participants: [&str; 2]) -> Result<Chat, RemoteError> {
        self.other_call()?;
        let mut state = self.state();
        let chat = Chat {
            id: format!("chat{}", state.created_chats.len() + 1),
            participants: participants.iter().map(|p| (*p).to_owned()).collect(),
            unread_counts: participants.iter().map(|p| ((*p).to_owned(), 0)).collect(),
            last_message: None,
            updated_at_ms: 1,
            created_at_ms: 1,
        };
        state.created_chats.push(chat.clone());
        Ok(chat)
    }

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), RemoteError> {
        self.other_call()?;
        self.state()
            .deleted_messages
            .push((chat_id.to_owned(), message_id.to_owned()));
        Ok(())
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<(), RemoteError> {
        self.other_call()?;
        self.state().deleted_chats.push(chat_id.to_owned());
        Ok(())
    }
}

//! Per-sign-in context that wires the delivery core together.
//!
//! A [`ChatSession`] is created once per signed-in user and owns the
//! reconciler, the view model and every live subscription. All inputs
//! (connectivity edges, live-feed snapshots, UI commands) arrive as
//! [`SessionEvent`]s on one channel and are handled one at a time, so no two
//! send attempts ever overlap.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::mpsc;

use crate::{
    domain::{
        chat::Chat,
        conversation_view::{ConversationView, DeliveryBadge},
        events::ConnectivityTransition,
        message::{now_unix_ms, LocalId, Message, MessageClock},
        outbox_queue::OutboxQueue,
    },
    infra::{config::DeliveryConfig, contracts::LocalCache},
    remote::{connectivity::ConnectivityMonitor, live_feed::LiveSubscription},
    usecases::{
        chat_actions::{self, ChatActionError},
        contracts::{RemoteError, RemoteStore},
        load_messages::{
            load_messages, LoadMessagesError, LoadMessagesOutput, LoadMessagesQuery,
            DEFAULT_MESSAGES_PAGE_SIZE,
        },
        reconciler::{
            DrainReport, MessageReconciler, RestoreReport, RetryError, RetryPolicy, SendOutcome,
        },
        send_message::{prepare_message, SendMessageCommand, SendMessageError},
    },
};

const SESSION_RESTORED: &str = "SESSION_RESTORED";
const SESSION_SIGNED_OUT: &str = "SESSION_SIGNED_OUT";
const SEND_REQUEST_REFUSED: &str = "SEND_REQUEST_REFUSED";
const RETRY_REQUEST_REFUSED: &str = "RETRY_REQUEST_REFUSED";
const STALE_SNAPSHOT_IGNORED: &str = "STALE_SNAPSHOT_IGNORED";
const CONNECTIVITY_LOST: &str = "CONNECTIVITY_LOST";

#[derive(Debug)]
pub enum SessionEvent {
    Connectivity(ConnectivityTransition),
    MessagesSnapshot {
        chat_id: String,
        messages: Vec<Message>,
    },
    ChatsSnapshot(Vec<Chat>),
    SendRequested(SendMessageCommand),
    RetryRequested(LocalId),
    SignOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFlow {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub retry: RetryPolicy,
    pub page_size: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            page_size: DEFAULT_MESSAGES_PAGE_SIZE,
        }
    }
}

impl From<&DeliveryConfig> for SessionSettings {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            retry: RetryPolicy {
                max_drain_attempts: config.max_drain_attempts,
            },
            page_size: config.page_size,
        }
    }
}

#[derive(Debug)]
struct ActiveConversation {
    chat_id: String,
    _feed: LiveSubscription,
}

#[derive(Debug)]
pub struct ChatSession<R, C> {
    user_id: String,
    remote: Arc<R>,
    connectivity: ConnectivityMonitor,
    reconciler: MessageReconciler<R, C>,
    view: ConversationView,
    clock: MessageClock,
    page_size: usize,
    has_more: HashMap<String, bool>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    chat_list_feed: Option<LiveSubscription>,
    active_conversation: Option<ActiveConversation>,
}

impl<R, C> ChatSession<R, C>
where
    R: RemoteStore,
    C: LocalCache,
{
    /// Creates the session and subscribes it to connectivity edges.
    ///
    /// The returned receiver must be fed to [`ChatSession::run`] (or drained
    /// through [`ChatSession::handle_event`]) for those edges to be acted on.
    pub fn start(
        user_id: impl Into<String>,
        remote: Arc<R>,
        cache: Arc<C>,
        connectivity: ConnectivityMonitor,
        settings: SessionSettings,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let listener_tx = events_tx.clone();
        connectivity.subscribe(move |transition| {
            listener_tx
                .send(SessionEvent::Connectivity(transition))
                .is_ok()
        });

        let session = Self {
            user_id: user_id.into(),
            reconciler: MessageReconciler::new(Arc::clone(&remote), cache, settings.retry),
            remote,
            connectivity,
            view: ConversationView::default(),
            clock: MessageClock::default(),
            page_size: settings.page_size,
            has_more: HashMap::new(),
            events_tx,
            chat_list_feed: None,
            active_conversation: None,
        };

        (session, events_rx)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Sender for UI commands; events are handled in the order they are sent.
    pub fn events(&self) -> mpsc::UnboundedSender<SessionEvent> {
        self.events_tx.clone()
    }

    pub fn view(&self) -> &ConversationView {
        &self.view
    }

    pub fn outbox(&self) -> &OutboxQueue {
        self.reconciler.outbox()
    }

    pub fn badge(&self, message: &Message) -> DeliveryBadge {
        self.view.badge(message, self.reconciler.outbox())
    }

    pub fn active_conversation(&self) -> Option<&str> {
        self.active_conversation
            .as_ref()
            .map(|active| active.chat_id.as_str())
    }

    pub fn has_more(&self, chat_id: &str) -> bool {
        self.has_more.get(chat_id).copied().unwrap_or(true)
    }

    /// Loads the cached state, then drains once if the network is up.
    pub async fn restore(&mut self) -> RestoreReport {
        let report = self
            .reconciler
            .restore(&self.user_id, &mut self.view, &mut self.clock)
            .await;

        tracing::info!(
            code = SESSION_RESTORED,
            chats = report.chats,
            message_pages = report.message_pages,
            queued = report.queued_messages,
            rejected = report.rejected_messages,
            stale_conversations = report.stale_conversations,
            connectivity = self.connectivity.status().as_label(),
            "session restored from cache"
        );

        if self.connectivity.is_reachable() {
            self.drain().await;
        }

        report
    }

    pub async fn send_message(
        &mut self,
        command: SendMessageCommand,
    ) -> Result<SendOutcome, SendMessageError> {
        let pending = prepare_message(command, &mut self.clock, now_unix_ms())?;
        let reachable = self.connectivity.is_reachable();

        let outcome = self
            .reconciler
            .submit(pending, reachable, &mut self.view)
            .await;
        if matches!(outcome, SendOutcome::Confirmed { .. }) {
            self.reconciler
                .record_chat_list(&self.user_id, &self.view)
                .await;
        }

        Ok(outcome)
    }

    pub async fn retry(&mut self, local_id: &LocalId) -> Result<SendOutcome, RetryError> {
        let reachable = self.connectivity.is_reachable();
        let outcome = self
            .reconciler
            .retry(local_id, reachable, &mut self.view)
            .await?;

        if matches!(outcome, SendOutcome::Confirmed { .. }) {
            self.reconciler
                .record_chat_list(&self.user_id, &self.view)
                .await;
        }

        Ok(outcome)
    }

    pub async fn drain(&mut self) -> DrainReport {
        let report = self.reconciler.drain(&mut self.view).await;
        if report.confirmed > 0 || report.repaired_conversations > 0 {
            self.reconciler
                .record_chat_list(&self.user_id, &self.view)
                .await;
        }
        report
    }

    /// Starts the user's chat list feed; each snapshot replaces the list.
    pub async fn open_chat_list(&mut self) -> Result<(), RemoteError> {
        let feed = self.remote.subscribe_chats(&self.user_id).await?;
        let tx = self.events_tx.clone();

        self.chat_list_feed = Some(LiveSubscription::start(
            format!("chats:{}", self.user_id),
            feed,
            move |chats| tx.send(SessionEvent::ChatsSnapshot(chats)).is_ok(),
        ));
        Ok(())
    }

    /// Makes `chat_id` the active conversation, replacing (and cancelling)
    /// the previous conversation's live feed.
    pub async fn open_conversation(&mut self, chat_id: &str) -> Result<(), RemoteError> {
        self.close_conversation();

        let feed = self.remote.subscribe_messages(chat_id).await?;
        let tx = self.events_tx.clone();
        let owned_chat_id = chat_id.to_owned();
        let subscription = LiveSubscription::start(
            format!("messages:{chat_id}"),
            feed,
            move |messages| {
                tx.send(SessionEvent::MessagesSnapshot {
                    chat_id: owned_chat_id.clone(),
                    messages,
                })
                .is_ok()
            },
        );

        self.active_conversation = Some(ActiveConversation {
            chat_id: chat_id.to_owned(),
            _feed: subscription,
        });
        Ok(())
    }

    pub fn close_conversation(&mut self) {
        self.active_conversation = None;
    }

    /// Loads the newest page, or with `more` the page before the oldest
    /// confirmed message already shown.
    pub async fn load_messages(
        &mut self,
        chat_id: &str,
        more: bool,
    ) -> Result<LoadMessagesOutput, LoadMessagesError> {
        let cursor = if more {
            self.view.oldest_confirmed_cursor(chat_id)
        } else {
            None
        };
        let query = LoadMessagesQuery::new(chat_id)
            .before(cursor)
            .with_limit(self.page_size);

        let output = load_messages(self.remote.as_ref(), query).await?;
        self.has_more.insert(chat_id.to_owned(), output.has_more);

        if more {
            self.reconciler
                .merge_live_messages(chat_id, output.messages.clone(), &mut self.view)
                .await;
        } else {
            self.reconciler
                .record_first_page(chat_id, output.messages.clone(), &mut self.view)
                .await;
        }

        Ok(output)
    }

    pub async fn delete_message(
        &mut self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<(), ChatActionError> {
        chat_actions::delete_message(self.remote.as_ref(), &mut self.view, chat_id, message_id)
            .await?;
        self.reconciler.persist_page(chat_id, &self.view).await;
        Ok(())
    }

    pub async fn delete_chat(&mut self, chat_id: &str) -> Result<(), ChatActionError> {
        chat_actions::delete_chat(self.remote.as_ref(), &mut self.view, chat_id).await?;

        if self.active_conversation() == Some(chat_id) {
            self.close_conversation();
        }
        self.has_more.remove(chat_id);
        self.reconciler.forget_chat(chat_id).await;
        self.reconciler
            .record_chat_list(&self.user_id, &self.view)
            .await;
        Ok(())
    }

    /// Returns `false` when only the local counter could be reset.
    pub async fn mark_as_read(&mut self, chat_id: &str) -> bool {
        let synced =
            chat_actions::mark_as_read(self.remote.as_ref(), &mut self.view, chat_id, &self.user_id)
                .await;
        self.reconciler
            .record_chat_list(&self.user_id, &self.view)
            .await;
        synced
    }

    pub async fn get_or_create_chat(&mut self, other_user_id: &str) -> Result<Chat, ChatActionError> {
        let chat = chat_actions::get_or_create_chat(
            self.remote.as_ref(),
            &mut self.view,
            &self.user_id,
            other_user_id,
        )
        .await?;
        self.reconciler
            .record_chat_list(&self.user_id, &self.view)
            .await;
        Ok(chat)
    }

    /// Tears the session down: cancels feeds, empties the outbox and removes
    /// this user's cache keys. Returns the number of keys cleared.
    pub async fn sign_out(&mut self) -> usize {
        self.chat_list_feed = None;
        self.close_conversation();

        let mut chat_ids: Vec<String> = self.view.chats().iter().map(|chat| chat.id.clone()).collect();
        chat_ids.extend(self.view.message_chat_ids());
        chat_ids.extend(self.has_more.keys().cloned());
        chat_ids.sort();
        chat_ids.dedup();

        let cleared = self.reconciler.clear(&self.user_id, &chat_ids).await;
        self.view.clear();
        self.has_more.clear();

        tracing::info!(
            code = SESSION_SIGNED_OUT,
            cleared_keys = cleared,
            "session signed out"
        );
        cleared
    }

    pub async fn handle_event(&mut self, event: SessionEvent) -> SessionFlow {
        match event {
            SessionEvent::Connectivity(ConnectivityTransition::BecameReachable) => {
                self.drain().await;
            }
            SessionEvent::Connectivity(ConnectivityTransition::BecameUnreachable) => {
                tracing::debug!(
                    code = CONNECTIVITY_LOST,
                    queued = self.reconciler.outbox().len(),
                    "new messages will be queued"
                );
            }
            SessionEvent::MessagesSnapshot { chat_id, messages } => {
                if self.active_conversation() == Some(chat_id.as_str()) {
                    self.reconciler
                        .merge_live_messages(&chat_id, messages, &mut self.view)
                        .await;
                } else {
                    tracing::debug!(
                        code = STALE_SNAPSHOT_IGNORED,
                        chat_id = %chat_id,
                        "snapshot for a closed conversation"
                    );
                }
            }
            SessionEvent::ChatsSnapshot(chats) => {
                if self.chat_list_feed.is_some() {
                    self.view.set_chats(chats);
                    self.reconciler
                        .record_chat_list(&self.user_id, &self.view)
                        .await;
                }
            }
            SessionEvent::SendRequested(command) => {
                if let Err(error) = self.send_message(command).await {
                    tracing::warn!(code = SEND_REQUEST_REFUSED, error = ?error, "send request refused");
                }
            }
            SessionEvent::RetryRequested(local_id) => {
                if let Err(error) = self.retry(&local_id).await {
                    tracing::warn!(
                        code = RETRY_REQUEST_REFUSED,
                        local_id = %local_id,
                        error = ?error,
                        "retry request refused"
                    );
                }
            }
            SessionEvent::SignOut => {
                self.sign_out().await;
                return SessionFlow::Stop;
            }
        }

        SessionFlow::Continue
    }

    /// Handles events until sign-out or until every sender is gone.
    pub async fn run(&mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            if self.handle_event(event).await == SessionFlow::Stop {
                break;
            }
        }
    }
}

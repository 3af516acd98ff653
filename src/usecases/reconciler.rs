//! Outbound message reconciliation.
//!
//! The reconciler owns the outbox and is the only writer of the local cache.
//! It moves each message through `Optimistic -> Attempting -> Confirmed` or
//! parks it as `Deferred` until the next reachable transition, and never
//! writes a message to the remote store again once a write succeeded.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        chat::{Chat, ConversationUpdate},
        conversation_view::ConversationView,
        message::{DeliveryState, LocalId, Message, MessageClock, MessageStatus, PendingMessage},
        outbox_queue::{AdmitOutcome, OutboxQueue},
    },
    infra::{
        cache_keys::{
            chat_list_key, message_page_key, OUTBOX_KEY, REJECTED_MESSAGES_KEY,
            STALE_CONVERSATIONS_KEY,
        },
        contracts::{read_json, write_json, LocalCache},
    },
    usecases::{
        contracts::{RemoteError, RemoteStore},
        outbox::Outbox,
    },
};

const MESSAGE_DELIVERY_DEFERRED: &str = "MESSAGE_DELIVERY_DEFERRED";
const MESSAGE_DELIVERY_CONFIRMED: &str = "MESSAGE_DELIVERY_CONFIRMED";
const MESSAGE_DELIVERY_FAILED: &str = "MESSAGE_DELIVERY_FAILED";
const MESSAGE_ALREADY_CONFIRMED: &str = "MESSAGE_ALREADY_CONFIRMED";
const MESSAGE_PARTIAL_COMMIT: &str = "MESSAGE_PARTIAL_COMMIT";
const CONVERSATION_REPAIR_DROPPED: &str = "CONVERSATION_REPAIR_DROPPED";
const OUTBOX_PERSIST_FAILED: &str = "OUTBOX_PERSIST_FAILED";
const CACHE_WRITE_FAILED: &str = "CACHE_WRITE_FAILED";
const CACHE_RESTORE_FAILED: &str = "CACHE_RESTORE_FAILED";
const OUTBOX_DRAIN_FINISHED: &str = "OUTBOX_DRAIN_FINISHED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Automatic drain attempts per queued message within one session.
    pub max_drain_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_drain_attempts: 5,
        }
    }
}

/// Why a delivery attempt did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// Connection dropped or timed out during the attempt.
    Unavailable,
    /// Store refused the write; only a manual retry sends it again.
    Rejected { reason: String },
    ChatMissing,
}

impl From<RemoteError> for DeliveryFailure {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Unavailable => Self::Unavailable,
            RemoteError::Rejected { reason } => Self::Rejected { reason },
            RemoteError::NotFound => Self::ChatMissing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Confirmed { server_id: String },
    /// The message is stored remotely but the conversation summary and unread
    /// counter are stale until the batch is repaired on a later drain.
    PartialCommit { server_id: String },
    /// Queued in the outbox until the next reachable transition.
    Deferred,
    Failed(DeliveryFailure),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub attempted: usize,
    pub confirmed: usize,
    pub failed: usize,
    /// Entries left alone because their automatic retry budget is spent.
    pub skipped: usize,
    pub repaired_conversations: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub chats: usize,
    pub message_pages: usize,
    pub queued_messages: usize,
    /// Queued entries the store refused before the restart.
    pub rejected_messages: usize,
    pub stale_conversations: usize,
}

/// A conversation batch that failed after its message was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleConversation {
    pub local_id: LocalId,
    pub chat_id: String,
    pub update: ConversationUpdate,
    #[serde(default)]
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    UnknownMessage,
    AlreadyConfirmed,
    /// Neither the view nor the outbox still knows the recipient.
    MissingRecipient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryPath {
    /// First attempt straight from the compose box.
    Direct,
    /// Attempt for an entry that is (or is being re-admitted to) the outbox.
    Queued,
}

#[derive(Debug)]
pub struct MessageReconciler<R, C> {
    remote: Arc<R>,
    cache: Arc<C>,
    outbox: Outbox<C>,
    policy: RetryPolicy,
    drain_attempts: HashMap<LocalId, u32>,
    /// Outlives the process so a refused entry is never auto-retried.
    rejected: BTreeSet<LocalId>,
    stale_conversations: Vec<StaleConversation>,
}

impl<R, C> MessageReconciler<R, C>
where
    R: RemoteStore,
    C: LocalCache,
{
    pub fn new(remote: Arc<R>, cache: Arc<C>, policy: RetryPolicy) -> Self {
        Self {
            outbox: Outbox::empty(Arc::clone(&cache)),
            remote,
            cache,
            policy,
            drain_attempts: HashMap::new(),
            rejected: BTreeSet::new(),
            stale_conversations: Vec::new(),
        }
    }

    /// Read-only view of the outbox, for badges.
    pub fn outbox(&self) -> &OutboxQueue {
        self.outbox.queue()
    }

    pub fn stale_conversations(&self) -> &[StaleConversation] {
        &self.stale_conversations
    }

    /// Loads everything a previous process left in the cache and projects the
    /// queued messages back into the view as failed (queued) entries.
    pub async fn restore(
        &mut self,
        user_id: &str,
        view: &mut ConversationView,
        clock: &mut MessageClock,
    ) -> RestoreReport {
        let mut report = RestoreReport::default();

        match read_json::<_, Vec<Chat>>(self.cache.as_ref(), &chat_list_key(user_id)).await {
            Ok(Some(chats)) => {
                report.chats = chats.len();
                view.set_chats(chats);
            }
            Ok(None) => {}
            Err(error) => log_restore_failure("chat_list", &error),
        }

        let chat_ids: Vec<String> = view.chats().iter().map(|chat| chat.id.clone()).collect();
        for chat_id in chat_ids {
            let key = message_page_key(&chat_id);
            match read_json::<_, Vec<Message>>(self.cache.as_ref(), &key).await {
                Ok(Some(page)) => {
                    let page = page.into_iter().filter(Message::is_consistent).collect();
                    view.merge_confirmed(&chat_id, page);
                    report.message_pages += 1;
                }
                Ok(None) => {}
                Err(error) => log_restore_failure("message_page", &error),
            }
        }

        match Outbox::load(Arc::clone(&self.cache)).await {
            Ok(outbox) => self.outbox = outbox,
            Err(error) => log_restore_failure(OUTBOX_KEY, &error),
        }
        for pending in self.outbox.snapshot() {
            clock.observe(&pending.sender_id, pending.created_at_ms);
            view.insert_optimistic(Message::optimistic(&pending));
            view.set_local_status(
                &pending.chat_id,
                &pending.local_id,
                DeliveryState::Deferred.display_status(),
            );
        }
        report.queued_messages = self.outbox.len();

        match read_json::<_, BTreeSet<LocalId>>(self.cache.as_ref(), REJECTED_MESSAGES_KEY).await {
            Ok(Some(rejected)) => {
                let stored = rejected.len();
                self.rejected = rejected
                    .into_iter()
                    .filter(|local_id| self.outbox.contains(local_id))
                    .collect();
                if self.rejected.len() != stored {
                    self.persist_rejected().await;
                }
            }
            Ok(None) => {}
            Err(error) => log_restore_failure(REJECTED_MESSAGES_KEY, &error),
        }
        report.rejected_messages = self.rejected.len();

        match read_json::<_, Vec<StaleConversation>>(self.cache.as_ref(), STALE_CONVERSATIONS_KEY)
            .await
        {
            Ok(Some(stale)) => self.stale_conversations = stale,
            Ok(None) => {}
            Err(error) => log_restore_failure(STALE_CONVERSATIONS_KEY, &error),
        }
        report.stale_conversations = self.stale_conversations.len();

        report
    }

    /// Shows the message optimistically and either delivers it now or queues it.
    pub async fn submit(
        &mut self,
        pending: PendingMessage,
        reachable: bool,
        view: &mut ConversationView,
    ) -> SendOutcome {
        view.insert_optimistic(Message::optimistic(&pending));

        if !reachable {
            return self.defer(pending, view).await;
        }

        self.attempt(&pending, DeliveryPath::Direct, view).await
    }

    /// Attempts every queued message once, oldest first, one at a time.
    pub async fn drain(&mut self, view: &mut ConversationView) -> DrainReport {
        let mut report = DrainReport {
            repaired_conversations: self.repair_stale_conversations(view).await,
            ..DrainReport::default()
        };

        for pending in self.outbox.snapshot() {
            if !self.outbox.contains(&pending.local_id) {
                continue;
            }

            if self.budget_spent(&pending.local_id) {
                report.skipped += 1;
                continue;
            }

            report.attempted += 1;
            match self.attempt(&pending, DeliveryPath::Queued, view).await {
                SendOutcome::Confirmed { .. } | SendOutcome::PartialCommit { .. } => {
                    report.confirmed += 1
                }
                SendOutcome::Failed(_) => report.failed += 1,
                SendOutcome::Deferred => {}
            }
        }

        tracing::info!(
            code = OUTBOX_DRAIN_FINISHED,
            attempted = report.attempted,
            confirmed = report.confirmed,
            failed = report.failed,
            skipped = report.skipped,
            repaired = report.repaired_conversations,
            still_queued = self.outbox.len(),
            "outbox drain finished"
        );

        report
    }

    /// Manual retry: re-admits a failed message and attempts it if reachable.
    pub async fn retry(
        &mut self,
        local_id: &LocalId,
        reachable: bool,
        view: &mut ConversationView,
    ) -> Result<SendOutcome, RetryError> {
        let rebuilt = match view.find_any(local_id) {
            Some(message) if message.is_confirmed() => return Err(RetryError::AlreadyConfirmed),
            Some(message) => message.to_pending(),
            None if self.outbox.contains(local_id) => None,
            None => return Err(RetryError::UnknownMessage),
        };

        let pending = rebuilt
            .or_else(|| self.outbox.queue().get(local_id).cloned())
            .ok_or(RetryError::MissingRecipient)?;

        self.drain_attempts.remove(local_id);
        if self.rejected.remove(local_id) {
            self.persist_rejected().await;
        }
        view.insert_optimistic(Message::optimistic(&pending));

        if !reachable {
            return Ok(self.defer(pending, view).await);
        }

        self.admit(pending.clone()).await;
        Ok(self.attempt(&pending, DeliveryPath::Queued, view).await)
    }

    /// Merges a live-feed snapshot. Confirmed records win over optimistic
    /// entries, and a queued message the store already has leaves the outbox
    /// without being written again.
    pub async fn merge_live_messages(
        &mut self,
        chat_id: &str,
        messages: Vec<Message>,
        view: &mut ConversationView,
    ) {
        let superseded = view.merge_confirmed(chat_id, messages);
        for local_id in &superseded {
            if self.outbox.contains(local_id) {
                tracing::info!(
                    code = MESSAGE_ALREADY_CONFIRMED,
                    local_id = %local_id,
                    chat_id,
                    "live feed confirmed a queued message"
                );
                self.forget(local_id).await;
            }
        }

        self.persist_page(chat_id, view).await;
    }

    /// Replaces the confirmed entries of a chat with a freshly loaded first page.
    pub async fn record_first_page(
        &mut self,
        chat_id: &str,
        page: Vec<Message>,
        view: &mut ConversationView,
    ) {
        let superseded = view.replace_confirmed(chat_id, page);
        for local_id in &superseded {
            self.forget(local_id).await;
        }
        self.persist_page(chat_id, view).await;
    }

    pub async fn record_chat_list(&self, user_id: &str, view: &ConversationView) {
        self.write_best_effort(&chat_list_key(user_id), view.chats())
            .await;
    }

    pub async fn persist_page(&self, chat_id: &str, view: &ConversationView) {
        self.write_best_effort(&message_page_key(chat_id), &view.confirmed_messages(chat_id))
            .await;
    }

    pub async fn forget_chat(&self, chat_id: &str) {
        if let Err(error) = self.cache.remove(&message_page_key(chat_id)).await {
            tracing::warn!(code = CACHE_WRITE_FAILED, chat_id, error = %error, "failed to drop cached message page");
        }
    }

    /// Sign-out teardown: empties the outbox and removes every cache key
    /// this user's session wrote. Returns how many keys were cleared.
    pub async fn clear(&mut self, user_id: &str, chat_ids: &[String]) -> usize {
        self.drain_attempts.clear();
        self.rejected.clear();
        self.stale_conversations.clear();

        let mut cleared = 0;
        match self.outbox.clear().await {
            Ok(()) => cleared += 1,
            Err(error) => {
                tracing::warn!(code = OUTBOX_PERSIST_FAILED, error = %error, "failed to clear outbox")
            }
        }

        let mut keys = vec![
            STALE_CONVERSATIONS_KEY.to_owned(),
            REJECTED_MESSAGES_KEY.to_owned(),
            chat_list_key(user_id),
        ];
        keys.extend(chat_ids.iter().map(|chat_id| message_page_key(chat_id)));
        for key in keys {
            match self.cache.remove(&key).await {
                Ok(()) => cleared += 1,
                Err(error) => {
                    tracing::warn!(code = CACHE_WRITE_FAILED, key = %key, error = %error, "failed to clear cache key")
                }
            }
        }

        cleared
    }

    async fn attempt(
        &mut self,
        pending: &PendingMessage,
        path: DeliveryPath,
        view: &mut ConversationView,
    ) -> SendOutcome {
        let chat_id = pending.chat_id.as_str();
        let local_id = &pending.local_id;

        let known_server_id = view
            .find(chat_id, local_id)
            .and_then(Message::id)
            .map(str::to_owned);
        if let Some(server_id) = known_server_id {
            tracing::info!(
                code = MESSAGE_ALREADY_CONFIRMED,
                local_id = %local_id,
                chat_id,
                "skipping write for a message the store already confirmed"
            );
            self.forget(local_id).await;
            return SendOutcome::Confirmed { server_id };
        }

        view.set_local_status(
            chat_id,
            local_id,
            DeliveryState::Attempting.display_status(),
        );

        let server_id = match self.remote.write_message(chat_id, pending).await {
            Ok(server_id) => server_id,
            Err(error) => return self.fail(pending, path, error.into(), view).await,
        };

        view.confirm(chat_id, local_id, &server_id);
        self.persist_page(chat_id, view).await;
        self.forget(local_id).await;

        let update = ConversationUpdate::for_message(pending);
        match self
            .remote
            .batch_update_conversation(chat_id, &update)
            .await
        {
            Ok(()) => {
                view.apply_conversation_update(chat_id, &update);
                tracing::info!(
                    code = MESSAGE_DELIVERY_CONFIRMED,
                    state = DeliveryState::Confirmed.as_label(),
                    local_id = %local_id,
                    chat_id,
                    server_id = %server_id,
                    "message delivered"
                );
                SendOutcome::Confirmed { server_id }
            }
            Err(error) => {
                tracing::warn!(
                    code = MESSAGE_PARTIAL_COMMIT,
                    local_id = %local_id,
                    chat_id,
                    server_id = %server_id,
                    error = %error,
                    "message stored but conversation summary update failed"
                );
                self.stale_conversations.push(StaleConversation {
                    local_id: local_id.clone(),
                    chat_id: chat_id.to_owned(),
                    update,
                    attempts: 0,
                });
                self.persist_stale_conversations().await;
                SendOutcome::PartialCommit { server_id }
            }
        }
    }

    async fn defer(&mut self, pending: PendingMessage, view: &mut ConversationView) -> SendOutcome {
        let chat_id = pending.chat_id.clone();
        let local_id = pending.local_id.clone();

        self.admit(pending).await;
        view.set_local_status(
            &chat_id,
            &local_id,
            DeliveryState::Deferred.display_status(),
        );

        tracing::info!(
            code = MESSAGE_DELIVERY_DEFERRED,
            state = DeliveryState::Deferred.as_label(),
            local_id = %local_id,
            chat_id = %chat_id,
            queued = self.outbox.len(),
            "message queued until connectivity returns"
        );

        SendOutcome::Deferred
    }

    async fn fail(
        &mut self,
        pending: &PendingMessage,
        path: DeliveryPath,
        failure: DeliveryFailure,
        view: &mut ConversationView,
    ) -> SendOutcome {
        view.set_local_status(&pending.chat_id, &pending.local_id, MessageStatus::Failed);

        let attempts = match path {
            DeliveryPath::Direct => 0,
            DeliveryPath::Queued => {
                let limit = self.policy.max_drain_attempts;
                let attempts = self
                    .drain_attempts
                    .entry(pending.local_id.clone())
                    .or_insert(0);
                *attempts = match failure {
                    DeliveryFailure::Rejected { .. } => limit,
                    _ => attempts.saturating_add(1),
                };
                *attempts
            }
        };

        if path == DeliveryPath::Queued
            && matches!(failure, DeliveryFailure::Rejected { .. })
            && self.rejected.insert(pending.local_id.clone())
        {
            self.persist_rejected().await;
        }

        tracing::warn!(
            code = MESSAGE_DELIVERY_FAILED,
            local_id = %pending.local_id,
            chat_id = %pending.chat_id,
            ?path,
            attempts,
            failure = ?failure,
            "message delivery failed"
        );

        SendOutcome::Failed(failure)
    }

    async fn repair_stale_conversations(&mut self, view: &mut ConversationView) -> usize {
        if self.stale_conversations.is_empty() {
            return 0;
        }

        let mut repaired = 0;
        let mut remaining = Vec::new();
        for mut stale in std::mem::take(&mut self.stale_conversations) {
            match self
                .remote
                .batch_update_conversation(&stale.chat_id, &stale.update)
                .await
            {
                Ok(()) => {
                    view.apply_conversation_update(&stale.chat_id, &stale.update);
                    repaired += 1;
                }
                Err(RemoteError::Unavailable)
                    if stale.attempts.saturating_add(1) < self.policy.max_drain_attempts =>
                {
                    stale.attempts += 1;
                    remaining.push(stale);
                }
                Err(error) => {
                    tracing::warn!(
                        code = CONVERSATION_REPAIR_DROPPED,
                        local_id = %stale.local_id,
                        chat_id = %stale.chat_id,
                        error = %error,
                        "giving up on conversation summary repair"
                    );
                }
            }
        }

        self.stale_conversations = remaining;
        self.persist_stale_conversations().await;
        repaired
    }

    async fn admit(&mut self, pending: PendingMessage) {
        let local_id = pending.local_id.clone();
        match self.outbox.admit(pending).await {
            Ok(AdmitOutcome::Admitted) | Ok(AdmitOutcome::AlreadyQueued) => {}
            Err(error) => tracing::warn!(
                code = OUTBOX_PERSIST_FAILED,
                local_id = %local_id,
                error = %error,
                "outbox admit was not persisted"
            ),
        }
    }

    async fn forget(&mut self, local_id: &LocalId) {
        self.drain_attempts.remove(local_id);
        if self.rejected.remove(local_id) {
            self.persist_rejected().await;
        }
        if let Err(error) = self.outbox.remove(local_id).await {
            tracing::warn!(
                code = OUTBOX_PERSIST_FAILED,
                local_id = %local_id,
                error = %error,
                "outbox removal was not persisted"
            );
        }
    }

    fn budget_spent(&self, local_id: &LocalId) -> bool {
        self.rejected.contains(local_id)
            || self
                .drain_attempts
                .get(local_id)
                .is_some_and(|attempts| *attempts >= self.policy.max_drain_attempts)
    }

    async fn persist_rejected(&self) {
        if self.rejected.is_empty() {
            if let Err(error) = self.cache.remove(REJECTED_MESSAGES_KEY).await {
                tracing::warn!(code = CACHE_WRITE_FAILED, error = %error, "failed to clear rejected messages");
            }
            return;
        }

        self.write_best_effort(REJECTED_MESSAGES_KEY, &self.rejected)
            .await;
    }

    async fn persist_stale_conversations(&self) {
        if self.stale_conversations.is_empty() {
            if let Err(error) = self.cache.remove(STALE_CONVERSATIONS_KEY).await {
                tracing::warn!(code = CACHE_WRITE_FAILED, error = %error, "failed to clear stale conversations");
            }
            return;
        }

        self.write_best_effort(STALE_CONVERSATIONS_KEY, &self.stale_conversations)
            .await;
    }

    async fn write_best_effort<T>(&self, key: &str, value: &T)
    where
        T: Serialize + ?Sized + Sync,
    {
        if let Err(error) = write_json(self.cache.as_ref(), key, value).await {
            tracing::warn!(
                code = CACHE_WRITE_FAILED,
                key,
                error = %error,
                "cache write failed; keeping in-memory state"
            );
        }
    }
}

fn log_restore_failure(what: &str, error: &crate::infra::error::CacheError) {
    tracing::warn!(
        code = CACHE_RESTORE_FAILED,
        what,
        error = %error,
        "failed to restore cached state"
    );
}

//! Key names used in the local cache.

pub const OUTBOX_KEY: &str = "pending_messages";
pub const STALE_CONVERSATIONS_KEY: &str = "pending_conversation_updates";
/// Outbox entries the store refused; they wait for a manual retry.
pub const REJECTED_MESSAGES_KEY: &str = "rejected_pending_messages";

const CHATS_PREFIX: &str = "chats_cache_";
const MESSAGES_PREFIX: &str = "messages_cache_";

pub fn chat_list_key(user_id: &str) -> String {
    format!("{CHATS_PREFIX}{user_id}")
}

pub fn message_page_key(chat_id: &str) -> String {
    format!("{MESSAGES_PREFIX}{chat_id}")
}

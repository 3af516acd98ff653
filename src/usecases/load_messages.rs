use crate::{
    domain::message::{Message, PageCursor},
    usecases::contracts::{RemoteError, RemoteStore},
};

pub const DEFAULT_MESSAGES_PAGE_SIZE: usize = 50;
const MAX_MESSAGES_PAGE_SIZE: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadMessagesQuery {
    pub chat_id: String,
    /// Only messages strictly older than this are returned; `None` loads the newest page.
    pub before: Option<PageCursor>,
    pub limit: usize,
}

impl LoadMessagesQuery {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            before: None,
            limit: DEFAULT_MESSAGES_PAGE_SIZE,
        }
    }

    pub fn before(mut self, cursor: Option<PageCursor>) -> Self {
        self.before = cursor;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn normalized_limit(&self) -> usize {
        match self.limit {
            0 => DEFAULT_MESSAGES_PAGE_SIZE,
            value if value > MAX_MESSAGES_PAGE_SIZE => MAX_MESSAGES_PAGE_SIZE,
            value => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadMessagesOutput {
    pub messages: Vec<Message>,
    /// A full page came back, so older messages may exist.
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadMessagesError {
    TemporarilyUnavailable,
    Rejected,
    ChatNotFound,
}

pub async fn load_messages<R>(
    source: &R,
    query: LoadMessagesQuery,
) -> Result<LoadMessagesOutput, LoadMessagesError>
where
    R: RemoteStore + ?Sized,
{
    let limit = query.normalized_limit();
    let page = source
        .load_messages(&query.chat_id, query.before.as_ref(), limit)
        .await
        .map_err(map_source_error)?;

    // A full page means more may follow, even if some records get dropped below.
    let has_more = page.len() >= limit;
    let messages = page
        .into_iter()
        .filter(|message| message.is_confirmed() && message.is_consistent())
        .collect();

    Ok(LoadMessagesOutput { messages, has_more })
}

fn map_source_error(error: RemoteError) -> LoadMessagesError {
    match error {
        RemoteError::Unavailable => LoadMessagesError::TemporarilyUnavailable,
        RemoteError::Rejected { .. } => LoadMessagesError::Rejected,
        RemoteError::NotFound => LoadMessagesError::ChatNotFound,
    }
}

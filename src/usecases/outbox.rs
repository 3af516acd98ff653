use std::sync::Arc;

use thiserror::Error;

use crate::{
    domain::{
        message::{LocalId, PendingMessage},
        outbox_queue::{AdmitOutcome, OutboxQueue},
    },
    infra::{
        cache_keys::OUTBOX_KEY,
        contracts::{read_json, write_json, LocalCache},
        error::CacheError,
    },
};

#[derive(Debug, Error)]
pub enum OutboxError {
    /// The in-memory change was applied but could not be made durable.
    #[error("outbox changed in memory but was not persisted: {0}")]
    Persist(#[source] CacheError),
}

/// Durable outbox: an [`OutboxQueue`] that writes itself to the local cache
/// after every mutation, before the mutating call returns.
#[derive(Debug)]
pub struct Outbox<C> {
    queue: OutboxQueue,
    cache: Arc<C>,
}

impl<C> Outbox<C>
where
    C: LocalCache,
{
    pub fn empty(cache: Arc<C>) -> Self {
        Self {
            queue: OutboxQueue::default(),
            cache,
        }
    }

    /// Restores the outbox stored by a previous process.
    pub async fn load(cache: Arc<C>) -> Result<Self, CacheError> {
        let entries: Vec<PendingMessage> = read_json(cache.as_ref(), OUTBOX_KEY)
            .await?
            .unwrap_or_default();

        Ok(Self {
            queue: OutboxQueue::from_entries(entries),
            cache,
        })
    }

    pub fn queue(&self) -> &OutboxQueue {
        &self.queue
    }

    pub fn snapshot(&self) -> Vec<PendingMessage> {
        self.queue.snapshot()
    }

    pub fn contains(&self, local_id: &LocalId) -> bool {
        self.queue.contains(local_id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queues a message at the tail. Admitting a local id twice is a no-op.
    pub async fn admit(&mut self, pending: PendingMessage) -> Result<AdmitOutcome, OutboxError> {
        let outcome = self.queue.admit(pending);
        if outcome == AdmitOutcome::Admitted {
            self.persist().await?;
        }
        Ok(outcome)
    }

    /// Drops a message; absent ids are ignored.
    pub async fn remove(&mut self, local_id: &LocalId) -> Result<bool, OutboxError> {
        let removed = self.queue.remove(local_id);
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    pub async fn clear(&mut self) -> Result<(), OutboxError> {
        self.queue.clear();
        self.cache
            .remove(OUTBOX_KEY)
            .await
            .map_err(OutboxError::Persist)
    }

    async fn persist(&self) -> Result<(), OutboxError> {
        write_json(self.cache.as_ref(), OUTBOX_KEY, self.queue.entries())
            .await
            .map_err(OutboxError::Persist)
    }
}

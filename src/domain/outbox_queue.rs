use super::message::{LocalId, PendingMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    Admitted,
    /// The local id was already queued; nothing changed.
    AlreadyQueued,
}

/// Ordered, duplicate-free record of messages still awaiting delivery.
///
/// Insertion order is send order. Persistence lives one layer up in
/// `usecases::outbox`; this type only owns the ordering rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboxQueue {
    entries: Vec<PendingMessage>,
}

impl OutboxQueue {
    /// Rebuilds a queue from a stored image, keeping the first entry per local id.
    pub fn from_entries(entries: Vec<PendingMessage>) -> Self {
        let mut queue = Self::default();
        for entry in entries {
            queue.admit(entry);
        }
        queue
    }

    pub fn admit(&mut self, pending: PendingMessage) -> AdmitOutcome {
        if self.contains(&pending.local_id) {
            return AdmitOutcome::AlreadyQueued;
        }

        self.entries.push(pending);
        AdmitOutcome::Admitted
    }

    pub fn remove(&mut self, local_id: &LocalId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| &entry.local_id != local_id);
        self.entries.len() != before
    }

    pub fn contains(&self, local_id: &LocalId) -> bool {
        self.entries.iter().any(|entry| &entry.local_id == local_id)
    }

    pub fn get(&self, local_id: &LocalId) -> Option<&PendingMessage> {
        self.entries.iter().find(|entry| &entry.local_id == local_id)
    }

    pub fn snapshot(&self) -> Vec<PendingMessage> {
        self.entries.clone()
    }

    pub fn entries(&self) -> &[PendingMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

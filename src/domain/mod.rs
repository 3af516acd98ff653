//! Domain layer: core entities and business rules.

pub mod chat;
pub mod conversation_view;
pub mod events;
pub mod message;
pub mod outbox_queue;

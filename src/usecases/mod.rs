//! Use case layer: delivery workflows and session orchestration.

pub mod bootstrap;
pub mod chat_actions;
pub mod context;
pub mod contracts;
pub mod load_messages;
pub mod logout;
pub mod outbox;
pub mod reconciler;
pub mod send_message;
pub mod session;

//! Offline-tolerant outbound message delivery for a chat client.
//!
//! Messages are shown optimistically, queued durably while the device is
//! offline, drained in order when connectivity returns, and reconciled with
//! the confirmed records the remote store pushes back.

pub mod domain;
pub mod infra;
pub mod remote;
#[cfg(test)]
mod test_support;
pub mod usecases;

//! Infrastructure layer: adapters for config, storage, and OS integrations.

pub mod cache_keys;
pub mod cache_lock;
pub mod config;
pub mod contracts;
pub mod error;
pub mod file_cache;
pub mod logging;
pub mod storage_layout;
#[cfg(test)]
pub mod stubs;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use anyhow::Result;
use async_trait::async_trait;

use crate::infra::{
    config::AppConfig,
    contracts::{ConfigAdapter, LocalCache},
    error::CacheError,
};

#[derive(Debug, Clone, Default)]
pub struct StubConfigAdapter;

impl ConfigAdapter for StubConfigAdapter {
    fn load(&self) -> Result<AppConfig> {
        Ok(AppConfig::default())
    }
}

/// Process-local cache for tests; survives "restarts" when the same
/// instance is handed to a fresh session.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl InMemoryCache {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    fn check_writable(&self, key: &str) -> Result<(), CacheError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Io {
                key: key.to_owned(),
                source: std::io::Error::other("injected write failure"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LocalCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        self.check_writable(key)?;
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_owned(), value.to_vec());
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.check_writable(key)?;
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_config_returns_defaults() {
        let adapter = StubConfigAdapter;
        let config = adapter.load().expect("stub config must load");

        assert_eq!(config, AppConfig::default());
    }

    #[tokio::test]
    async fn injected_failure_rejects_writes_but_keeps_reads() {
        let cache = InMemoryCache::default();
        cache.set("k", b"v").await.expect("set should work");
        cache.fail_writes(true);

        assert!(cache.set("k", b"w").await.is_err());
        assert!(cache.remove("k").await.is_err());
        assert_eq!(cache.get("k").await.expect("get works"), Some(b"v".to_vec()));
    }
}

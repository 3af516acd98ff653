use crate::infra::{error::AppError, file_cache::FileCache};

const LOGOUT_CACHE_CLEARED: &str = "LOGOUT_CACHE_CLEARED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutOutcome {
    pub removed_entries: usize,
}

/// Sign-out teardown for a session that is not running: drops the outbox,
/// pending summary repairs, chat lists and message pages from disk.
pub async fn logout_and_reset(cache: &FileCache) -> Result<LogoutOutcome, AppError> {
    let removed_entries = cache.clear().await?;

    tracing::info!(
        code = LOGOUT_CACHE_CLEARED,
        removed_entries,
        cache_dir = %cache.root().display(),
        "local cache cleared"
    );

    Ok(LogoutOutcome { removed_entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{cache_keys::OUTBOX_KEY, contracts::LocalCache};

    #[tokio::test]
    async fn logout_removes_cached_entries() {
        let dir = tempfile::tempdir().expect("tempdir should be creatable");
        let cache = FileCache::new(dir.path());
        cache.set(OUTBOX_KEY, b"[]").await.expect("write should work");
        cache
            .set("chats_cache_alice", b"[]")
            .await
            .expect("write should work");

        let outcome = logout_and_reset(&cache).await.expect("logout should succeed");

        assert_eq!(outcome.removed_entries, 2);
        assert_eq!(cache.get(OUTBOX_KEY).await.expect("read should work"), None);
    }

    #[tokio::test]
    async fn logout_is_idempotent_when_cache_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir should be creatable");
        let cache = FileCache::new(dir.path().join("never-created"));

        let outcome = logout_and_reset(&cache).await.expect("logout should succeed");

        assert_eq!(outcome.removed_entries, 0);
    }
}

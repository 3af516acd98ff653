use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::infra::{config::AppConfig, error::CacheError};

pub trait ConfigAdapter {
    fn load(&self) -> Result<AppConfig>;
}

/// Durable on-device key/value store.
///
/// Calls may suspend. Writes to different keys are independent: there is no
/// transaction spanning two keys.
#[async_trait]
pub trait LocalCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError>;
    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// Reads a JSON value stored under `key`.
pub async fn read_json<C, T>(cache: &C, key: &str) -> Result<Option<T>, CacheError>
where
    C: LocalCache + ?Sized,
    T: DeserializeOwned,
{
    let Some(raw) = cache.get(key).await? else {
        return Ok(None);
    };

    serde_json::from_slice(&raw)
        .map(Some)
        .map_err(|source| CacheError::Decode {
            key: key.to_owned(),
            source,
        })
}

/// Stores `value` as JSON under `key`.
pub async fn write_json<C, T>(cache: &C, key: &str, value: &T) -> Result<(), CacheError>
where
    C: LocalCache + ?Sized,
    T: Serialize + ?Sized,
{
    let raw = serde_json::to_vec(value).map_err(|source| CacheError::Encode {
        key: key.to_owned(),
        source,
    })?;

    cache.set(key, &raw).await
}

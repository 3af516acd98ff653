use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::fs;

use crate::infra::{contracts::LocalCache, error::CacheError};

const ENTRY_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// Local cache backed by one file per key.
///
/// Values are written to a sibling temp file and renamed into place, so a
/// crash mid-write leaves either the old or the new value, never a torn one.
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Removes every stored entry and returns how many were deleted.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(0),
            Err(source) => return Err(io_error("*", source)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| io_error("*", source))?
        {
            let path = entry.path();
            let is_entry = path
                .extension()
                .is_some_and(|ext| ext == ENTRY_EXTENSION || ext == TEMP_EXTENSION);
            if !is_entry {
                continue;
            }

            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(source) if source.kind() == ErrorKind::NotFound => {}
                Err(source) => return Err(io_error(&path.to_string_lossy(), source)),
            }
        }

        Ok(removed)
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}.{ENTRY_EXTENSION}", encode_key(key)))
    }
}

#[async_trait]
impl LocalCache for FileCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match fs::read(self.entry_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(io_error(key, source)),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| io_error(key, source))?;

        let path = self.entry_path(key);
        let temp_path = path.with_extension(TEMP_EXTENSION);
        fs::write(&temp_path, value)
            .await
            .map_err(|source| io_error(key, source))?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(|source| io_error(key, source))
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(io_error(key, source)),
        }
    }
}

/// Maps a key to a file stem, escaping every byte outside `[A-Za-z0-9_-]`
/// as `%xx` so distinct keys never share a file.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            encoded.push(char::from(byte));
        } else {
            encoded.push('%');
            encoded.push_str(&hex::encode([byte]));
        }
    }
    encoded
}

fn io_error(key: &str, source: std::io::Error) -> CacheError {
    CacheError::Io {
        key: key.to_owned(),
        source,
    }
}

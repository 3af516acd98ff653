use std::{
    fs::{File, OpenOptions},
    io::ErrorKind,
    path::PathBuf,
};

use fs2::FileExt;

use crate::infra::error::AppError;

/// Exclusive hold on the cache directory for one process.
///
/// The outbox assumes a single delivery timeline per device; a second
/// process draining the same cache would break that.
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    pub fn acquire(path: PathBuf) -> Result<Self, AppError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| AppError::CacheLock {
                path: path.clone(),
                source,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file, path }),
            Err(source) if source.kind() == ErrorKind::WouldBlock => {
                Err(AppError::CacheBusy { path })
            }
            Err(source) if source.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                Err(AppError::CacheBusy { path })
            }
            Err(source) => Err(AppError::CacheLock { path, source }),
        }
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(error) = FileExt::unlock(&self.file) {
            tracing::warn!(
                path = %self.path.display(),
                error = %error,
                "failed to release cache lock"
            );
        }
    }
}

use std::{env, fs, path::PathBuf};

use crate::infra::{config::CacheConfig, error::AppError};

const APP_DIR_NAME: &str = "rchat";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl StorageLayout {
    pub fn resolve(cache: &CacheConfig) -> Result<Self, AppError> {
        let config_base = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(dirs::config_dir)
            .ok_or_else(|| AppError::StoragePathResolution {
                details: "unable to resolve config base directory (XDG_CONFIG_HOME/platform)"
                    .into(),
            })?;

        let config_dir = config_base.join(APP_DIR_NAME);
        let cache_dir = cache
            .dir
            .clone()
            .unwrap_or_else(|| config_dir.join("cache"));

        Ok(Self {
            config_dir,
            cache_dir,
        })
    }

    pub fn ensure_dirs(&self) -> Result<(), AppError> {
        for dir in [&self.config_dir, &self.cache_dir] {
            fs::create_dir_all(dir).map_err(|source| AppError::StorageDirCreate {
                path: dir.clone(),
                source,
            })?;
        }

        Ok(())
    }

    pub fn cache_lock_file(&self) -> PathBuf {
        self.cache_dir.join(".lock")
    }
}

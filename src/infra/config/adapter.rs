use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::Result;

use crate::infra::{
    config::{load, AppConfig},
    contracts::ConfigAdapter,
};

const CONFIG_PATH_ENV: &str = "RCHAT_CONFIG";

/// Loads config from the CLI path, then `RCHAT_CONFIG`, then `./config.toml`.
#[derive(Debug, Clone, Default)]
pub struct FileConfigAdapter {
    path: Option<PathBuf>,
}

impl FileConfigAdapter {
    pub fn new(path: Option<&Path>) -> Self {
        Self {
            path: path
                .map(Path::to_path_buf)
                .or_else(|| env::var_os(CONFIG_PATH_ENV).map(PathBuf::from)),
        }
    }
}

impl ConfigAdapter for FileConfigAdapter {
    fn load(&self) -> Result<AppConfig> {
        Ok(load(self.path.as_deref())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::env_lock;

    #[test]
    fn explicit_path_wins_over_env() {
        let _guard = env_lock();
        let old = env::var_os(CONFIG_PATH_ENV);
        // SAFETY: env is guarded by process-wide test mutex.
        unsafe { env::set_var(CONFIG_PATH_ENV, "from-env.toml") };

        let explicit = FileConfigAdapter::new(Some(Path::new("explicit.toml")));
        let from_env = FileConfigAdapter::new(None);

        assert_eq!(explicit.path.as_deref(), Some(Path::new("explicit.toml")));
        assert_eq!(from_env.path.as_deref(), Some(Path::new("from-env.toml")));

        match old {
            // SAFETY: restoring env while guard is held.
            Some(value) => unsafe { env::set_var(CONFIG_PATH_ENV, value) },
            // SAFETY: restoring env while guard is held.
            None => unsafe { env::remove_var(CONFIG_PATH_ENV) },
        }
    }
}

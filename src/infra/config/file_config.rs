use std::path::PathBuf;

use serde::Deserialize;

use crate::infra::config::{AppConfig, CacheConfig, DeliveryConfig, LogConfig};

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub logging: Option<FileLogConfig>,
    pub cache: Option<FileCacheConfig>,
    pub delivery: Option<FileDeliveryConfig>,
}

impl FileConfig {
    pub fn merge_into(self, config: &mut AppConfig) {
        if let Some(logging) = self.logging {
            logging.merge_into(&mut config.logging);
        }

        if let Some(cache) = self.cache {
            cache.merge_into(&mut config.cache);
        }

        if let Some(delivery) = self.delivery {
            delivery.merge_into(&mut config.delivery);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileLogConfig {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

impl FileLogConfig {
    fn merge_into(self, config: &mut LogConfig) {
        if let Some(level) = self.level {
            config.level = level;
        }

        if let Some(file) = self.file {
            config.file = Some(file);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileCacheConfig {
    pub dir: Option<PathBuf>,
}

impl FileCacheConfig {
    fn merge_into(self, config: &mut CacheConfig) {
        if let Some(dir) = self.dir {
            config.dir = Some(dir);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileDeliveryConfig {
    pub max_drain_attempts: Option<u32>,
    pub page_size: Option<usize>,
}

impl FileDeliveryConfig {
    fn merge_into(self, config: &mut DeliveryConfig) {
        if let Some(attempts) = self.max_drain_attempts {
            config.max_drain_attempts = attempts.max(1);
        }

        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }
    }
}

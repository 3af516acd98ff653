use crate::infra::{config::AppConfig, logging::LoggingGuard, storage_layout::StorageLayout};

#[derive(Debug)]
pub struct AppContext {
    pub config: AppConfig,
    pub layout: StorageLayout,
    _logging: Option<LoggingGuard>,
}

impl AppContext {
    pub fn new(config: AppConfig, layout: StorageLayout) -> Self {
        Self {
            config,
            layout,
            _logging: None,
        }
    }

    pub fn with_logging(mut self, guard: LoggingGuard) -> Self {
        self._logging = Some(guard);
        self
    }
}

use std::path::Path;

use crate::{
    infra::{
        self, config::FileConfigAdapter, contracts::ConfigAdapter, error::AppError,
        storage_layout::StorageLayout,
    },
    usecases::context::AppContext,
};

pub fn bootstrap(config_path: Option<&Path>) -> Result<AppContext, AppError> {
    let context = build_context(config_path)?;
    let guard = infra::logging::init(&context.config.logging)?;

    Ok(context.with_logging(guard))
}

fn build_context(config_path: Option<&Path>) -> Result<AppContext, AppError> {
    let config = load_config(&FileConfigAdapter::new(config_path))?;
    let layout = StorageLayout::resolve(&config.cache)?;

    Ok(AppContext::new(config, layout))
}

fn load_config(adapter: &dyn ConfigAdapter) -> Result<infra::config::AppConfig, AppError> {
    Ok(adapter.load()?)
}

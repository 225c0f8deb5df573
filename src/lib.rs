pub mod config;
pub mod controller;
pub mod database;
mod error;
pub mod logger;
pub mod models;
pub mod offline;

pub use database::{StoreError, StoreHandle};
pub use error::{NotebookError, Result};
pub use offline::{CacheError, OfflineCache};

use config::Config;
use std::sync::Arc;

/// Builds the offline cache described by `config` on top of its cache file
pub async fn build_offline_cache(config: &Config) -> Result<OfflineCache> {
    let manifest = config.manifest()?;
    let storage = offline::CacheStorage::open(config.cache_path()?).await?;
    let transport: Arc<dyn offline::Transport> = offline::create_transport(&config.offline)?;
    Ok(OfflineCache::new(manifest, storage, transport))
}

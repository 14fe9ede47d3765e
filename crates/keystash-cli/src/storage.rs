use std::path::{Path, PathBuf};

use color_eyre::{eyre::bail, Result};
use dirs::data_dir;
use keystash_store::{load_or_create_store, load_store, store_exists, FileStore};
use tracing::debug;

use crate::config::Config;

/// Resolve the default data directory for keystash.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("keystash"))
}

/// Store path: CLI flag first, then config, then the platform data dir.
pub fn store_path(flag: Option<&Path>, config: &Config) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = &config.store_path {
        return Ok(path.clone());
    }
    Ok(default_data_dir()?.join("store.json"))
}

/// Open or create the store file.
pub async fn init_store(path: &Path, config: &Config) -> Result<FileStore> {
    debug!(path = %path.display(), "initializing store");
    Ok(load_or_create_store(path, config.store_options()).await?)
}

/// Open an existing store file; refuses to create one implicitly.
pub async fn open_store(path: &Path, config: &Config) -> Result<FileStore> {
    if !store_exists(path).await {
        bail!(
            "no store at {}; run `keystash init` first",
            path.display()
        );
    }
    debug!(path = %path.display(), "opening store");
    Ok(load_store(path, config.store_options()).await?)
}

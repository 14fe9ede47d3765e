use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use keystash_core::{PersistError, PersistenceAdapter, Result, Snapshot};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use crate::{cipher::StoreOptions, store::RecordStore};

/// Record store persisted to a single JSON file.
pub type FileStore = RecordStore<FilePersistence>;

/// Writes snapshots to one file via temp file + rename, so a reader never
/// observes a half-written store.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PersistenceAdapter for FilePersistence {
    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn persist(&self, contents: &str) -> Result<(), PersistError> {
        write_atomic(&self.path, contents.as_bytes())?;
        debug!(bytes = contents.len(), "store file written");
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| PersistError::Io(e.error))?;
    Ok(())
}

/// True when `path` names an existing regular file.
pub async fn store_exists(path: impl AsRef<Path>) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// Start an empty store at `path` and write it out once.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn create_store(path: impl AsRef<Path>, options: StoreOptions) -> Result<FileStore> {
    let store = RecordStore::new(FilePersistence::new(path.as_ref()), options);
    store.flush().await?;
    info!("created store");
    Ok(store)
}

/// Open the store persisted at `path`.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn load_store(path: impl AsRef<Path>, options: StoreOptions) -> Result<FileStore> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(PersistError::from)?;
    let snapshot = Snapshot::decode(&contents)?;
    debug!(records = snapshot.records.len(), "loaded store");
    Ok(RecordStore::with_records(
        FilePersistence::new(path),
        options,
        snapshot.records,
    ))
}

/// Open the store at `path`, creating it first when missing.
pub async fn load_or_create_store(
    path: impl AsRef<Path>,
    options: StoreOptions,
) -> Result<FileStore> {
    let path = path.as_ref();
    if store_exists(path).await {
        load_store(path, options).await
    } else {
        create_store(path, options).await
    }
}

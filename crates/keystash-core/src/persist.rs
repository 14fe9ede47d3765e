use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};

use async_trait::async_trait;

use crate::error::PersistError;

/// Contract for durably writing a serialized store snapshot.
///
/// Returning `Ok` means the contents are fully written. Atomicity of the
/// underlying write is the implementation's concern.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn persist(&self, contents: &str) -> Result<(), PersistError>;
}

#[async_trait]
impl<P: PersistenceAdapter + ?Sized> PersistenceAdapter for Arc<P> {
    async fn persist(&self, contents: &str) -> Result<(), PersistError> {
        (**self).persist(contents).await
    }
}

/// In-memory adapter that records every write. Intended for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPersistence {
    writes: Arc<Mutex<Vec<String>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Contents of the most recent successful write.
    pub fn last(&self) -> Option<String> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

#[async_trait]
impl PersistenceAdapter for InMemoryPersistence {
    async fn persist(&self, contents: &str) -> Result<(), PersistError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistError::Rejected {
                reason: "in-memory adapter set to fail".to_string(),
            });
        }
        let mut writes = self.writes.lock().map_err(|err| PersistError::Rejected {
            reason: format!("lock poisoned: {err}"),
        })?;
        writes.push(contents.to_string());
        Ok(())
    }
}

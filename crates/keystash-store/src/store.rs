use std::collections::HashSet;

use keystash_core::{
    KeyMetadata, PersistenceAdapter, Record, RecordMap, Result, Snapshot, StoreError,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::{sync::Mutex, task::JoinError};
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::cipher::{self, StoreOptions};

/// One element of a batch secret write.
#[derive(Debug, Clone)]
pub struct SecretEntry<T> {
    pub id: String,
    pub password: String,
    pub payload: T,
    /// Caller-supplied metadata for imports. Reusing a nonce is the caller's problem.
    pub metadata: Option<KeyMetadata>,
    /// Public payload written together with the secret; `None` keeps the existing one.
    pub public: Option<Value>,
}

impl<T> SecretEntry<T> {
    pub fn new(id: impl Into<String>, password: impl Into<String>, payload: T) -> Self {
        Self {
            id: id.into(),
            password: password.into(),
            payload,
            metadata: None,
            public: None,
        }
    }

    pub fn with_metadata(mut self, metadata: KeyMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_public(mut self, public: Value) -> Self {
        self.public = Some(public);
        self
    }
}

/// Encrypted record store that persists a full snapshot after every mutation.
///
/// Mutations are serialized behind one lock held across "build next map,
/// persist, commit". The in-memory map only changes once the adapter
/// reports success, so it always equals the last durable state.
pub struct RecordStore<P: PersistenceAdapter> {
    records: Mutex<RecordMap>,
    persistence: P,
    options: StoreOptions,
}

struct PendingSeal {
    id: String,
    plaintext: Zeroizing<Vec<u8>>,
    password: Zeroizing<String>,
    metadata: KeyMetadata,
    public: Option<Value>,
}

struct Sealed {
    id: String,
    private: String,
    metadata: KeyMetadata,
    public: Option<Value>,
}

impl<P: PersistenceAdapter> RecordStore<P> {
    /// Empty store. Nothing is written until the first mutation or `flush`.
    pub fn new(persistence: P, options: StoreOptions) -> Self {
        Self::with_records(persistence, options, RecordMap::new())
    }

    /// Store primed with previously persisted records.
    pub fn with_records(persistence: P, options: StoreOptions, records: RecordMap) -> Self {
        Self {
            records: Mutex::new(records),
            persistence,
            options,
        }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Record IDs in insertion order.
    pub async fn ids(&self) -> Vec<String> {
        self.records.lock().await.ids().map(str::to_string).collect()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.records.lock().await.contains(id)
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.records.lock().await.clone())
    }

    /// Unencrypted payload of a record, `None` when it has none.
    pub async fn public_data<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>> {
        let public = {
            let records = self.records.lock().await;
            let record = records.get(id).ok_or_else(|| StoreError::not_found(id))?;
            record.public.clone()
        };
        public
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| StoreError::Deserialization {
                reason: e.to_string(),
            })
    }

    /// Decrypt and decode a record's secret payload.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn secret<T: DeserializeOwned>(&self, id: &str, password: &str) -> Result<T> {
        let record = {
            let records = self.records.lock().await;
            records
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::not_found(id))?
        };

        let password = Zeroizing::new(password.to_string());
        let plaintext = tokio::task::spawn_blocking(move || {
            cipher::decrypt(&record.private, &record.metadata, &password)
        })
        .await
        .map_err(worker_err)??;

        serde_json::from_slice(&plaintext).map_err(|e| StoreError::Deserialization {
            reason: e.to_string(),
        })
    }

    /// Encrypt `payload` under fresh metadata and upsert it. An existing
    /// record keeps its position and public payload.
    pub async fn save_secret<T: Serialize>(
        &self,
        id: &str,
        password: &str,
        payload: &T,
    ) -> Result<()> {
        let pending = self.prepare(id, password, payload, None, None)?;
        self.store_sealed(pending).await
    }

    /// Encrypt `payload` and replace the public payload in the same write,
    /// so the record is never durable with one and not the other.
    pub async fn save_secret_with_public<T: Serialize, U: Serialize>(
        &self,
        id: &str,
        password: &str,
        payload: &T,
        public: &U,
    ) -> Result<()> {
        let public = public_value(public)?;
        let pending = self.prepare(id, password, payload, None, Some(public))?;
        self.store_sealed(pending).await
    }

    /// Like [`save_secret`](Self::save_secret) but with caller-supplied
    /// metadata, for importing records sealed elsewhere. The caller must
    /// never reuse a nonce across writes.
    pub async fn save_secret_with_metadata<T: Serialize>(
        &self,
        id: &str,
        password: &str,
        payload: &T,
        metadata: KeyMetadata,
    ) -> Result<()> {
        let pending = self.prepare(id, password, payload, Some(metadata), None)?;
        self.store_sealed(pending).await
    }

    /// Apply every entry, then persist once. Any invalid entry rejects the
    /// whole batch before the map or storage is touched.
    #[instrument(skip_all, fields(entries = entries.len()))]
    pub async fn save_secret_batch<T: Serialize>(&self, entries: Vec<SecretEntry<T>>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut seen = HashSet::new();
        let mut pending = Vec::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.id.as_str()) {
                return Err(StoreError::precondition(format!(
                    "record id `{}` appears more than once in the batch",
                    entry.id
                )));
            }
            pending.push(self.prepare(
                &entry.id,
                &entry.password,
                &entry.payload,
                entry.metadata.clone(),
                entry.public.clone(),
            )?);
        }

        let sealed = seal_all(pending).await?;
        let mut records = self.records.lock().await;
        let mut next = records.clone();
        for item in sealed {
            apply_sealed(&mut next, item);
        }
        self.commit(&mut records, next).await
    }

    /// Replace a record's unencrypted payload. The record must already hold a secret.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn save_public_data<T: Serialize>(&self, id: &str, payload: &T) -> Result<()> {
        let value = public_value(payload)?;

        let mut records = self.records.lock().await;
        if !records.contains(id) {
            return Err(StoreError::precondition(format!(
                "record `{id}` has no secret yet; save a secret before attaching public data"
            )));
        }
        let mut next = records.clone();
        if let Some(record) = next.get_mut(id) {
            record.public = (!value.is_null()).then_some(value);
        }
        self.commit(&mut records, next).await
    }

    #[instrument(skip_all, fields(id = %id))]
    pub async fn remove(&self, id: &str) -> Result<()> {
        let mut records = self.records.lock().await;
        let mut next = records.clone();
        next.remove(id).ok_or_else(|| StoreError::not_found(id))?;
        self.commit(&mut records, next).await
    }

    /// Persist the current state as-is.
    #[instrument(skip_all)]
    pub async fn flush(&self) -> Result<()> {
        let records = self.records.lock().await;
        let contents = Snapshot::new(records.clone()).encode()?;
        self.persistence.persist(&contents).await?;
        debug!(records = records.len(), "snapshot flushed");
        Ok(())
    }

    fn prepare<T: Serialize>(
        &self,
        id: &str,
        password: &str,
        payload: &T,
        metadata: Option<KeyMetadata>,
        public: Option<Value>,
    ) -> Result<PendingSeal> {
        if id.is_empty() {
            return Err(StoreError::precondition("record id must not be empty"));
        }
        let metadata = match metadata {
            Some(metadata) => {
                cipher::validate_metadata(&metadata)?;
                metadata
            }
            None => cipher::fresh_metadata(&self.options),
        };
        let plaintext = serde_json::to_vec(payload)
            .map(Zeroizing::new)
            .map_err(|e| StoreError::Serialization {
                reason: e.to_string(),
            })?;

        Ok(PendingSeal {
            id: id.to_string(),
            plaintext,
            password: Zeroizing::new(password.to_string()),
            metadata,
            public,
        })
    }

    #[instrument(skip_all, fields(id = %pending.id))]
    async fn store_sealed(&self, pending: PendingSeal) -> Result<()> {
        let sealed = seal_all(vec![pending]).await?;
        let mut records = self.records.lock().await;
        let mut next = records.clone();
        for item in sealed {
            apply_sealed(&mut next, item);
        }
        self.commit(&mut records, next).await
    }

    async fn commit(&self, current: &mut RecordMap, next: RecordMap) -> Result<()> {
        let snapshot = Snapshot::new(next);
        let contents = snapshot.encode()?;
        self.persistence.persist(&contents).await?;
        *current = snapshot.records;
        debug!(records = current.len(), "snapshot persisted");
        Ok(())
    }
}

/// Encrypt on the blocking pool. All derivations are dispatched before any is awaited.
async fn seal_all(pending: Vec<PendingSeal>) -> Result<Vec<Sealed>> {
    let handles: Vec<_> = pending
        .into_iter()
        .map(|item| {
            tokio::task::spawn_blocking(move || {
                let PendingSeal {
                    id,
                    plaintext,
                    password,
                    metadata,
                    public,
                } = item;
                let private = cipher::encrypt(&plaintext, &metadata, &password)?;
                Ok::<_, StoreError>(Sealed {
                    id,
                    private,
                    metadata,
                    public,
                })
            })
        })
        .collect();

    let mut sealed = Vec::with_capacity(handles.len());
    for handle in handles {
        sealed.push(handle.await.map_err(worker_err)??);
    }
    Ok(sealed)
}

fn apply_sealed(records: &mut RecordMap, sealed: Sealed) {
    let public = match sealed.public {
        Some(value) => (!value.is_null()).then_some(value),
        None => records.get(&sealed.id).and_then(|r| r.public.clone()),
    };
    records.insert(
        sealed.id,
        Record {
            private: sealed.private,
            metadata: sealed.metadata,
            public,
        },
    );
}

fn public_value<T: Serialize>(payload: &T) -> Result<Value> {
    serde_json::to_value(payload).map_err(|e| StoreError::Serialization {
        reason: e.to_string(),
    })
}

fn worker_err(err: JoinError) -> StoreError {
    StoreError::Worker {
        reason: err.to_string(),
    }
}

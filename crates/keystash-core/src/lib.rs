//! Core contracts for keystash: the record model, error kinds, and the
//! persistence adapter seam. Kept small so adapters can depend on it cheaply.

pub mod error;
pub mod model;
pub mod persist;

pub use error::{PersistError, Result, StoreError};
pub use model::{
    CipherSuite, HashAlgorithm, KeyMetadata, Record, RecordMap, Snapshot, SNAPSHOT_VERSION,
};
pub use persist::{InMemoryPersistence, PersistenceAdapter};

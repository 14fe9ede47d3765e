//! Record store implementation with password-based encryption at rest.
//! Uses PBKDF2-derived keys with XChaCha20-Poly1305 or AES-256-GCM, and a
//! file-backed persistence adapter (or test doubles from `keystash-core`).

pub mod cipher;
pub mod file;
pub mod store;

pub use cipher::StoreOptions;
pub use file::{
    create_store, load_or_create_store, load_store, store_exists, FilePersistence, FileStore,
};
pub use store::{RecordStore, SecretEntry};

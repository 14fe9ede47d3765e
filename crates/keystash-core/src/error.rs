use thiserror::Error;

/// Errors produced by a persistence adapter while writing a snapshot.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Underlying I/O failure.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    /// The adapter refused or failed the write for a non-I/O reason.
    #[error("write rejected: {reason}")]
    Rejected { reason: String },
}

/// Errors surfaced by record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The operation referenced an unknown record ID.
    #[error("no record found for id: {id}")]
    NotFound { id: String },
    /// The operation requires state that does not exist yet.
    #[error("precondition failed: {reason}")]
    Precondition { reason: String },
    /// Authentication of the ciphertext failed.
    #[error("decryption failed: the provided password is probably wrong, or the record is corrupt")]
    Decryption,
    /// Decrypted (or public) bytes are not a valid payload of the requested type.
    #[error("payload could not be decoded: {reason}")]
    Deserialization { reason: String },
    /// The caller's payload could not be serialized.
    #[error("payload could not be encoded: {reason}")]
    Serialization { reason: String },
    /// Key metadata is malformed or out of bounds.
    #[error("invalid key metadata: {reason}")]
    InvalidMetadata { reason: String },
    /// Persisted store contents could not be understood.
    #[error("invalid store snapshot: {reason}")]
    InvalidSnapshot { reason: String },
    /// The persistence adapter failed; passed through untouched.
    #[error(transparent)]
    Persistence(#[from] PersistError),
    /// Cipher setup or sealing failed.
    #[error("crypto failure: {reason}")]
    Crypto { reason: String },
    /// A background derivation/sealing task panicked or was cancelled.
    #[error("crypto worker failed: {reason}")]
    Worker { reason: String },
}

impl StoreError {
    pub fn not_found(id: &str) -> Self {
        Self::NotFound { id: id.to_string() }
    }

    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::Precondition {
            reason: reason.into(),
        }
    }

    pub fn invalid_metadata(reason: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            reason: reason.into(),
        }
    }

    /// True for the errors a wrong password can produce.
    pub fn is_wrong_password(&self) -> bool {
        matches!(self, Self::Decryption | Self::Deserialization { .. })
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

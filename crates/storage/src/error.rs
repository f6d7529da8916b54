use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unknown {kind} field: {field}")]
    UnknownField { kind: &'static str, field: String },

    #[error("field map mismatch: {0}")]
    FieldMap(String),

    #[error("event for {accession} already recorded")]
    DuplicateEvent { accession: String },

    #[error("core error: {0}")]
    Core(#[from] varledger_core::CoreError),
}

impl StorageError {
    /// Transient failures: the store is busy, locked, timed out or hit an I/O error.
    pub fn is_unavailable(&self) -> bool {
        match self {
            StorageError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::CannotOpen
                    | ErrorCode::DiskFull
                    | ErrorCode::OutOfMemory
            ),
            _ => false,
        }
    }
}

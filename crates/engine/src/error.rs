use thiserror::Error;
use varledger_core::{ids::Accession, CoreError};
use varledger_storage::StorageError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid content hash: {0}")]
    InvalidHash(String),

    #[error("member {0} is not linked to a group")]
    NotClustered(Accession),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("core error: {0}")]
    Core(CoreError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no inactive snapshots for {0}")]
    NotInactive(Accession),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Errors that reject one batch unit and let the rest of the batch proceed.
    pub fn is_unit_fatal(&self) -> bool {
        matches!(self, EngineError::InvalidHash(_) | EngineError::NotClustered(_))
    }
}

impl From<CoreError> for EngineError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidHash { reason } => EngineError::InvalidHash(reason),
            CoreError::NotClustered { accession } => EngineError::NotClustered(accession),
            other => EngineError::Core(other),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        if e.is_unavailable() {
            return EngineError::StoreUnavailable(e.to_string());
        }
        match e {
            StorageError::Core(core) => core.into(),
            other => EngineError::Storage(other),
        }
    }
}

impl From<figment::Error> for EngineError {
    fn from(e: figment::Error) -> Self {
        EngineError::Config(e.to_string())
    }
}

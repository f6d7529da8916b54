use thiserror::Error;

use crate::ids::Accession;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid content hash: {reason}")]
    InvalidHash { reason: String },

    #[error("member {accession} is not linked to a group")]
    NotClustered { accession: Accession },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

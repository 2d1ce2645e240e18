use pulsevm_error::ChainError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainbaseError {
    #[error("{0}: item not found")]
    NotFound(&'static str),
    #[error("{0}: item already exists")]
    AlreadyExists(&'static str),
    #[error("{0}: error reading data")]
    ReadError(&'static str),
    #[error("{0}: error writing data")]
    WriteError(&'static str),
    #[error("no undo session is open")]
    NoUndoSession,
}

impl From<ChainbaseError> for ChainError {
    fn from(e: ChainbaseError) -> Self {
        ChainError::DatabaseError(e.to_string())
    }
}

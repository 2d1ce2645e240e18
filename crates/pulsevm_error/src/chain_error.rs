use std::fmt;

use pulsevm_name::{Name, ParseNameError};
use pulsevm_serialization::{ReadError, WriteError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Net,
    Cpu,
    Ram,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::Net => "net",
            Resource::Cpu => "cpu",
            Resource::Ram => "ram",
        })
    }
}

/// How far an error is allowed to travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Consensus state can no longer be trusted; abort block processing.
    Fatal,
    /// Reject the offending transaction or action and keep going.
    Recoverable,
    /// The caller broke the calling protocol.
    ContractViolation,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("{resource} usage exceeded for account {owner}")]
    ResourceExceeded { resource: Resource, owner: Name },
    #[error("block {resource} resource exhausted")]
    BlockResourceExhausted { resource: Resource },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("resource limits for account {0} already exist")]
    AccountAlreadyExists(Name),
    #[error("unknown account: {0}")]
    UnknownAccount(Name),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("parse error: {0}")]
    ParseError(String),

    #[error("new ordinal {ordinal} cannot be less than the previous ordinal {last_ordinal}")]
    InvalidOrdinal { ordinal: u32, last_ordinal: u32 },
    #[error("usage exceeds maximum value representable after extending for precision")]
    UsageOverflow,
    #[error("accounting overflow: {0}")]
    AccountingOverflow(String),
    #[error("ram usage underflow for account {0}")]
    RamUsageUnderflow(Name),
    #[error("missing singleton object: {0}")]
    MissingSingleton(&'static str),
    #[error("unsupported snapshot version {version}, supported range is {minimum}..={current}")]
    SnapshotVersion {
        version: u32,
        minimum: u32,
        current: u32,
    },
    #[error("database error: {0}")]
    DatabaseError(String),
    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("contract violation: {0}")]
    ContractViolation(String),
}

impl ChainError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ChainError::ResourceExceeded { .. }
            | ChainError::BlockResourceExhausted { .. }
            | ChainError::InvalidConfiguration(_)
            | ChainError::AccountAlreadyExists(_)
            | ChainError::UnknownAccount(_)
            | ChainError::InvalidArgument(_)
            | ChainError::ParseError(_) => ErrorSeverity::Recoverable,
            ChainError::ContractViolation(_) => ErrorSeverity::ContractViolation,
            ChainError::InvalidOrdinal { .. }
            | ChainError::UsageOverflow
            | ChainError::AccountingOverflow(_)
            | ChainError::RamUsageUnderflow(_)
            | ChainError::MissingSingleton(_)
            | ChainError::SnapshotVersion { .. }
            | ChainError::DatabaseError(_)
            | ChainError::SerializationError(_) => ErrorSeverity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == ErrorSeverity::Fatal
    }
}

impl From<ReadError> for ChainError {
    fn from(e: ReadError) -> Self {
        ChainError::SerializationError(e.to_string())
    }
}

impl From<WriteError> for ChainError {
    fn from(e: WriteError) -> Self {
        ChainError::SerializationError(e.to_string())
    }
}

impl From<ParseNameError> for ChainError {
    fn from(e: ParseNameError) -> Self {
        ChainError::ParseError(format!("invalid name format: {}", e))
    }
}

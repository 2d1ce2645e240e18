use std::fmt;

use pulsevm_error::ChainError;
use pulsevm_serialization::{NumBytes, Read, ReadError, Write, WriteError};
use serde::{Deserialize, Serialize};

/// A stake derived weight or quota. `Unset` means the account is not
/// limited for that resource; it is stored as `-1`, the legacy sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum ResourceWeight {
    #[default]
    Unset,
    Weighted(u64),
}

impl ResourceWeight {
    pub const UNSET_SENTINEL: i64 = -1;

    /// Contribution to network wide totals; unset counts as nothing.
    pub fn weight(&self) -> u64 {
        match self {
            ResourceWeight::Unset => 0,
            ResourceWeight::Weighted(w) => *w,
        }
    }

    pub fn as_legacy(&self) -> i64 {
        match self {
            ResourceWeight::Unset => Self::UNSET_SENTINEL,
            // construction goes through TryFrom<i64> or `checked`, so this fits
            ResourceWeight::Weighted(w) => i64::try_from(*w).unwrap_or(i64::MAX),
        }
    }

    /// Rejects weights that cannot round trip through the `i64` row format.
    pub fn checked(self) -> Result<Self, ChainError> {
        match self {
            ResourceWeight::Weighted(w) if i64::try_from(w).is_err() => Err(
                ChainError::InvalidArgument(format!("resource weight {} is out of range", w)),
            ),
            other => Ok(other),
        }
    }
}

impl TryFrom<i64> for ResourceWeight {
    type Error = ChainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            Self::UNSET_SENTINEL => Ok(ResourceWeight::Unset),
            v if v >= 0 => Ok(ResourceWeight::Weighted(v as u64)),
            v => Err(ChainError::InvalidArgument(format!(
                "resource weight {} is negative",
                v
            ))),
        }
    }
}

impl From<ResourceWeight> for i64 {
    fn from(weight: ResourceWeight) -> Self {
        weight.as_legacy()
    }
}

impl fmt::Display for ResourceWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceWeight::Unset => f.write_str("unlimited"),
            ResourceWeight::Weighted(w) => write!(f, "{}", w),
        }
    }
}

impl NumBytes for ResourceWeight {
    fn num_bytes(&self) -> usize {
        core::mem::size_of::<i64>()
    }
}

impl Read for ResourceWeight {
    fn read(bytes: &[u8], pos: &mut usize) -> Result<Self, ReadError> {
        let raw = i64::read(bytes, pos)?;
        ResourceWeight::try_from(raw).map_err(|_| ReadError::ParseError)
    }
}

impl Write for ResourceWeight {
    fn write(&self, bytes: &mut [u8], pos: &mut usize) -> Result<(), WriteError> {
        self.as_legacy().write(bytes, pos)
    }
}

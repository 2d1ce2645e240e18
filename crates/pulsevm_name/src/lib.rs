use std::{fmt, str::FromStr};

use pulsevm_proc_macros::{NumBytes, Read, Write};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const NAME_CHARS: [u8; 32] = *b".12345abcdefghijklmnopqrstuvwxyz";
pub const NAME_MAX_LEN: usize = 13;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ParseNameError {
    #[error("bad character in name: '{}'", char::from(*.0))]
    BadChar(u8),
    #[error("name is too long")]
    TooLong,
}

/// Account identifier: up to 13 characters packed five bits each into a `u64`
/// (the thirteenth character only gets four bits).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Read, Write, NumBytes,
)]
pub struct Name(u64);

impl Name {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn empty(&self) -> bool {
        self.0 == 0
    }

    /// Big endian key bytes; byte order matches `Ord` so store iteration is by owner.
    pub fn to_key_bytes(self) -> Vec<u8> {
        self.0.to_be_bytes().to_vec()
    }
}

fn symbol_value(c: u8) -> Option<u64> {
    match c {
        b'.' => Some(0),
        b'1'..=b'5' => Some(u64::from(c - b'1' + 1)),
        b'a'..=b'z' => Some(u64::from(c - b'a' + 6)),
        _ => None,
    }
}

impl FromStr for Name {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() > NAME_MAX_LEN {
            return Err(ParseNameError::TooLong);
        }
        let mut value = 0u64;
        for (i, &c) in bytes.iter().enumerate() {
            let v = symbol_value(c).ok_or(ParseNameError::BadChar(c))?;
            if i < 12 {
                value |= v << (64 - 5 * (i as u32 + 1));
            } else {
                if v > 0x0f {
                    return Err(ParseNameError::BadChar(c));
                }
                value |= v;
            }
        }
        Ok(Name(value))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut out = [b'.'; NAME_MAX_LEN];
        for (i, slot) in out.iter_mut().enumerate() {
            let index = if i < 12 {
                (self.0 >> (64 - 5 * (i as u32 + 1))) & 0x1f
            } else {
                self.0 & 0x0f
            };
            *slot = NAME_CHARS[index as usize];
        }
        let len = out.iter().rposition(|&c| c != b'.').map_or(0, |p| p + 1);
        // every byte comes from NAME_CHARS, so this is ASCII
        f.write_str(std::str::from_utf8(&out[..len]).map_err(|_| fmt::Error)?)
    }
}

impl From<u64> for Name {
    fn from(n: u64) -> Self {
        Self(n)
    }
}

impl From<Name> for u64 {
    fn from(n: Name) -> Self {
        n.0
    }
}

impl Serialize for Name {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Name::from_str(&s).map_err(serde::de::Error::custom)
    }
}

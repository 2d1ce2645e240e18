use serde::{Deserialize, Serialize};

use crate::{NumBytes, Read, ReadError, Write, WriteError, put};

/// LEB128 encoded `u32`, used for length prefixes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarUint32(pub u32);

impl NumBytes for VarUint32 {
    #[inline(always)]
    fn num_bytes(&self) -> usize {
        let bits = 32 - self.0.leading_zeros() as usize;
        bits.div_ceil(7).max(1)
    }
}

impl Read for VarUint32 {
    fn read(bytes: &[u8], pos: &mut usize) -> Result<Self, ReadError> {
        let mut result = 0u32;
        for group in 0..5u32 {
            let byte = *bytes.get(*pos).ok_or(ReadError::NotEnoughBytes)?;
            *pos += 1;
            let low = u32::from(byte & 0x7f);
            // only four payload bits are left for the fifth group
            if group == 4 && low > 0x0f {
                return Err(ReadError::Overflow);
            }
            result |= low << (7 * group);
            if byte & 0x80 == 0 {
                return Ok(VarUint32(result));
            }
        }
        Err(ReadError::ParseError)
    }
}

impl Write for VarUint32 {
    fn write(&self, bytes: &mut [u8], pos: &mut usize) -> Result<(), WriteError> {
        if bytes.len() < *pos + self.num_bytes() {
            return Err(WriteError::NotEnoughSpace);
        }
        let mut v = self.0;
        loop {
            let low = (v & 0x7f) as u8;
            v >>= 7;
            let byte = if v == 0 { low } else { low | 0x80 };
            put(bytes, pos, &[byte])?;
            if v == 0 {
                return Ok(());
            }
        }
    }
}

impl From<usize> for VarUint32 {
    #[allow(clippy::cast_possible_truncation)]
    fn from(v: usize) -> Self {
        Self(v as u32)
    }
}

impl From<u32> for VarUint32 {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_per_group() {
        assert_eq!(VarUint32(0).num_bytes(), 1);
        assert_eq!(VarUint32(127).num_bytes(), 1);
        assert_eq!(VarUint32(128).num_bytes(), 2);
        assert_eq!(VarUint32(16_383).num_bytes(), 2);
        assert_eq!(VarUint32(16_384).num_bytes(), 3);
        assert_eq!(VarUint32(u32::MAX).num_bytes(), 5);
    }

    #[test]
    fn encodes_continuation_bits() {
        assert_eq!(VarUint32(300).pack().unwrap(), vec![0xac, 0x02]);
        assert_eq!(VarUint32::unpack(&[0xac, 0x02]).unwrap(), VarUint32(300));
        assert_eq!(
            VarUint32::unpack(&[0xff, 0xff, 0xff, 0xff, 0x0f]).unwrap(),
            VarUint32(u32::MAX)
        );
    }

    #[test]
    fn rejects_oversized_encodings() {
        assert_eq!(
            VarUint32::unpack(&[0xff, 0xff, 0xff, 0xff, 0x1f]),
            Err(ReadError::Overflow)
        );
        assert_eq!(VarUint32::unpack(&[0x80]), Err(ReadError::NotEnoughBytes));
    }

    #[test]
    fn serde_is_transparent() {
        assert_eq!(serde_json::to_string(&VarUint32(42)).unwrap(), "42");
    }
}

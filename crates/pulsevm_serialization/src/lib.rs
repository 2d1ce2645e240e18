mod primitives;

mod varint;
pub use varint::VarUint32;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("not enough bytes to read")]
    NotEnoughBytes,
    #[error("value overflows its target type")]
    Overflow,
    #[error("malformed input")]
    ParseError,
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("not enough space in the output buffer")]
    NotEnoughSpace,
    #[error("length does not fit in a varuint32")]
    TryFromIntError,
}

/// Exact encoded size of a value. `Write::pack` sizes its buffer with it.
pub trait NumBytes {
    fn num_bytes(&self) -> usize;
}

pub trait Read: Sized {
    fn read(bytes: &[u8], pos: &mut usize) -> Result<Self, ReadError>;

    /// Decodes a value that must span the whole input.
    fn unpack(bytes: &[u8]) -> Result<Self, ReadError> {
        let mut pos = 0;
        let value = Self::read(bytes, &mut pos)?;
        if pos != bytes.len() {
            return Err(ReadError::TrailingBytes(bytes.len() - pos));
        }
        Ok(value)
    }
}

pub trait Write: NumBytes {
    fn write(&self, bytes: &mut [u8], pos: &mut usize) -> Result<(), WriteError>;

    fn pack(&self) -> Result<Vec<u8>, WriteError> {
        let mut bytes = vec![0u8; self.num_bytes()];
        let mut pos = 0;
        self.write(&mut bytes, &mut pos)?;
        Ok(bytes)
    }
}

#[inline]
pub(crate) fn take<'a>(
    bytes: &'a [u8],
    pos: &mut usize,
    len: usize,
) -> Result<&'a [u8], ReadError> {
    let end = pos.checked_add(len).ok_or(ReadError::Overflow)?;
    let slice = bytes.get(*pos..end).ok_or(ReadError::NotEnoughBytes)?;
    *pos = end;
    Ok(slice)
}

#[inline]
pub(crate) fn put(bytes: &mut [u8], pos: &mut usize, data: &[u8]) -> Result<(), WriteError> {
    let end = *pos + data.len();
    let slot = bytes.get_mut(*pos..end).ok_or(WriteError::NotEnoughSpace)?;
    slot.copy_from_slice(data);
    *pos = end;
    Ok(())
}

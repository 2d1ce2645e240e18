use crate::{NumBytes, Read, ReadError, VarUint32, Write, WriteError, put, take};

// Fixed width integers are little endian on the wire.
macro_rules! fixed_width {
    ($($ty:ty),*) => {
        $(
            impl NumBytes for $ty {
                #[inline(always)]
                fn num_bytes(&self) -> usize {
                    core::mem::size_of::<$ty>()
                }
            }

            impl Read for $ty {
                #[inline(always)]
                fn read(bytes: &[u8], pos: &mut usize) -> Result<Self, ReadError> {
                    let raw = take(bytes, pos, core::mem::size_of::<$ty>())?;
                    let mut buf = [0u8; core::mem::size_of::<$ty>()];
                    buf.copy_from_slice(raw);
                    Ok(<$ty>::from_le_bytes(buf))
                }
            }

            impl Write for $ty {
                #[inline(always)]
                fn write(&self, bytes: &mut [u8], pos: &mut usize) -> Result<(), WriteError> {
                    put(bytes, pos, &self.to_le_bytes())
                }
            }
        )*
    };
}

fixed_width!(u8, u16, u32, u64, u128, i8, i16, i32, i64);

impl NumBytes for bool {
    #[inline(always)]
    fn num_bytes(&self) -> usize {
        1
    }
}

impl Read for bool {
    #[inline(always)]
    fn read(bytes: &[u8], pos: &mut usize) -> Result<Self, ReadError> {
        match u8::read(bytes, pos)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(ReadError::ParseError),
        }
    }
}

impl Write for bool {
    #[inline(always)]
    fn write(&self, bytes: &mut [u8], pos: &mut usize) -> Result<(), WriteError> {
        u8::from(*self).write(bytes, pos)
    }
}

impl NumBytes for usize {
    #[inline(always)]
    fn num_bytes(&self) -> usize {
        VarUint32::from(*self).num_bytes()
    }
}

impl Read for usize {
    #[inline(always)]
    fn read(bytes: &[u8], pos: &mut usize) -> Result<Self, ReadError> {
        VarUint32::read(bytes, pos).map(|v| v.0 as usize)
    }
}

impl Write for usize {
    #[inline(always)]
    fn write(&self, bytes: &mut [u8], pos: &mut usize) -> Result<(), WriteError> {
        let len = u32::try_from(*self).map_err(|_| WriteError::TryFromIntError)?;
        VarUint32(len).write(bytes, pos)
    }
}

impl NumBytes for String {
    fn num_bytes(&self) -> usize {
        self.len().num_bytes() + self.len()
    }
}

impl Read for String {
    fn read(bytes: &[u8], pos: &mut usize) -> Result<Self, ReadError> {
        let len = usize::read(bytes, pos)?;
        let raw = take(bytes, pos, len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| ReadError::ParseError)
    }
}

impl Write for String {
    fn write(&self, bytes: &mut [u8], pos: &mut usize) -> Result<(), WriteError> {
        self.len().write(bytes, pos)?;
        put(bytes, pos, self.as_bytes())
    }
}

impl<T: NumBytes> NumBytes for Option<T> {
    fn num_bytes(&self) -> usize {
        1 + self.as_ref().map_or(0, NumBytes::num_bytes)
    }
}

impl<T: Read> Read for Option<T> {
    fn read(bytes: &[u8], pos: &mut usize) -> Result<Self, ReadError> {
        if bool::read(bytes, pos)? {
            Ok(Some(T::read(bytes, pos)?))
        } else {
            Ok(None)
        }
    }
}

impl<T: Write> Write for Option<T> {
    fn write(&self, bytes: &mut [u8], pos: &mut usize) -> Result<(), WriteError> {
        self.is_some().write(bytes, pos)?;
        match self {
            Some(value) => value.write(bytes, pos),
            None => Ok(()),
        }
    }
}

impl<T: NumBytes> NumBytes for Vec<T> {
    fn num_bytes(&self) -> usize {
        self.iter()
            .fold(self.len().num_bytes(), |acc, item| acc + item.num_bytes())
    }
}

impl<T: Read> Read for Vec<T> {
    fn read(bytes: &[u8], pos: &mut usize) -> Result<Self, ReadError> {
        let len = usize::read(bytes, pos)?;
        // Every element takes at least one byte, so a length beyond the input is bogus.
        if len > bytes.len().saturating_sub(*pos) {
            return Err(ReadError::NotEnoughBytes);
        }
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(T::read(bytes, pos)?);
        }
        Ok(items)
    }
}

impl<T: Write> Write for Vec<T> {
    fn write(&self, bytes: &mut [u8], pos: &mut usize) -> Result<(), WriteError> {
        self.len().write(bytes, pos)?;
        for item in self {
            item.write(bytes, pos)?;
        }
        Ok(())
    }
}

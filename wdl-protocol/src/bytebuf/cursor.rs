use wdl_nbt::{Nbt, io_adaptor::ReadAdaptor};

use crate::{ReadingError, VarInt};

macro_rules! get_be {
    ($($name:ident => $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self) -> Result<$ty, ReadingError> {
                let bytes = self.take(size_of::<$ty>())?;
                let mut buf = [0u8; size_of::<$ty>()];
                buf.copy_from_slice(bytes);
                Ok(<$ty>::from_be_bytes(buf))
            }
        )*
    };
}

/// Forward-only, bounds-checked reader over one packet's payload.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The bytes not consumed yet.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.position..]
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], ReadingError> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(ReadingError::BufferUnderrun { needed, remaining });
        }
        let bytes = &self.data[self.position..self.position + needed];
        self.position += needed;
        Ok(bytes)
    }

    get_be! {
        get_u8 => u8,
        get_i16_be => i16,
        get_i32_be => i32,
        get_i64_be => i64,
    }

    pub fn get_bool(&mut self) -> Result<bool, ReadingError> {
        Ok(self.get_u8()? != 0)
    }

    pub fn get_var_int(&mut self) -> Result<VarInt, ReadingError> {
        VarInt::decode(self)
    }

    /// Reads a VarInt that is used as a count or size.
    pub fn get_length(&mut self) -> Result<usize, ReadingError> {
        let VarInt(len) = self.get_var_int()?;
        usize::try_from(len).map_err(|_| ReadingError::NegativeLength(len))
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], ReadingError> {
        self.take(count)
    }

    pub fn read_boxed_slice(&mut self, count: usize) -> Result<Box<[u8]>, ReadingError> {
        Ok(self.take(count)?.into())
    }

    pub fn read_long_array(&mut self, count: usize) -> Result<Box<[i64]>, ReadingError> {
        let needed = count
            .checked_mul(size_of::<i64>())
            .ok_or(ReadingError::BufferUnderrun {
                needed: usize::MAX,
                remaining: self.remaining(),
            })?;
        let bytes = self.take(needed)?;
        Ok(bytes
            .chunks_exact(size_of::<i64>())
            .map(|chunk| {
                let mut buf = [0u8; size_of::<i64>()];
                buf.copy_from_slice(chunk);
                i64::from_be_bytes(buf)
            })
            .collect())
    }

    /// Splits off the next `len` bytes as their own cursor and advances past them.
    pub fn slice(&mut self, len: usize) -> Result<ByteCursor<'a>, ReadingError> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(ReadingError::LengthMismatch {
                declared: len,
                remaining,
            });
        }
        Ok(ByteCursor::new(self.take(len)?))
    }

    /// Reads a named NBT compound, as sent by protocols before 1.20.2.
    pub fn read_nbt(&mut self) -> Result<Nbt, ReadingError> {
        let mut rest = self.rest();
        let before = rest.len();
        let nbt = Nbt::read(&mut ReadAdaptor::new(&mut rest))?;
        self.position += before - rest.len();
        Ok(nbt)
    }
}

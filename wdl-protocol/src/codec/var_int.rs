use std::fmt;

use bytes::BufMut;

use crate::{ByteCursor, ReadingError};

pub type VarIntType = i32;

/// A variable-length integer: seven bits per byte, high bit set while more bytes follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VarInt(pub VarIntType);

impl VarInt {
    /// The maximum number of bytes a `VarInt` can occupy.
    pub const MAX_SIZE: usize = 5;

    /// Returns the exact number of bytes this VarInt will write when [`VarInt::encode`] is called.
    pub fn written_size(&self) -> usize {
        match self.0 {
            0 => 1,
            n => (31 - n.leading_zeros() as usize) / 7 + 1,
        }
    }

    pub fn encode(&self, write: &mut impl BufMut) {
        let mut val = self.0 as u32;
        loop {
            let b = (val & 0b0111_1111) as u8;
            val >>= 7;
            if val == 0 {
                write.put_u8(b);
                break;
            }
            write.put_u8(b | 0b1000_0000);
        }
    }

    pub fn decode(read: &mut ByteCursor<'_>) -> Result<Self, ReadingError> {
        let mut val = 0u32;
        for i in 0..Self::MAX_SIZE {
            let byte = read.get_u8()?;
            val |= (u32::from(byte) & 0b0111_1111) << (i * 7);
            if byte & 0b1000_0000 == 0 {
                return Ok(VarInt(val as i32));
            }
        }
        Err(ReadingError::VarIntTooLong)
    }
}

impl From<i32> for VarInt {
    fn from(value: i32) -> Self {
        VarInt(value)
    }
}

impl From<usize> for VarInt {
    fn from(value: usize) -> Self {
        VarInt(value as i32)
    }
}

impl From<VarInt> for i32 {
    fn from(value: VarInt) -> Self {
        value.0
    }
}

impl fmt::Display for VarInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

use bytes::BufMut;
use wdl_nbt::Nbt;

use crate::{VarInt, WritingError};

pub mod cursor;

pub trait ByteBufMut {
    fn put_bool(&mut self, v: bool);

    fn put_var_int(&mut self, value: &VarInt);

    /// Writes `count` as a VarInt, rejecting counts that do not fit.
    fn put_length(&mut self, count: usize) -> Result<(), WritingError>;

    fn put_long_array(&mut self, words: &[i64]);

    fn put_nbt(&mut self, nbt: &Nbt) -> Result<(), WritingError>;
}

impl<T: BufMut> ByteBufMut for T {
    fn put_bool(&mut self, v: bool) {
        if v {
            self.put_u8(1);
        } else {
            self.put_u8(0);
        }
    }

    fn put_var_int(&mut self, value: &VarInt) {
        value.encode(self);
    }

    fn put_length(&mut self, count: usize) -> Result<(), WritingError> {
        let count = i32::try_from(count)
            .map_err(|_| WritingError::TooLarge(format!("{count} does not fit a VarInt")))?;
        self.put_var_int(&VarInt(count));
        Ok(())
    }

    fn put_long_array(&mut self, words: &[i64]) {
        for word in words {
            self.put_i64(*word);
        }
    }

    fn put_nbt(&mut self, nbt: &Nbt) -> Result<(), WritingError> {
        let bytes = nbt.write()?;
        self.put_slice(&bytes);
        Ok(())
    }
}

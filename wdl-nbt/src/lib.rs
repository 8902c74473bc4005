use std::{
    io::{self, Read, Write},
    ops::Deref,
};

use bytes::Bytes;
use compound::NbtCompound;
use io_adaptor::{ReadAdaptor, WriteAdaptor};
use thiserror::Error;

pub mod compound;
pub mod io_adaptor;
pub mod nbt_compress;
pub mod tag;

pub use tag::{NbtList, NbtTag};

pub const END_ID: u8 = 0x00;
pub const BYTE_ID: u8 = 0x01;
pub const SHORT_ID: u8 = 0x02;
pub const INT_ID: u8 = 0x03;
pub const LONG_ID: u8 = 0x04;
pub const FLOAT_ID: u8 = 0x05;
pub const DOUBLE_ID: u8 = 0x06;
pub const BYTE_ARRAY_ID: u8 = 0x07;
pub const STRING_ID: u8 = 0x08;
pub const LIST_ID: u8 = 0x09;
pub const COMPOUND_ID: u8 = 0x0A;
pub const INT_ARRAY_ID: u8 = 0x0B;
pub const LONG_ARRAY_ID: u8 = 0x0C;

/// Nesting deeper than this is treated as malicious input.
pub const MAX_DEPTH: usize = 512;

#[derive(Error, Debug)]
pub enum Error {
    #[error("The root tag of the NBT data is not a compound tag. Received tag id: {0}")]
    NoRootCompound(u8),
    #[error("Encountered an unknown NBT tag id {0}.")]
    UnknownTagId(u8),
    #[error("List declared element type {expected} but contained a tag of type {found}")]
    MixedList { expected: u8, found: u8 },
    #[error("Failed to Cesu 8 Decode")]
    Cesu8DecodingError,
    #[error("NBT reading was cut short {0}")]
    Incomplete(io::Error),
    #[error("Negative length {0}")]
    NegativeLength(i32),
    #[error("Length too large {0}")]
    LargeLength(usize),
    #[error("List of End tags declares {0} elements")]
    EndListNotEmpty(usize),
    #[error("NBT nesting exceeds {MAX_DEPTH} levels")]
    TooDeep,
}

/// A root compound together with its (possibly empty) name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Nbt {
    pub name: String,
    pub root_tag: NbtCompound,
}

impl Nbt {
    pub fn new(name: String, tag: NbtCompound) -> Self {
        Nbt {
            name,
            root_tag: tag,
        }
    }

    pub fn read<R>(reader: &mut ReadAdaptor<R>) -> Result<Nbt, Error>
    where
        R: Read,
    {
        let tag_type_id = reader.get_u8_be()?;

        if tag_type_id != COMPOUND_ID {
            return Err(Error::NoRootCompound(tag_type_id));
        }

        Ok(Nbt {
            name: get_nbt_string(reader)?,
            root_tag: NbtCompound::deserialize_content(reader, 0)?,
        })
    }

    /// Reads a root compound that was written without a name, as the network protocol does.
    pub fn read_unnamed<R>(reader: &mut ReadAdaptor<R>) -> Result<Nbt, Error>
    where
        R: Read,
    {
        let tag_type_id = reader.get_u8_be()?;

        if tag_type_id != COMPOUND_ID {
            return Err(Error::NoRootCompound(tag_type_id));
        }

        Ok(Nbt {
            name: String::new(),
            root_tag: NbtCompound::deserialize_content(reader, 0)?,
        })
    }

    pub fn write(&self) -> Result<Bytes, Error> {
        let mut bytes = Vec::new();
        self.write_to_writer(&mut bytes)?;
        Ok(bytes.into())
    }

    pub fn write_to_writer<W: Write>(&self, writer: W) -> Result<(), Error> {
        let mut writer = WriteAdaptor::new(writer);
        writer.write_u8_be(COMPOUND_ID)?;
        write_nbt_string(&mut writer, &self.name)?;
        self.root_tag.serialize_content(&mut writer)
    }

    /// Writes the root compound without its name.
    pub fn write_unnamed(&self) -> Result<Bytes, Error> {
        let mut bytes = Vec::new();
        self.write_unnamed_to_writer(&mut bytes)?;
        Ok(bytes.into())
    }

    pub fn write_unnamed_to_writer<W: Write>(&self, writer: W) -> Result<(), Error> {
        let mut writer = WriteAdaptor::new(writer);
        writer.write_u8_be(COMPOUND_ID)?;
        self.root_tag.serialize_content(&mut writer)
    }
}

impl Deref for Nbt {
    type Target = NbtCompound;

    fn deref(&self) -> &Self::Target {
        &self.root_tag
    }
}

impl From<NbtCompound> for Nbt {
    fn from(value: NbtCompound) -> Self {
        Nbt::new(String::new(), value)
    }
}

impl AsMut<NbtCompound> for Nbt {
    fn as_mut(&mut self) -> &mut NbtCompound {
        &mut self.root_tag
    }
}

pub fn get_nbt_string<R: Read>(bytes: &mut ReadAdaptor<R>) -> Result<String, Error> {
    let len = bytes.get_u16_be()? as usize;
    let string_bytes = bytes.read_boxed_slice(len)?;
    let string = cesu8::from_java_cesu8(&string_bytes).map_err(|_| Error::Cesu8DecodingError)?;
    Ok(string.to_string())
}

pub fn write_nbt_string<W: Write>(writer: &mut WriteAdaptor<W>, value: &str) -> Result<(), Error> {
    let java_string = cesu8::to_java_cesu8(value);
    let len = java_string.len();
    if len > u16::MAX as usize {
        return Err(Error::LargeLength(len));
    }

    writer.write_u16_be(len as u16)?;
    writer.write_slice(&java_string)
}

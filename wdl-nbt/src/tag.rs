use std::io::{Read, Write};

use crate::{
    compound::NbtCompound,
    io_adaptor::{ReadAdaptor, WriteAdaptor},
    *,
};

/// A list tag. The element type is kept explicitly so that empty lists keep their declared type
/// when written back out.
#[derive(Clone, Debug, PartialEq)]
pub struct NbtList {
    element_type: u8,
    tags: Vec<NbtTag>,
}

impl NbtList {
    pub fn empty(element_type: u8) -> Self {
        Self {
            element_type,
            tags: Vec::new(),
        }
    }

    /// Builds a list from homogeneous tags. An empty `tags` yields an `End`-typed list.
    pub fn from_tags(tags: Vec<NbtTag>) -> Result<Self, Error> {
        let element_type = tags.first().map_or(END_ID, NbtTag::get_type_id);
        if let Some(found) = tags
            .iter()
            .map(NbtTag::get_type_id)
            .find(|id| *id != element_type)
        {
            return Err(Error::MixedList {
                expected: element_type,
                found,
            });
        }

        Ok(Self { element_type, tags })
    }

    pub fn compounds(compounds: impl IntoIterator<Item = NbtCompound>) -> Self {
        Self {
            element_type: COMPOUND_ID,
            tags: compounds.into_iter().map(NbtTag::Compound).collect(),
        }
    }

    pub fn element_type(&self) -> u8 {
        self.element_type
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NbtTag> {
        self.tags.iter()
    }
}

impl<'a> IntoIterator for &'a NbtList {
    type Item = &'a NbtTag;
    type IntoIter = std::slice::Iter<'a, NbtTag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NbtTag {
    End,
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Box<[u8]>),
    String(String),
    List(NbtList),
    Compound(NbtCompound),
    IntArray(Box<[i32]>),
    LongArray(Box<[i64]>),
}

fn checked_len(len: usize) -> Result<i32, Error> {
    i32::try_from(len).map_err(|_| Error::LargeLength(len))
}

fn read_len<R: Read>(reader: &mut ReadAdaptor<R>) -> Result<usize, Error> {
    let len = reader.get_i32_be()?;
    if len < 0 {
        return Err(Error::NegativeLength(len));
    }
    Ok(len as usize)
}

impl NbtTag {
    /// Returns the numeric id associated with the data type.
    pub const fn get_type_id(&self) -> u8 {
        match self {
            NbtTag::End => END_ID,
            NbtTag::Byte(_) => BYTE_ID,
            NbtTag::Short(_) => SHORT_ID,
            NbtTag::Int(_) => INT_ID,
            NbtTag::Long(_) => LONG_ID,
            NbtTag::Float(_) => FLOAT_ID,
            NbtTag::Double(_) => DOUBLE_ID,
            NbtTag::ByteArray(_) => BYTE_ARRAY_ID,
            NbtTag::String(_) => STRING_ID,
            NbtTag::List(_) => LIST_ID,
            NbtTag::Compound(_) => COMPOUND_ID,
            NbtTag::IntArray(_) => INT_ARRAY_ID,
            NbtTag::LongArray(_) => LONG_ARRAY_ID,
        }
    }

    pub fn serialize<W>(&self, w: &mut WriteAdaptor<W>) -> Result<(), Error>
    where
        W: Write,
    {
        w.write_u8_be(self.get_type_id())?;
        self.serialize_data(w)
    }

    pub fn serialize_data<W>(&self, w: &mut WriteAdaptor<W>) -> Result<(), Error>
    where
        W: Write,
    {
        match self {
            NbtTag::End => {}
            NbtTag::Byte(byte) => w.write_i8_be(*byte)?,
            NbtTag::Short(short) => w.write_i16_be(*short)?,
            NbtTag::Int(int) => w.write_i32_be(*int)?,
            NbtTag::Long(long) => w.write_i64_be(*long)?,
            NbtTag::Float(float) => w.write_f32_be(*float)?,
            NbtTag::Double(double) => w.write_f64_be(*double)?,
            NbtTag::ByteArray(byte_array) => {
                w.write_i32_be(checked_len(byte_array.len())?)?;
                w.write_slice(byte_array)?;
            }
            NbtTag::String(string) => write_nbt_string(w, string)?,
            NbtTag::List(list) => {
                w.write_u8_be(list.element_type)?;
                w.write_i32_be(checked_len(list.len())?)?;
                for nbt_tag in list {
                    nbt_tag.serialize_data(w)?;
                }
            }
            NbtTag::Compound(compound) => compound.serialize_content(w)?,
            NbtTag::IntArray(int_array) => {
                w.write_i32_be(checked_len(int_array.len())?)?;
                for int in int_array {
                    w.write_i32_be(*int)?;
                }
            }
            NbtTag::LongArray(long_array) => {
                w.write_i32_be(checked_len(long_array.len())?)?;
                for long in long_array {
                    w.write_i64_be(*long)?;
                }
            }
        };
        Ok(())
    }

    pub fn deserialize<R>(reader: &mut ReadAdaptor<R>) -> Result<NbtTag, Error>
    where
        R: Read,
    {
        let tag_id = reader.get_u8_be()?;
        Self::deserialize_data(reader, tag_id, 0)
    }

    pub fn deserialize_data<R>(
        reader: &mut ReadAdaptor<R>,
        tag_id: u8,
        depth: usize,
    ) -> Result<NbtTag, Error>
    where
        R: Read,
    {
        if depth > MAX_DEPTH {
            return Err(Error::TooDeep);
        }

        match tag_id {
            END_ID => Ok(NbtTag::End),
            BYTE_ID => Ok(NbtTag::Byte(reader.get_i8_be()?)),
            SHORT_ID => Ok(NbtTag::Short(reader.get_i16_be()?)),
            INT_ID => Ok(NbtTag::Int(reader.get_i32_be()?)),
            LONG_ID => Ok(NbtTag::Long(reader.get_i64_be()?)),
            FLOAT_ID => Ok(NbtTag::Float(reader.get_f32_be()?)),
            DOUBLE_ID => Ok(NbtTag::Double(reader.get_f64_be()?)),
            BYTE_ARRAY_ID => {
                let len = read_len(reader)?;
                Ok(NbtTag::ByteArray(reader.read_boxed_slice(len)?))
            }
            STRING_ID => Ok(NbtTag::String(get_nbt_string(reader)?)),
            LIST_ID => {
                let element_type = reader.get_u8_be()?;
                let len = read_len(reader)?;
                // End elements carry no bytes, so only an empty list may declare them
                if element_type == END_ID && len > 0 {
                    return Err(Error::EndListNotEmpty(len));
                }

                // Don't trust the declared length for the allocation
                let mut tags = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    tags.push(NbtTag::deserialize_data(reader, element_type, depth + 1)?);
                }
                Ok(NbtTag::List(NbtList { element_type, tags }))
            }
            COMPOUND_ID => Ok(NbtTag::Compound(NbtCompound::deserialize_content(
                reader,
                depth + 1,
            )?)),
            INT_ARRAY_ID => {
                let len = read_len(reader)?;
                let mut int_array = Vec::with_capacity(len.min(4096));
                for _ in 0..len {
                    int_array.push(reader.get_i32_be()?);
                }
                Ok(NbtTag::IntArray(int_array.into_boxed_slice()))
            }
            LONG_ARRAY_ID => {
                let len = read_len(reader)?;
                let mut long_array = Vec::with_capacity(len.min(4096));
                for _ in 0..len {
                    long_array.push(reader.get_i64_be()?);
                }
                Ok(NbtTag::LongArray(long_array.into_boxed_slice()))
            }
            _ => Err(Error::UnknownTagId(tag_id)),
        }
    }

    pub fn extract_byte(&self) -> Option<i8> {
        match self {
            NbtTag::Byte(byte) => Some(*byte),
            _ => None,
        }
    }

    pub fn extract_short(&self) -> Option<i16> {
        match self {
            NbtTag::Short(short) => Some(*short),
            _ => None,
        }
    }

    pub fn extract_int(&self) -> Option<i32> {
        match self {
            NbtTag::Int(int) => Some(*int),
            _ => None,
        }
    }

    pub fn extract_long(&self) -> Option<i64> {
        match self {
            NbtTag::Long(long) => Some(*long),
            _ => None,
        }
    }

    pub fn extract_bool(&self) -> Option<bool> {
        match self {
            NbtTag::Byte(byte) => Some(*byte != 0),
            _ => None,
        }
    }

    pub fn extract_byte_array(&self) -> Option<&[u8]> {
        match self {
            NbtTag::ByteArray(byte_array) => Some(byte_array),
            _ => None,
        }
    }

    pub fn extract_string(&self) -> Option<&String> {
        match self {
            NbtTag::String(string) => Some(string),
            _ => None,
        }
    }

    pub fn extract_list(&self) -> Option<&NbtList> {
        match self {
            NbtTag::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn extract_compound(&self) -> Option<&NbtCompound> {
        match self {
            NbtTag::Compound(compound) => Some(compound),
            _ => None,
        }
    }

    pub fn extract_int_array(&self) -> Option<&[i32]> {
        match self {
            NbtTag::IntArray(int_array) => Some(int_array),
            _ => None,
        }
    }

    pub fn extract_long_array(&self) -> Option<&[i64]> {
        match self {
            NbtTag::LongArray(long_array) => Some(long_array),
            _ => None,
        }
    }
}

impl From<&str> for NbtTag {
    fn from(value: &str) -> Self {
        NbtTag::String(value.to_string())
    }
}

impl From<String> for NbtTag {
    fn from(value: String) -> Self {
        NbtTag::String(value)
    }
}

impl From<&[u8]> for NbtTag {
    fn from(value: &[u8]) -> Self {
        NbtTag::ByteArray(value.into())
    }
}

impl From<bool> for NbtTag {
    fn from(value: bool) -> Self {
        NbtTag::Byte(value as i8)
    }
}

impl From<NbtCompound> for NbtTag {
    fn from(value: NbtCompound) -> Self {
        NbtTag::Compound(value)
    }
}

impl From<NbtList> for NbtTag {
    fn from(value: NbtList) -> Self {
        NbtTag::List(value)
    }
}

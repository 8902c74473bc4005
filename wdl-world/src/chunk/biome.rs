use bytes::BufMut;
use wdl_nbt::NbtTag;
use wdl_protocol::{ByteBufMut, ByteCursor, ReadingError, VarInt, WritingError};

use super::version::BiomeFormat;

pub fn read(cursor: &mut ByteCursor<'_>, format: BiomeFormat) -> Result<Box<[i32]>, ReadingError> {
    match format {
        BiomeFormat::FlatBytes => Ok(cursor
            .read_bytes(format.entries())?
            .iter()
            .map(|&biome| i32::from(biome))
            .collect()),
        BiomeFormat::FlatInts | BiomeFormat::CubeInts => {
            (0..format.entries()).map(|_| cursor.get_i32_be()).collect()
        }
        BiomeFormat::CubeVarInts => {
            let len = cursor.get_length()?;
            (0..len)
                .map(|_| cursor.get_var_int().map(i32::from))
                .collect()
        }
    }
}

/// Writes `biomes`, or all zeros when the column has none.
pub fn write(
    buf: &mut impl BufMut,
    format: BiomeFormat,
    biomes: Option<&[i32]>,
) -> Result<(), WritingError> {
    let default = vec![0; format.entries()];
    let biomes = biomes.unwrap_or(&default);
    match format {
        BiomeFormat::FlatBytes => {
            for &biome in biomes {
                buf.put_u8(biome as u8);
            }
        }
        BiomeFormat::FlatInts | BiomeFormat::CubeInts => {
            for &biome in biomes {
                buf.put_i32(biome);
            }
        }
        BiomeFormat::CubeVarInts => {
            buf.put_length(biomes.len())?;
            for &biome in biomes {
                buf.put_var_int(&VarInt(biome));
            }
        }
    }
    Ok(())
}

pub fn to_nbt(format: BiomeFormat, biomes: Option<&[i32]>) -> NbtTag {
    match (format, biomes) {
        (BiomeFormat::FlatBytes, Some(biomes)) => {
            NbtTag::ByteArray(biomes.iter().map(|&biome| biome as u8).collect())
        }
        (BiomeFormat::FlatBytes, None) => NbtTag::ByteArray(vec![0; format.entries()].into()),
        (_, Some(biomes)) => NbtTag::IntArray(biomes.into()),
        (_, None) => NbtTag::IntArray(vec![0; format.entries()].into()),
    }
}

pub fn from_nbt(tag: &NbtTag) -> Option<Box<[i32]>> {
    match tag {
        NbtTag::ByteArray(biomes) => Some(biomes.iter().map(|&biome| i32::from(biome)).collect()),
        NbtTag::IntArray(biomes) => Some(biomes.clone()),
        _ => None,
    }
}

use bytes::BufMut;
use wdl_nbt::{NbtList, NbtTag, compound::NbtCompound};
use wdl_protocol::{ByteBufMut, ByteCursor, codec::packed_array::PackedLayout};
use wdl_util::{Dimension, encompassing_bits};

use crate::block::{AIR_ID, BlockState, BlockStateRegistry};

use super::{
    ChunkParsingError, ChunkSerializingError,
    palette::{Palette, index_states},
    version::{MIN_INDIRECT_BITS, VersionStrategy},
};

pub const SECTION_WIDTH: usize = 16;
pub const SECTION_VOLUME: usize = SECTION_WIDTH * SECTION_WIDTH * SECTION_WIDTH;
/// One nibble per block.
pub const LIGHT_SIZE: usize = SECTION_VOLUME / 2;

/// A 16x16x16 slab of a chunk column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSection {
    y: u8,
    palette: Palette,
    layout: PackedLayout,
    /// Palette indices packed at `palette.bits()` per entry, indexed by `y << 8 | z << 4 | x`.
    blocks: Box<[i64]>,
    block_light: Option<Box<[u8]>>,
    sky_light: Option<Box<[u8]>>,
}

#[inline]
const fn block_index(x: usize, y: usize, z: usize) -> usize {
    (y << 8) | (z << 4) | x
}

fn get_nibble(array: &[u8], index: usize) -> u8 {
    let byte = array[index >> 1];
    if index & 1 == 0 { byte & 0x0F } else { byte >> 4 }
}

fn set_nibble(array: &mut [u8], index: usize, value: u8) {
    let byte = &mut array[index >> 1];
    if index & 1 == 0 {
        *byte = (*byte & 0xF0) | (value & 0x0F);
    } else {
        *byte = (*byte & 0x0F) | (value << 4);
    }
}

fn light_array(tag: &NbtCompound, name: &str) -> Option<Box<[u8]>> {
    tag.get_byte_array(name)
        .filter(|array| array.len() == LIGHT_SIZE)
        .map(Into::into)
}

impl ChunkSection {
    /// Reads the packed block array and light that follow a section's palette.
    ///
    /// Returns `None` when the section declares no stored blocks.
    pub fn decode(
        y: u8,
        palette: Palette,
        cursor: &mut ByteCursor<'_>,
        strategy: &VersionStrategy,
        dimension: Dimension,
    ) -> Result<Option<Self>, ChunkParsingError> {
        let word_count = cursor.get_length()?;
        if word_count == 0 {
            return Ok(None);
        }

        let expected = strategy.layout.word_count(palette.bits(), SECTION_VOLUME);
        if word_count != expected {
            return Err(ChunkParsingError::InvalidSection(format!(
                "section {y} declares {word_count} words, {expected} needed at {} bits",
                palette.bits()
            )));
        }
        let blocks = cursor.read_long_array(word_count)?;

        let (block_light, sky_light) = if strategy.section_light {
            let block_light = cursor.read_boxed_slice(LIGHT_SIZE)?;
            let sky_light = if dimension.has_sky_light() {
                Some(cursor.read_boxed_slice(LIGHT_SIZE)?)
            } else {
                None
            };
            (Some(block_light), sky_light)
        } else {
            (None, None)
        };

        Ok(Some(Self {
            y,
            palette,
            layout: strategy.layout,
            blocks,
            block_light,
            sky_light,
        }))
    }

    /// Builds a section from 4096 global ids in `y << 8 | z << 4 | x` order.
    pub fn from_states(y: u8, states: &[u32], strategy: &VersionStrategy) -> Self {
        debug_assert_eq!(states.len(), SECTION_VOLUME);
        let (palette, indices) = Palette::from_states(states, strategy);
        let blocks = strategy.layout.pack(&indices, palette.bits());
        Self {
            y,
            palette,
            layout: strategy.layout,
            blocks,
            block_light: None,
            sky_light: None,
        }
    }

    pub fn y(&self) -> u8 {
        self.y
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn blocks(&self) -> &[i64] {
        &self.blocks
    }

    pub fn block_light(&self) -> Option<&[u8]> {
        self.block_light.as_deref()
    }

    pub fn sky_light(&self) -> Option<&[u8]> {
        self.sky_light.as_deref()
    }

    pub fn block_state_at(&self, x: usize, y: usize, z: usize) -> Result<u32, ChunkParsingError> {
        debug_assert!(x < SECTION_WIDTH && y < SECTION_WIDTH && z < SECTION_WIDTH);
        self.state_at_index(block_index(x, y, z))
    }

    fn state_at_index(&self, index: usize) -> Result<u32, ChunkParsingError> {
        let local = self
            .layout
            .get(&self.blocks, self.palette.bits(), index)
            .ok_or_else(|| {
                ChunkParsingError::InvalidSection(format!("block {index} is past the data array"))
            })?;
        self.palette.resolve(local)
    }

    /// Every global id in the section, in index order.
    pub fn states(&self) -> Result<Vec<u32>, ChunkParsingError> {
        (0..SECTION_VOLUME)
            .map(|index| self.state_at_index(index))
            .collect()
    }

    pub fn non_air_count(&self) -> Result<u16, ChunkParsingError> {
        if self.palette.is_empty() {
            return Ok(0);
        }
        let mut count = 0;
        for index in 0..SECTION_VOLUME {
            if self.state_at_index(index)? != AIR_ID {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn encode(
        &self,
        buf: &mut impl BufMut,
        strategy: &VersionStrategy,
        dimension: Dimension,
    ) -> Result<(), ChunkSerializingError> {
        if strategy.block_count {
            buf.put_i16(self.non_air_count()? as i16);
        }
        self.palette.write(buf, strategy)?;

        let repacked;
        let blocks = if self.layout == strategy.layout {
            &self.blocks
        } else {
            let indices = self.layout.unpack(&self.blocks, self.palette.bits(), SECTION_VOLUME);
            repacked = strategy.layout.pack(&indices, self.palette.bits());
            &repacked
        };
        buf.put_length(blocks.len())?;
        buf.put_long_array(blocks);

        if strategy.section_light {
            match &self.block_light {
                Some(light) => buf.put_slice(light),
                None => buf.put_bytes(0, LIGHT_SIZE),
            }
            if dimension.has_sky_light() {
                match &self.sky_light {
                    Some(light) => buf.put_slice(light),
                    None => buf.put_bytes(0xFF, LIGHT_SIZE),
                }
            }
        }
        Ok(())
    }

    pub fn to_nbt(
        &self,
        strategy: &VersionStrategy,
        registry: &dyn BlockStateRegistry,
    ) -> Result<NbtCompound, ChunkSerializingError> {
        let mut tag = NbtCompound::new();
        tag.put_byte("Y", self.y as i8);

        let states = self.states()?;
        if strategy.legacy_ids() {
            let mut blocks = vec![0u8; SECTION_VOLUME];
            let mut data = vec![0u8; LIGHT_SIZE];
            let mut add = vec![0u8; LIGHT_SIZE];
            let mut has_add = false;
            for (index, state) in states.into_iter().enumerate() {
                blocks[index] = (state >> 4) as u8;
                set_nibble(&mut data, index, (state & 0x0F) as u8);
                let extra = ((state >> 12) & 0x0F) as u8;
                if extra != 0 {
                    has_add = true;
                    set_nibble(&mut add, index, extra);
                }
            }
            tag.put("Blocks", NbtTag::ByteArray(blocks.into()));
            tag.put("Data", NbtTag::ByteArray(data.into()));
            if has_add {
                tag.put("Add", NbtTag::ByteArray(add.into()));
            }
        } else {
            // Saved sections always use a local palette, however many states there are.
            let (distinct, indices) = index_states(&states);
            let bits = encompassing_bits(distinct.len()).max(MIN_INDIRECT_BITS);
            let palette = distinct
                .into_iter()
                .map(|id| {
                    registry
                        .state(id)
                        .map(BlockState::to_nbt)
                        .ok_or(ChunkSerializingError::UnknownBlockState(id))
                })
                .collect::<Result<Vec<_>, _>>()?;
            tag.put_list("Palette", NbtList::compounds(palette));
            tag.put(
                "BlockStates",
                NbtTag::LongArray(strategy.layout.pack(&indices, bits)),
            );
        }

        if let Some(light) = &self.block_light {
            tag.put("BlockLight", NbtTag::ByteArray(light.clone()));
        }
        if let Some(light) = &self.sky_light {
            tag.put("SkyLight", NbtTag::ByteArray(light.clone()));
        }
        Ok(tag)
    }

    pub fn from_nbt(
        tag: &NbtCompound,
        strategy: &VersionStrategy,
        registry: &dyn BlockStateRegistry,
    ) -> Result<Self, ChunkParsingError> {
        let y = tag
            .get_byte("Y")
            .ok_or_else(|| ChunkParsingError::InvalidSection("missing Y".to_string()))?;

        let states = if strategy.legacy_ids() {
            let blocks = tag
                .get_byte_array("Blocks")
                .filter(|blocks| blocks.len() == SECTION_VOLUME)
                .ok_or_else(|| {
                    ChunkParsingError::InvalidSection(format!("section {y}: bad Blocks"))
                })?;
            let data = tag
                .get_byte_array("Data")
                .filter(|data| data.len() == LIGHT_SIZE)
                .ok_or_else(|| {
                    ChunkParsingError::InvalidSection(format!("section {y}: bad Data"))
                })?;
            let add = tag
                .get_byte_array("Add")
                .filter(|add| add.len() == LIGHT_SIZE);

            (0..SECTION_VOLUME)
                .map(|index| {
                    let extra = add.map_or(0, |add| u32::from(get_nibble(add, index)));
                    extra << 12
                        | u32::from(blocks[index]) << 4
                        | u32::from(get_nibble(data, index))
                })
                .collect::<Vec<_>>()
        } else {
            let palette = tag
                .get_list("Palette")
                .ok_or_else(|| {
                    ChunkParsingError::InvalidSection(format!("section {y}: no Palette"))
                })?
                .iter()
                .map(|entry| {
                    let state = entry
                        .extract_compound()
                        .and_then(BlockState::from_nbt)
                        .ok_or_else(|| {
                            ChunkParsingError::InvalidSection(format!(
                                "section {y}: bad palette entry"
                            ))
                        })?;
                    registry.id_of(&state).ok_or_else(|| {
                        ChunkParsingError::InvalidSection(format!("unknown block state {state}"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let words = tag.get_long_array("BlockStates").ok_or_else(|| {
                ChunkParsingError::InvalidSection(format!("section {y}: no BlockStates"))
            })?;

            let bits = encompassing_bits(palette.len()).max(MIN_INDIRECT_BITS);
            if words.len() < strategy.layout.word_count(bits, SECTION_VOLUME) {
                return Err(ChunkParsingError::InvalidSection(format!(
                    "section {y}: BlockStates too short"
                )));
            }
            strategy
                .layout
                .unpack(words, bits, SECTION_VOLUME)
                .into_iter()
                .map(|index| {
                    palette.get(index as usize).copied().ok_or(
                        ChunkParsingError::PaletteIndexOutOfRange {
                            index,
                            len: palette.len(),
                        },
                    )
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut section = Self::from_states(y as u8, &states, strategy);
        section.block_light = light_array(tag, "BlockLight");
        section.sky_light = light_array(tag, "SkyLight");
        Ok(section)
    }
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;
    use wdl_protocol::{ByteCursor, VarInt, codec::packed_array::PackedLayout};
    use wdl_util::Dimension;

    use crate::{
        block::{BlockState, GlobalPalette},
        chunk::{
            ChunkParsingError, ChunkSerializingError,
            palette::Palette,
            section::{ChunkSection, LIGHT_SIZE, SECTION_VOLUME},
            version::VersionStrategy,
        },
    };

    fn strategy(protocol: i32) -> &'static VersionStrategy {
        VersionStrategy::for_protocol(protocol).unwrap()
    }

    fn layered_states() -> Vec<u32> {
        (0..SECTION_VOLUME).map(|index| (index >> 8) as u32 * 16).collect()
    }

    /// 300 distinct ids, too many for an indirect palette.
    fn scattered_states() -> Vec<u32> {
        (0..SECTION_VOLUME)
            .map(|index| (index % 300) as u32 * 16)
            .collect()
    }

    fn read_back(
        buf: &[u8],
        strategy: &VersionStrategy,
        dimension: Dimension,
    ) -> (ChunkSection, usize) {
        let mut cursor = ByteCursor::new(buf);
        if strategy.block_count {
            cursor.get_i16_be().unwrap();
        }
        let bits = cursor.get_u8().unwrap();
        let palette = Palette::read(bits, &mut cursor, strategy).unwrap();
        let section = ChunkSection::decode(0, palette, &mut cursor, strategy, dimension)
            .unwrap()
            .unwrap();
        (section, cursor.remaining())
    }

    #[test]
    fn test_block_lookup() {
        let states = layered_states();
        let section = ChunkSection::from_states(3, &states, strategy(578));

        assert_eq!(section.y(), 3);
        assert_eq!(section.block_state_at(0, 0, 0).unwrap(), 0);
        assert_eq!(section.block_state_at(5, 1, 9).unwrap(), 16);
        assert_eq!(section.block_state_at(15, 15, 15).unwrap(), 240);
        assert_eq!(section.non_air_count().unwrap(), 4096 - 256);
    }

    #[test]
    fn test_encode_decode_keeps_blocks() {
        for protocol in [340, 404, 498, 578, 736, 754] {
            let s = strategy(protocol);
            let states = layered_states();
            let section = ChunkSection::from_states(0, &states, s);

            let mut buf = BytesMut::new();
            section.encode(&mut buf, s, Dimension::Overworld).unwrap();
            let (read, remaining) = read_back(&buf, s, Dimension::Overworld);

            assert_eq!(remaining, 0, "{}", s.release);
            assert_eq!(read.states().unwrap(), states, "{}", s.release);
        }
    }

    #[test]
    fn test_light_depends_on_dimension() {
        let s = strategy(340);
        let section = ChunkSection::from_states(0, &layered_states(), s);

        let mut overworld = BytesMut::new();
        section.encode(&mut overworld, s, Dimension::Overworld).unwrap();
        let mut nether = BytesMut::new();
        section.encode(&mut nether, s, Dimension::Nether).unwrap();
        assert_eq!(overworld.len(), nether.len() + LIGHT_SIZE);

        let (read, _) = read_back(&overworld, s, Dimension::Overworld);
        assert_eq!(read.block_light().map(<[u8]>::len), Some(LIGHT_SIZE));
        assert_eq!(read.sky_light().map(<[u8]>::len), Some(LIGHT_SIZE));

        let (read, remaining) = read_back(&nether, s, Dimension::Nether);
        assert_eq!(remaining, 0);
        assert!(read.block_light().is_some());
        assert!(read.sky_light().is_none());
    }

    #[test]
    fn test_no_section_light_after_1_14() {
        let s = strategy(498);
        let section = ChunkSection::from_states(0, &layered_states(), s);
        let mut buf = BytesMut::new();
        section.encode(&mut buf, s, Dimension::Overworld).unwrap();

        let (read, remaining) = read_back(&buf, s, Dimension::Overworld);
        assert_eq!(remaining, 0);
        assert!(read.block_light().is_none());
        assert!(read.sky_light().is_none());
    }

    #[test]
    fn test_zero_length_section() {
        let s = strategy(578);
        let bytes = [0x00];
        let mut cursor = ByteCursor::new(&bytes);
        let palette = Palette::Indirect {
            bits: 4,
            states: vec![0, 1].into(),
        };
        let section =
            ChunkSection::decode(0, palette, &mut cursor, s, Dimension::Overworld).unwrap();
        assert!(section.is_none());
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_wrong_word_count() {
        let s = strategy(578);
        let bytes = [0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let mut cursor = ByteCursor::new(&bytes);
        let palette = Palette::Indirect {
            bits: 4,
            states: vec![0, 1].into(),
        };
        assert!(ChunkSection::decode(0, palette, &mut cursor, s, Dimension::Overworld).is_err());
    }

    #[test]
    fn test_direct_palette_per_version() {
        for s in VersionStrategy::all() {
            let states = scattered_states();
            let section = ChunkSection::from_states(0, &states, s);
            assert_eq!(
                section.palette(),
                &Palette::Direct {
                    bits: s.direct_bits
                },
                "{}",
                s.release
            );

            let mut buf = BytesMut::new();
            section.encode(&mut buf, s, Dimension::Overworld).unwrap();

            let mut cursor = ByteCursor::new(&buf);
            if s.block_count {
                // every 300th block is air
                assert_eq!(cursor.get_i16_be().unwrap(), 4096 - 14, "{}", s.release);
            }
            assert_eq!(cursor.get_u8().unwrap(), s.direct_bits, "{}", s.release);
            if s.direct_palette_length {
                assert_eq!(cursor.get_var_int().unwrap(), VarInt(0));
            }
            let words = cursor.get_length().unwrap();
            let expected = match s.layout {
                PackedLayout::Spanning => s.direct_bits as usize * 64,
                PackedLayout::Aligned => SECTION_VOLUME / (64 / s.direct_bits as usize),
            };
            assert_eq!(words, expected, "{}", s.release);

            let (read, remaining) = read_back(&buf, s, Dimension::Overworld);
            assert_eq!(remaining, 0, "{}", s.release);
            assert_eq!(read.palette(), section.palette(), "{}", s.release);
            assert_eq!(read.states().unwrap(), states, "{}", s.release);
        }
    }

    #[test]
    fn test_direct_word_count_checked() {
        let s = strategy(754);
        // 1023 words, one short of 15 bits aligned
        let bytes = [0xFF, 0x07];
        let mut cursor = ByteCursor::new(&bytes);
        let palette = Palette::Direct { bits: 15 };
        assert!(matches!(
            ChunkSection::decode(0, palette, &mut cursor, s, Dimension::Overworld),
            Err(ChunkParsingError::InvalidSection(_))
        ));
    }

    #[test]
    fn test_legacy_nbt() {
        let s = strategy(340);
        // stone:1 everywhere, with one block of id 300 meta 2 to need the Add array
        let mut states = vec![1 << 4 | 1; SECTION_VOLUME];
        states[17] = 300 << 4 | 2;
        let section = ChunkSection::from_states(2, &states, s);

        let tag = section.to_nbt(s, &GlobalPalette::new()).unwrap();
        assert_eq!(tag.get_byte("Y"), Some(2));
        assert_eq!(tag.get_byte_array("Blocks").unwrap()[0], 1);
        assert!(tag.contains_key("Add"));
        assert!(!tag.contains_key("Palette"));

        let read = ChunkSection::from_nbt(&tag, s, &GlobalPalette::new()).unwrap();
        assert_eq!(read.states().unwrap(), states);
    }

    #[test]
    fn test_palette_nbt() {
        let s = strategy(754);
        let registry: GlobalPalette = [
            (0, BlockState::new("minecraft:air")),
            (1, BlockState::new("minecraft:stone")),
            (74, BlockState::new("minecraft:oak_log").with_property("axis", "y")),
        ]
        .into_iter()
        .collect();
        let states: Vec<u32> = (0..SECTION_VOLUME as u32)
            .map(|index| [0, 1, 74][index as usize % 3])
            .collect();
        let section = ChunkSection::from_states(0, &states, s);

        let tag = section.to_nbt(s, &registry).unwrap();
        assert_eq!(tag.get_list("Palette").unwrap().len(), 3);
        assert_eq!(tag.get_long_array("BlockStates").unwrap().len(), 256);

        let read = ChunkSection::from_nbt(&tag, s, &registry).unwrap();
        assert_eq!(read, section);
    }

    #[test]
    fn test_unknown_state_cannot_be_saved() {
        let s = strategy(578);
        let section = ChunkSection::from_states(0, &vec![5; SECTION_VOLUME], s);
        assert!(matches!(
            section.to_nbt(s, &GlobalPalette::new()),
            Err(ChunkSerializingError::UnknownBlockState(5))
        ));
    }
}

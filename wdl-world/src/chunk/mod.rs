use bytes::{BufMut, BytesMut};
use thiserror::Error;
use wdl_nbt::{COMPOUND_ID, Nbt, NbtList, NbtTag, compound::NbtCompound};
use wdl_protocol::{ByteBufMut, ByteCursor, ReadingError, VarInt, WritingError};
use wdl_util::{Dimension, math::vector2::Vector2};

use crate::block::{BlockState, BlockStateRegistry};

pub mod biome;
pub mod callback;
pub mod entities;
pub mod palette;
pub mod section;
pub mod version;

use callback::{CallbackHandle, Callbacks};
pub use callback::ChunkCallback;
use entities::TileEntities;
use palette::Palette;
use section::{ChunkSection, SECTION_WIDTH};
use version::VersionStrategy;

pub const SECTION_COUNT: usize = 16;
pub const CHUNK_AREA: usize = SECTION_WIDTH * SECTION_WIDTH;
pub const CHUNK_HEIGHT: usize = SECTION_COUNT * SECTION_WIDTH;

/// Height map entries are stored at this width.
const HEIGHT_MAP_BITS: u8 = 9;
const MOTION_BLOCKING: &str = "MOTION_BLOCKING";

#[derive(Error, Debug)]
pub enum ChunkParsingError {
    #[error(transparent)]
    Reading(#[from] ReadingError),
    #[error("palette index {index} is out of range for a palette of {len} entries")]
    PaletteIndexOutOfRange { index: u32, len: usize },
    #[error("no chunk format is known for protocol version {0}")]
    UnsupportedVersion(i32),
    #[error("invalid section: {0}")]
    InvalidSection(String),
}

#[derive(Error, Debug)]
pub enum ChunkSerializingError {
    #[error(transparent)]
    Writing(#[from] WritingError),
    #[error("block state {0} is missing from the global palette")]
    UnknownBlockState(u32),
    #[error("chunk holds corrupt data: {0}")]
    Parsing(#[from] ChunkParsingError),
}

/// The fields of a chunk data packet that come before the column payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDataHeader {
    pub position: Vector2<i32>,
    /// The packet carries a whole column rather than an update of some sections.
    pub full: bool,
}

impl ChunkDataHeader {
    pub fn read(
        cursor: &mut ByteCursor<'_>,
        strategy: &VersionStrategy,
    ) -> Result<Self, ChunkParsingError> {
        let x = cursor.get_i32_be()?;
        let z = cursor.get_i32_be()?;
        let full = cursor.get_bool()?;
        if strategy.ignore_old_data {
            cursor.get_bool()?;
        }
        Ok(Self {
            position: Vector2::new(x, z),
            full,
        })
    }
}

/// One 16x256x16 column of the world and everything captured about it.
#[derive(Debug)]
pub struct ChunkColumn {
    position: Vector2<i32>,
    dimension: Dimension,
    sections: [Option<Box<ChunkSection>>; SECTION_COUNT],
    /// Decoded `MOTION_BLOCKING` heights, indexed by `z << 4 | x`.
    height_map: Option<Box<[i32]>>,
    /// The height map compound as last received.
    height_maps: Option<NbtCompound>,
    biomes: Option<Box<[i32]>>,
    tile_entities: TileEntities,
    saved: bool,
    is_new: bool,
    callbacks: Callbacks,
}

type StagedSections = [Option<Box<ChunkSection>>; SECTION_COUNT];

impl ChunkColumn {
    pub fn new(position: Vector2<i32>, dimension: Dimension) -> Self {
        Self {
            position,
            dimension,
            sections: Default::default(),
            height_map: None,
            height_maps: None,
            biomes: None,
            tile_entities: TileEntities::default(),
            saved: false,
            is_new: false,
            callbacks: Callbacks::default(),
        }
    }

    pub fn position(&self) -> Vector2<i32> {
        self.position
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Reads the payload of a chunk data packet that follows [`ChunkDataHeader`].
    ///
    /// Nothing is modified unless the whole payload decodes. `dimension` is the
    /// dimension the player is in right now and decides whether sky light is sent.
    pub fn parse(
        &mut self,
        cursor: &mut ByteCursor<'_>,
        full: bool,
        strategy: &VersionStrategy,
        dimension: Dimension,
    ) -> Result<(), ChunkParsingError> {
        let VarInt(mask) = cursor.get_var_int()?;

        let height_maps = if strategy.height_maps {
            Some(cursor.read_nbt()?.root_tag)
        } else {
            None
        };

        let mut biomes = None;
        if full && strategy.biomes.is_3d() {
            biomes = Some(biome::read(cursor, strategy.biomes)?);
        }

        let size = cursor.get_length()?;
        let mut column = cursor.slice(size)?;
        let (sections, flat_biomes) =
            Self::read_chunk_column(full, mask as u32, &mut column, strategy, dimension)?;

        let tile_entity_count = cursor.get_length()?;
        let tile_entities = (0..tile_entity_count)
            .map(|_| cursor.read_nbt().map(|nbt| nbt.root_tag))
            .collect::<Result<Vec<_>, _>>()?;

        for (slot, section) in self.sections.iter_mut().zip(sections) {
            if section.is_some() {
                *slot = section;
            }
        }
        if let Some(height_maps) = height_maps {
            self.set_height_maps(height_maps, strategy);
        }
        if let Some(biomes) = biomes.or(flat_biomes) {
            self.biomes = Some(biomes);
        }
        for tag in tile_entities {
            self.tile_entities.add(tag);
        }

        self.saved = false;
        if let Some(callback) = self.callbacks.take_after_parse() {
            callback(self);
        }
        Ok(())
    }

    /// Reads the sections flagged in `mask` from the section blob, followed by
    /// the 2D biomes of a full chunk on versions that append them.
    fn read_chunk_column(
        full: bool,
        mut mask: u32,
        cursor: &mut ByteCursor<'_>,
        strategy: &VersionStrategy,
        dimension: Dimension,
    ) -> Result<(StagedSections, Option<Box<[i32]>>), ChunkParsingError> {
        let mut sections: StagedSections = Default::default();

        // Nothing is sent for sections above the highest set bit.
        let mut section_y = 0;
        while section_y < SECTION_COUNT && mask != 0 {
            let present = mask & 1 != 0;
            let y = section_y;
            section_y += 1;
            mask >>= 1;
            if !present {
                continue;
            }

            if strategy.block_count {
                cursor.get_i16_be()?;
            }

            let bits_per_entry = cursor.get_u8()?;
            let palette = Palette::read(bits_per_entry, cursor, strategy)?;
            let Some(section) = ChunkSection::decode(y as u8, palette, cursor, strategy, dimension)?
            else {
                continue;
            };

            if !section.palette().is_empty() {
                sections[y] = Some(Box::new(section));
            }
        }

        let biomes = if full && !strategy.biomes.is_3d() {
            Some(biome::read(cursor, strategy.biomes)?)
        } else {
            None
        };
        Ok((sections, biomes))
    }

    /// Builds a full chunk data packet, packet id included.
    ///
    /// Tile entities are not included.
    pub fn to_packet(
        &self,
        strategy: &VersionStrategy,
        dimension: Dimension,
    ) -> Result<BytesMut, ChunkSerializingError> {
        let mut packet = BytesMut::new();
        packet.put_var_int(&VarInt(strategy.chunk_data_id));
        packet.put_i32(self.position.x);
        packet.put_i32(self.position.z);
        packet.put_bool(true);
        if strategy.ignore_old_data {
            packet.put_bool(true);
        }
        packet.put_var_int(&VarInt(i32::from(self.section_mask())));

        if strategy.height_maps {
            packet.put_nbt(&Nbt::from(self.height_maps_nbt(strategy)))?;
        }
        if strategy.biomes.is_3d() {
            biome::write(&mut packet, strategy.biomes, self.biomes.as_deref())?;
        }

        let mut column = BytesMut::new();
        for section in self.sections.iter().flatten() {
            section.encode(&mut column, strategy, dimension)?;
        }
        if !strategy.biomes.is_3d() {
            biome::write(&mut column, strategy.biomes, self.biomes.as_deref())?;
        }
        packet.put_length(column.len())?;
        packet.put_slice(&column);

        packet.put_var_int(&VarInt(0));
        Ok(packet)
    }

    /// Builds the chunk's save data, or `None` when it has no sections worth keeping.
    pub fn to_nbt(
        &self,
        strategy: &VersionStrategy,
        registry: &dyn BlockStateRegistry,
    ) -> Result<Option<Nbt>, ChunkSerializingError> {
        if !self.has_sections() {
            return Ok(None);
        }

        let mut level = NbtCompound::new();
        level.put_int("xPos", self.position.x);
        level.put_int("zPos", self.position.z);
        level.put_long("InhabitedTime", 0);
        level.put_long("LastUpdate", 0);
        if strategy.legacy_ids() {
            level.put_bool("TerrainPopulated", true);
            level.put_bool("LightPopulated", true);
        } else {
            level.put_string("Status", "full");
        }
        level.put_list("Entities", NbtList::empty(COMPOUND_ID));
        level.put_list("TileEntities", self.tile_entities.to_nbt());
        level.put("Biomes", biome::to_nbt(strategy.biomes, self.biomes.as_deref()));
        if strategy.height_maps {
            level.put_component("Heightmaps", self.height_maps_nbt(strategy));
        }

        let sections = self
            .sections
            .iter()
            .flatten()
            .map(|section| section.to_nbt(strategy, registry))
            .collect::<Result<Vec<_>, _>>()?;
        level.put_list("Sections", NbtList::compounds(sections));

        let mut root = NbtCompound::new();
        root.put_int("DataVersion", strategy.data_version);
        root.put_component("Level", level);
        Ok(Some(Nbt::from(root)))
    }

    /// Loads a column from save data written by [`ChunkColumn::to_nbt`] or the game.
    ///
    /// The result counts as saved.
    pub fn from_nbt(
        nbt: &NbtCompound,
        strategy: &VersionStrategy,
        dimension: Dimension,
        registry: &dyn BlockStateRegistry,
    ) -> Result<Self, ChunkParsingError> {
        let level = nbt
            .get_compound("Level")
            .ok_or_else(|| ChunkParsingError::InvalidSection("missing Level".to_string()))?;
        let (Some(x), Some(z)) = (level.get_int("xPos"), level.get_int("zPos")) else {
            return Err(ChunkParsingError::InvalidSection(
                "missing chunk position".to_string(),
            ));
        };

        let mut column = Self::new(Vector2::new(x, z), dimension);
        if let Some(sections) = level.get_list("Sections") {
            for tag in sections {
                let Some(tag) = tag.extract_compound() else {
                    continue;
                };
                // Lighting-only sections above and below the world have no blocks.
                match tag.get_byte("Y") {
                    Some(y) if (0..SECTION_COUNT as i8).contains(&y) => {}
                    _ => continue,
                }
                if !tag.contains_key("Blocks") && !tag.contains_key("BlockStates") {
                    continue;
                }
                let section = ChunkSection::from_nbt(tag, strategy, registry)?;
                let y = section.y() as usize;
                column.sections[y] = Some(Box::new(section));
            }
        }
        if let Some(height_maps) = level.get_compound("Heightmaps") {
            column.set_height_maps(height_maps.clone(), strategy);
        }
        column.biomes = level.get("Biomes").and_then(biome::from_nbt);
        if let Some(tile_entities) = level.get_list("TileEntities") {
            column.tile_entities = TileEntities::from_nbt(tile_entities);
        }

        column.saved = true;
        Ok(column)
    }

    fn height_maps_nbt(&self, strategy: &VersionStrategy) -> NbtCompound {
        if let Some(height_maps) = &self.height_maps {
            return height_maps.clone();
        }
        let mut compound = NbtCompound::new();
        if let Some(height_map) = &self.height_map {
            let heights: Vec<u32> = height_map.iter().map(|&height| height as u32).collect();
            compound.put(
                MOTION_BLOCKING,
                NbtTag::LongArray(strategy.layout.pack(&heights, HEIGHT_MAP_BITS)),
            );
        }
        compound
    }

    fn set_height_maps(&mut self, height_maps: NbtCompound, strategy: &VersionStrategy) {
        if let Some(words) = height_maps.get_long_array(MOTION_BLOCKING) {
            let heights = strategy
                .layout
                .unpack(words, HEIGHT_MAP_BITS, CHUNK_AREA)
                .into_iter()
                .map(|height| height as i32)
                .collect();
            self.height_map = Some(heights);
        }
        self.height_maps = Some(height_maps);
    }

    /// Replaces the height map. Previously received height map data is discarded.
    pub fn set_height_map(&mut self, height_map: Box<[i32]>) {
        debug_assert_eq!(height_map.len(), CHUNK_AREA);
        self.height_map = Some(height_map);
        self.height_maps = None;
    }

    pub fn has_height_maps(&self) -> bool {
        self.height_map.is_some()
    }

    pub fn height_at(&self, x: usize, z: usize) -> Option<i32> {
        self.height_map
            .as_ref()
            .and_then(|height_map| height_map.get(z << 4 | x).copied())
    }

    pub fn biomes(&self) -> Option<&[i32]> {
        self.biomes.as_deref()
    }

    pub fn section(&self, y: usize) -> Option<&ChunkSection> {
        self.sections.get(y)?.as_deref()
    }

    pub fn sections(&self) -> impl Iterator<Item = &ChunkSection> {
        self.sections.iter().flatten().map(|section| &**section)
    }

    pub fn has_sections(&self) -> bool {
        self.sections.iter().any(Option::is_some)
    }

    /// One bit per occupied section slot, lowest bit for the bottom section.
    pub fn section_mask(&self) -> u16 {
        self.sections
            .iter()
            .enumerate()
            .filter(|(_, section)| section.is_some())
            .fold(0, |mask, (y, _)| mask | 1 << y)
    }

    pub fn tile_entities(&self) -> &TileEntities {
        &self.tile_entities
    }

    /// The global id at a position inside the column, 0 where no section is stored.
    pub fn numeric_block_state_at(
        &self,
        x: usize,
        y: usize,
        z: usize,
    ) -> Result<u32, ChunkParsingError> {
        match self.section(y / SECTION_WIDTH) {
            Some(section) => section.block_state_at(x, y % SECTION_WIDTH, z),
            None => Ok(0),
        }
    }

    /// The block state at a position, `None` for air.
    pub fn block_state_at<'a>(
        &self,
        x: usize,
        y: usize,
        z: usize,
        registry: &'a dyn BlockStateRegistry,
    ) -> Result<Option<&'a BlockState>, ChunkParsingError> {
        let id = self.numeric_block_state_at(x, y, z)?;
        if registry.is_air(id) {
            return Ok(None);
        }
        Ok(registry.state(id))
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub fn set_saved(&mut self, saved: bool) {
        self.saved = saved;
    }

    /// Flags the column as changed since it was last persisted.
    pub fn touch(&mut self) {
        self.saved = false;
    }

    /// Marks a column that arrived in parts, as some non-vanilla servers send them.
    pub fn mark_as_new(&mut self, enabled: bool) {
        if enabled {
            self.is_new = true;
        }
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Runs `callback` now if the column is saved, otherwise after the next parse.
    ///
    /// Only one after-parse callback is kept; registering another replaces it.
    pub fn when_parsed(
        &mut self,
        callback: impl FnOnce(&ChunkColumn) + Send + Sync + 'static,
    ) -> Option<CallbackHandle> {
        if self.saved {
            callback(self);
            None
        } else {
            Some(self.callbacks.set_after_parse(Box::new(callback)))
        }
    }

    /// Registers the callback [`ChunkColumn::unload`] runs, replacing an earlier one.
    pub fn on_unload(
        &mut self,
        callback: impl FnOnce(&ChunkColumn) + Send + Sync + 'static,
    ) -> CallbackHandle {
        self.callbacks.set_on_unload(Box::new(callback))
    }

    /// Drops a pending callback. Returns whether it was still registered.
    pub fn cancel(&mut self, handle: CallbackHandle) -> bool {
        self.callbacks.cancel(handle)
    }

    pub fn unload(&mut self) {
        if let Some(callback) = self.callbacks.take_on_unload() {
            callback(self);
        }
    }
}

#[cfg(test)]
mod test;

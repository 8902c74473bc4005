use std::ops::RangeInclusive;

use wdl_protocol::codec::packed_array::PackedLayout;

use super::ChunkParsingError;

/// How a full chunk carries its biomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiomeFormat {
    /// 256 bytes appended to the section blob.
    FlatBytes,
    /// 256 ints appended to the section blob.
    FlatInts,
    /// 1024 ints (4x4x4 cells) ahead of the section blob.
    CubeInts,
    /// A VarInt count followed by VarInt biome ids ahead of the section blob.
    CubeVarInts,
}

impl BiomeFormat {
    pub const fn is_3d(self) -> bool {
        matches!(self, Self::CubeInts | Self::CubeVarInts)
    }

    pub const fn entries(self) -> usize {
        if self.is_3d() { 1024 } else { 256 }
    }
}

/// Everything that differs between protocol releases when reading or writing a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionStrategy {
    pub protocols: RangeInclusive<i32>,
    pub release: &'static str,
    /// `DataVersion` written into saved chunks.
    pub data_version: i32,
    pub height_maps: bool,
    /// Sections start with a non-air block count.
    pub block_count: bool,
    /// Block and sky light travel inside each section.
    pub section_light: bool,
    /// A direct palette still writes a zero entry count.
    pub direct_palette_length: bool,
    /// A boolean after the full-chunk flag telling the client to drop old data.
    pub ignore_old_data: bool,
    pub biomes: BiomeFormat,
    pub layout: PackedLayout,
    /// Bits per entry of the global palette.
    pub direct_bits: u8,
    pub chunk_data_id: i32,
    pub unload_chunk_id: i32,
}

/// Indirect palettes never use fewer bits than this.
pub const MIN_INDIRECT_BITS: u8 = 4;
/// Palettes wider than this switch to direct global ids.
pub const MAX_INDIRECT_BITS: u8 = 8;

static STRATEGIES: [VersionStrategy; 6] = [
    VersionStrategy {
        protocols: 335..=340,
        release: "1.12",
        data_version: 1343,
        height_maps: false,
        block_count: false,
        section_light: true,
        direct_palette_length: true,
        ignore_old_data: false,
        biomes: BiomeFormat::FlatBytes,
        layout: PackedLayout::Spanning,
        direct_bits: 13,
        chunk_data_id: 0x20,
        unload_chunk_id: 0x1D,
    },
    VersionStrategy {
        protocols: 393..=404,
        release: "1.13",
        data_version: 1631,
        height_maps: false,
        block_count: false,
        section_light: true,
        direct_palette_length: false,
        ignore_old_data: false,
        biomes: BiomeFormat::FlatInts,
        layout: PackedLayout::Spanning,
        direct_bits: 14,
        chunk_data_id: 0x22,
        unload_chunk_id: 0x1F,
    },
    VersionStrategy {
        protocols: 477..=498,
        release: "1.14",
        data_version: 1976,
        height_maps: true,
        block_count: true,
        section_light: false,
        direct_palette_length: false,
        ignore_old_data: false,
        biomes: BiomeFormat::FlatInts,
        layout: PackedLayout::Spanning,
        direct_bits: 14,
        chunk_data_id: 0x21,
        unload_chunk_id: 0x1D,
    },
    VersionStrategy {
        protocols: 573..=578,
        release: "1.15",
        data_version: 2230,
        height_maps: true,
        block_count: true,
        section_light: false,
        direct_palette_length: false,
        ignore_old_data: false,
        biomes: BiomeFormat::CubeInts,
        layout: PackedLayout::Spanning,
        direct_bits: 14,
        chunk_data_id: 0x22,
        unload_chunk_id: 0x1E,
    },
    VersionStrategy {
        protocols: 735..=736,
        release: "1.16",
        data_version: 2567,
        height_maps: true,
        block_count: true,
        section_light: false,
        direct_palette_length: false,
        ignore_old_data: true,
        biomes: BiomeFormat::CubeInts,
        layout: PackedLayout::Aligned,
        direct_bits: 15,
        chunk_data_id: 0x21,
        unload_chunk_id: 0x1D,
    },
    VersionStrategy {
        protocols: 751..=754,
        release: "1.16.2",
        data_version: 2586,
        height_maps: true,
        block_count: true,
        section_light: false,
        direct_palette_length: false,
        ignore_old_data: false,
        biomes: BiomeFormat::CubeVarInts,
        layout: PackedLayout::Aligned,
        direct_bits: 15,
        chunk_data_id: 0x20,
        unload_chunk_id: 0x1C,
    },
];

impl VersionStrategy {
    pub fn for_protocol(protocol: i32) -> Result<&'static VersionStrategy, ChunkParsingError> {
        STRATEGIES
            .iter()
            .find(|strategy| strategy.protocols.contains(&protocol))
            .ok_or(ChunkParsingError::UnsupportedVersion(protocol))
    }

    pub fn all() -> &'static [VersionStrategy] {
        &STRATEGIES
    }

    /// Block states are stored as `id << 4 | meta` and sections persist as
    /// `Blocks`/`Data` nibble arrays instead of a named palette.
    pub const fn legacy_ids(&self) -> bool {
        self.data_version < 1451
    }
}

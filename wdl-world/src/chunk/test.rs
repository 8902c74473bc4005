use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use bytes::{BufMut, BytesMut};
use wdl_nbt::{Nbt, NbtList, NbtTag, compound::NbtCompound};
use wdl_protocol::{ByteBufMut, ByteCursor, ReadingError, VarInt};
use wdl_util::{Dimension, math::vector2::Vector2};

use crate::{
    block::{BlockState, GlobalPalette},
    chunk::{
        CHUNK_AREA, ChunkColumn, ChunkDataHeader, ChunkParsingError, SECTION_COUNT, biome,
        palette::Palette,
        section::{ChunkSection, SECTION_VOLUME},
        version::VersionStrategy,
    },
};

fn strategy(protocol: i32) -> &'static VersionStrategy {
    VersionStrategy::for_protocol(protocol).unwrap()
}

/// A section alternating between two ids.
fn section(y: u8, a: u32, b: u32, strategy: &VersionStrategy) -> ChunkSection {
    let states: Vec<u32> = (0..SECTION_VOLUME)
        .map(|index| if index % 2 == 0 { a } else { b })
        .collect();
    ChunkSection::from_states(y, &states, strategy)
}

fn heights() -> Vec<u32> {
    (0..CHUNK_AREA as u32).map(|index| 60 + index % 16).collect()
}

fn height_maps(strategy: &VersionStrategy) -> NbtCompound {
    let mut compound = NbtCompound::new();
    compound.put(
        "MOTION_BLOCKING",
        NbtTag::LongArray(strategy.layout.pack(&heights(), 9)),
    );
    compound
}

fn chest(x: i32, y: i32, z: i32) -> NbtCompound {
    let mut tag = NbtCompound::new();
    tag.put_string("id", "minecraft:chest");
    tag.put_int("x", x);
    tag.put_int("y", y);
    tag.put_int("z", z);
    tag
}

/// Builds the chunk data payload that follows the packet header.
fn payload(
    strategy: &VersionStrategy,
    dimension: Dimension,
    full: bool,
    mask: i32,
    sections: &[ChunkSection],
    tile_entities: &[NbtCompound],
) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_var_int(&VarInt(mask));
    if strategy.height_maps {
        buf.put_nbt(&Nbt::from(height_maps(strategy))).unwrap();
    }
    if full && strategy.biomes.is_3d() {
        biome::write(&mut buf, strategy.biomes, None).unwrap();
    }

    let mut column = BytesMut::new();
    for section in sections {
        section.encode(&mut column, strategy, dimension).unwrap();
    }
    if full && !strategy.biomes.is_3d() {
        biome::write(&mut column, strategy.biomes, None).unwrap();
    }
    buf.put_length(column.len()).unwrap();
    buf.put_slice(&column);

    buf.put_length(tile_entities.len()).unwrap();
    for tag in tile_entities {
        buf.put_nbt(&Nbt::from(tag.clone())).unwrap();
    }
    buf
}

fn registry() -> GlobalPalette {
    [
        (0, BlockState::new("minecraft:air")),
        (1, BlockState::new("minecraft:stone")),
        (2, BlockState::new("minecraft:granite")),
        (3, BlockState::new("minecraft:dirt")),
        (4, BlockState::new("minecraft:oak_log").with_property("axis", "y")),
    ]
    .into_iter()
    .collect()
}

fn counter() -> (Arc<AtomicUsize>, impl FnOnce(&ChunkColumn) + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = count.clone();
    (count, move |_: &ChunkColumn| {
        inner.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_two_sections_round_trip() {
    let s = strategy(578);
    let dimension = Dimension::Overworld;
    let sections = [section(0, 1, 2, s), section(1, 3, 4, s)];
    let bytes = payload(s, dimension, true, 0b11, &sections, &[chest(5, 20, 7)]);

    let mut column = ChunkColumn::new(Vector2::new(4, -2), dimension);
    let mut cursor = ByteCursor::new(&bytes);
    column.parse(&mut cursor, true, s, dimension).unwrap();
    assert!(cursor.is_empty());

    assert_eq!(column.section(0), Some(&sections[0]));
    assert_eq!(column.section(1), Some(&sections[1]));
    for y in 2..SECTION_COUNT {
        assert!(column.section(y).is_none());
    }
    assert_eq!(column.section_mask(), 0b11);
    assert_eq!(column.tile_entities().len(), 1);
    assert_eq!(column.biomes().map(<[i32]>::len), Some(1024));
    assert!(!column.is_saved());

    let packet = column.to_packet(s, dimension).unwrap();
    let mut cursor = ByteCursor::new(&packet);
    assert_eq!(cursor.get_var_int().unwrap(), VarInt(s.chunk_data_id));
    let header = ChunkDataHeader::read(&mut cursor, s).unwrap();
    assert_eq!(header.position, Vector2::new(4, -2));
    assert!(header.full);
    assert_eq!(cursor.clone().get_var_int().unwrap(), VarInt(0b11));

    let mut copy = ChunkColumn::new(header.position, dimension);
    copy.parse(&mut cursor, header.full, s, dimension).unwrap();
    assert!(cursor.is_empty());
    assert_eq!(copy.section(0), column.section(0));
    assert_eq!(copy.section(1), column.section(1));
    assert_eq!(copy.biomes(), column.biomes());
    // tile entities are never replayed
    assert!(copy.tile_entities().is_empty());
}

#[test]
fn test_every_version_round_trips() {
    for s in VersionStrategy::all() {
        let dimension = Dimension::Overworld;
        let sections = [section(3, 1, 2, s), section(15, 0, 4, s)];
        let bytes = payload(s, dimension, true, 1 << 3 | 1 << 15, &sections, &[]);

        let mut column = ChunkColumn::new(Vector2::new(0, 0), dimension);
        column
            .parse(&mut ByteCursor::new(&bytes), true, s, dimension)
            .unwrap();
        assert_eq!(column.section_mask(), 1 << 3 | 1 << 15, "{}", s.release);

        let packet = column.to_packet(s, dimension).unwrap();
        let mut cursor = ByteCursor::new(&packet);
        cursor.get_var_int().unwrap();
        let header = ChunkDataHeader::read(&mut cursor, s).unwrap();
        let mut copy = ChunkColumn::new(header.position, dimension);
        copy.parse(&mut cursor, header.full, s, dimension).unwrap();

        assert!(cursor.is_empty(), "{}", s.release);
        assert_eq!(copy.section(3), column.section(3), "{}", s.release);
        assert_eq!(copy.section(15), column.section(15), "{}", s.release);
    }
}

#[test]
fn test_direct_palette_column_round_trips() {
    let states: Vec<u32> = (0..SECTION_VOLUME)
        .map(|index| (index % 300) as u32 * 16 + 1)
        .collect();
    for s in VersionStrategy::all() {
        let dimension = Dimension::Overworld;
        let direct = ChunkSection::from_states(2, &states, s);
        let sections = [section(0, 1, 2, s), direct];
        let bytes = payload(s, dimension, true, 0b101, &sections, &[]);

        let mut column = ChunkColumn::new(Vector2::new(-7, 3), dimension);
        let mut cursor = ByteCursor::new(&bytes);
        column.parse(&mut cursor, true, s, dimension).unwrap();
        assert!(cursor.is_empty(), "{}", s.release);
        assert_eq!(column.section_mask(), 0b101, "{}", s.release);

        let read = column.section(2).unwrap();
        assert_eq!(
            read.palette(),
            &Palette::Direct {
                bits: s.direct_bits
            },
            "{}",
            s.release
        );
        assert_eq!(read.states().unwrap(), states, "{}", s.release);
        assert_eq!(
            // index 299 of section 2
            column.numeric_block_state_at(11, 33, 2).unwrap(),
            299 * 16 + 1,
            "{}",
            s.release
        );

        let packet = column.to_packet(s, dimension).unwrap();
        let mut cursor = ByteCursor::new(&packet);
        cursor.get_var_int().unwrap();
        let header = ChunkDataHeader::read(&mut cursor, s).unwrap();
        let mut copy = ChunkColumn::new(header.position, dimension);
        copy.parse(&mut cursor, header.full, s, dimension).unwrap();

        assert!(cursor.is_empty(), "{}", s.release);
        assert_eq!(copy.section(0), column.section(0), "{}", s.release);
        assert_eq!(copy.section(2), column.section(2), "{}", s.release);
    }
}

#[test]
fn test_end_list_in_tile_entity_is_rejected() {
    let s = strategy(578);
    let dimension = Dimension::Overworld;
    let mut tile_entity = chest(0, 0, 0);
    tile_entity.put(
        "L",
        NbtTag::List(NbtList::from_tags(vec![NbtTag::End; 4]).unwrap()),
    );
    let bytes = payload(s, dimension, true, 0, &[], &[tile_entity]);

    let mut column = ChunkColumn::new(Vector2::new(0, 0), dimension);
    let result = column.parse(&mut ByteCursor::new(&bytes), true, s, dimension);
    assert!(result.is_err());
    assert!(column.tile_entities().is_empty());
    assert!(column.biomes().is_none());
    assert!(!column.has_height_maps());
}

#[test]
fn test_mask_stops_at_highest_bit() {
    let s = strategy(340);
    let dimension = Dimension::Overworld;
    let sections = [section(0, 1, 2, s), section(2, 3, 4, s)];
    // the blob holds exactly two sections, so any further read would underrun
    let bytes = payload(s, dimension, false, 0b101, &sections, &[]);

    let mut column = ChunkColumn::new(Vector2::new(0, 0), dimension);
    let mut cursor = ByteCursor::new(&bytes);
    column.parse(&mut cursor, false, s, dimension).unwrap();

    assert!(cursor.is_empty());
    assert_eq!(column.section_mask(), 0b101);
    assert_eq!(column.section(2).map(ChunkSection::y), Some(2));
    assert!(column.biomes().is_none());
}

#[test]
fn test_partial_update_keeps_other_sections() {
    let s = strategy(404);
    let dimension = Dimension::Overworld;
    let mut column = ChunkColumn::new(Vector2::new(0, 0), dimension);

    let first = payload(s, dimension, true, 0b11, &[section(0, 1, 2, s), section(1, 1, 2, s)], &[]);
    column
        .parse(&mut ByteCursor::new(&first), true, s, dimension)
        .unwrap();

    let update = payload(s, dimension, false, 0b10, &[section(1, 3, 4, s)], &[]);
    column
        .parse(&mut ByteCursor::new(&update), false, s, dimension)
        .unwrap();

    assert_eq!(column.numeric_block_state_at(0, 0, 0).unwrap(), 1);
    assert_eq!(column.numeric_block_state_at(0, 16, 0).unwrap(), 3);
    assert_eq!(column.numeric_block_state_at(1, 16, 0).unwrap(), 4);
}

#[test]
fn test_air_sections_are_dropped() {
    let s = strategy(498);
    let dimension = Dimension::Overworld;
    let air = ChunkSection::from_states(0, &vec![0; SECTION_VOLUME], s);
    let bytes = payload(s, dimension, true, 0b11, &[air, section(1, 1, 0, s)], &[]);

    let mut column = ChunkColumn::new(Vector2::new(0, 0), dimension);
    column
        .parse(&mut ByteCursor::new(&bytes), true, s, dimension)
        .unwrap();

    assert!(column.section(0).is_none());
    assert_eq!(column.section_mask(), 0b10);

    let nbt = column.to_nbt(s, &registry()).unwrap().unwrap();
    let level = nbt.get_compound("Level").unwrap();
    assert_eq!(level.get_list("Sections").unwrap().len(), 1);
}

#[test]
fn test_empty_column_is_not_persisted() {
    let s = strategy(578);
    let column = ChunkColumn::new(Vector2::new(1, 1), Dimension::Overworld);
    assert!(column.to_nbt(s, &registry()).unwrap().is_none());
}

#[test]
fn test_nether_has_no_sky_light() {
    let s = strategy(340);
    let sections = [section(0, 1, 2, s)];
    let bytes = payload(s, Dimension::Nether, false, 0b1, &sections, &[]);

    let mut column = ChunkColumn::new(Vector2::new(0, 0), Dimension::Nether);
    let mut cursor = ByteCursor::new(&bytes);
    column.parse(&mut cursor, false, s, Dimension::Nether).unwrap();
    assert!(cursor.is_empty());

    let section = column.section(0).unwrap();
    assert!(section.block_light().is_some());
    assert!(section.sky_light().is_none());

    let nether = column.to_packet(s, Dimension::Nether).unwrap();
    let overworld = column.to_packet(s, Dimension::Overworld).unwrap();
    assert_eq!(overworld.len() - nether.len(), 2048);
}

#[test]
fn test_failed_parse_changes_nothing() {
    let s = strategy(578);
    let dimension = Dimension::Overworld;
    let bytes = payload(s, dimension, true, 0b1, &[section(0, 1, 2, s)], &[]);

    let mut column = ChunkColumn::new(Vector2::new(0, 0), dimension);
    column.set_saved(true);
    let (count, callback) = counter();
    assert!(column.when_parsed(callback).is_none());
    assert_eq!(count.load(Ordering::SeqCst), 1);
    let (count, callback) = counter();
    column.set_saved(false);
    column.when_parsed(callback);

    // missing tile entity count
    let result = column.parse(
        &mut ByteCursor::new(&bytes[..bytes.len() - 1]),
        true,
        s,
        dimension,
    );
    assert!(matches!(
        result,
        Err(ChunkParsingError::Reading(ReadingError::BufferUnderrun { .. }))
    ));

    // cut inside the section blob
    let result = column.parse(
        &mut ByteCursor::new(&bytes[..bytes.len() - 100]),
        true,
        s,
        dimension,
    );
    assert!(matches!(
        result,
        Err(ChunkParsingError::Reading(ReadingError::LengthMismatch { .. }))
    ));

    assert!(!column.has_sections());
    assert!(!column.has_height_maps());
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn test_after_parse_runs_once() {
    let s = strategy(754);
    let dimension = Dimension::End;
    let bytes = payload(s, dimension, true, 0b1, &[section(0, 1, 2, s)], &[]);
    let mut column = ChunkColumn::new(Vector2::new(0, 0), dimension);

    let (count, callback) = counter();
    assert!(column.when_parsed(callback).is_some());
    column
        .parse(&mut ByteCursor::new(&bytes), true, s, dimension)
        .unwrap();
    column
        .parse(&mut ByteCursor::new(&bytes), true, s, dimension)
        .unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);

    let (count, callback) = counter();
    let handle = column.when_parsed(callback).unwrap();
    assert!(column.cancel(handle));
    assert!(!column.cancel(handle));
    column
        .parse(&mut ByteCursor::new(&bytes), true, s, dimension)
        .unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn test_unload_runs_once() {
    let mut column = ChunkColumn::new(Vector2::new(0, 0), Dimension::Overworld);
    let (count, callback) = counter();
    column.on_unload(callback);

    column.unload();
    column.unload();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_bad_palette_index() {
    let s = strategy(578);
    let mut bytes = BytesMut::new();
    bytes.put_var_int(&VarInt(0b1));
    bytes.put_nbt(&Nbt::from(NbtCompound::new())).unwrap();

    let mut section = BytesMut::new();
    section.put_i16(4096);
    section.put_u8(4);
    // a single palette entry, but every block points at index 3
    section.put_var_int(&VarInt(1));
    section.put_var_int(&VarInt(1));
    section.put_var_int(&VarInt(256));
    for _ in 0..256 {
        section.put_i64(0x3333_3333_3333_3333);
    }
    bytes.put_length(section.len()).unwrap();
    bytes.put_slice(&section);
    bytes.put_var_int(&VarInt(0));

    let mut column = ChunkColumn::new(Vector2::new(0, 0), Dimension::Overworld);
    column
        .parse(&mut ByteCursor::new(&bytes), false, s, Dimension::Overworld)
        .unwrap();
    assert!(matches!(
        column.numeric_block_state_at(0, 0, 0),
        Err(ChunkParsingError::PaletteIndexOutOfRange { index: 3, len: 1 })
    ));
}

#[test]
fn test_block_lookup() {
    let s = strategy(578);
    let registry = registry();
    let bytes = payload(s, Dimension::Overworld, true, 0b10, &[section(1, 0, 4, s)], &[]);
    let mut column = ChunkColumn::new(Vector2::new(0, 0), Dimension::Overworld);
    column
        .parse(&mut ByteCursor::new(&bytes), true, s, Dimension::Overworld)
        .unwrap();

    assert_eq!(column.numeric_block_state_at(1, 3, 1).unwrap(), 0);
    assert_eq!(column.numeric_block_state_at(1, 16, 0).unwrap(), 4);
    assert_eq!(column.block_state_at(0, 16, 0, &registry).unwrap(), None);
    assert_eq!(
        column.block_state_at(1, 16, 0, &registry).unwrap(),
        Some(&BlockState::new("minecraft:oak_log").with_property("axis", "y"))
    );

    assert!(column.has_height_maps());
    assert_eq!(column.height_at(3, 0), Some(63));
    assert_eq!(column.height_at(15, 15), Some(75));
}

#[test]
fn test_nbt_round_trip() {
    let s = strategy(578);
    let registry = registry();
    let bytes = payload(
        s,
        Dimension::Overworld,
        true,
        0b101,
        &[section(0, 1, 2, s), section(2, 3, 4, s)],
        &[chest(1, 33, 2)],
    );
    let mut column = ChunkColumn::new(Vector2::new(-3, 7), Dimension::Overworld);
    column
        .parse(&mut ByteCursor::new(&bytes), true, s, Dimension::Overworld)
        .unwrap();

    let nbt = column.to_nbt(s, &registry).unwrap().unwrap();
    assert_eq!(nbt.get_int("DataVersion"), Some(2230));
    let level = nbt.get_compound("Level").unwrap();
    assert_eq!(level.get_int("xPos"), Some(-3));
    assert_eq!(level.get_int("zPos"), Some(7));
    assert_eq!(level.get_long("InhabitedTime"), Some(0));
    assert_eq!(level.get_string("Status").map(String::as_str), Some("full"));
    assert!(level.get_list("Entities").unwrap().is_empty());
    assert_eq!(level.get_int_array("Biomes").map(<[i32]>::len), Some(1024));
    assert!(level.get_compound("Heightmaps").is_some());

    let sections = level.get_list("Sections").unwrap();
    let ys: Vec<i8> = sections
        .iter()
        .filter_map(|tag| tag.extract_compound()?.get_byte("Y"))
        .collect();
    assert_eq!(ys, vec![0, 2]);

    let loaded = ChunkColumn::from_nbt(&nbt, s, Dimension::Overworld, &registry).unwrap();
    assert!(loaded.is_saved());
    assert_eq!(loaded.position(), Vector2::new(-3, 7));
    assert_eq!(loaded.section(0), column.section(0));
    assert_eq!(loaded.section(2), column.section(2));
    assert_eq!(loaded.biomes(), column.biomes());
    assert_eq!(loaded.height_at(5, 5), column.height_at(5, 5));
    assert_eq!(loaded.tile_entities(), column.tile_entities());
}

#[test]
fn test_legacy_nbt_fields() {
    let s = strategy(340);
    let bytes = payload(s, Dimension::Overworld, true, 0b1, &[section(0, 16, 33, s)], &[]);
    let mut column = ChunkColumn::new(Vector2::new(0, 0), Dimension::Overworld);
    column
        .parse(&mut ByteCursor::new(&bytes), true, s, Dimension::Overworld)
        .unwrap();

    let nbt = column.to_nbt(s, &GlobalPalette::new()).unwrap().unwrap();
    let level = nbt.get_compound("Level").unwrap();
    assert_eq!(level.get_bool("TerrainPopulated"), Some(true));
    assert!(!level.contains_key("Status"));
    assert!(!level.contains_key("Heightmaps"));
    assert_eq!(level.get_byte_array("Biomes").map(<[u8]>::len), Some(256));

    let loaded =
        ChunkColumn::from_nbt(&nbt, s, Dimension::Overworld, &GlobalPalette::new()).unwrap();
    assert_eq!(loaded.section(0), column.section(0));
}

#[test]
fn test_mark_as_new_and_touch() {
    let mut column = ChunkColumn::new(Vector2::new(0, 0), Dimension::Overworld);
    column.mark_as_new(false);
    assert!(!column.is_new());
    column.mark_as_new(true);
    assert!(column.is_new());

    column.set_saved(true);
    column.touch();
    assert!(!column.is_saved());
}

use std::sync::Arc;

use thiserror::Error;
use wdl_protocol::{ByteCursor, ReadingError};
use wdl_util::math::vector2::Vector2;
use wdl_world::{
    ChunkColumn, ChunkParsingError, VersionStrategy, World, chunk::ChunkDataHeader,
};

use crate::world::ChunkSaver;

use super::RawPacket;

#[derive(Error, Debug)]
pub enum HandleError {
    #[error("bad chunk data at {position}: {source}")]
    ChunkData {
        position: Vector2<i32>,
        source: ChunkParsingError,
    },
    #[error(transparent)]
    Parsing(#[from] ChunkParsingError),
    #[error(transparent)]
    Reading(#[from] ReadingError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HandlerStats {
    pub chunks_parsed: usize,
    pub chunks_failed: usize,
    pub chunks_unloaded: usize,
    pub chunks_saved: usize,
    pub save_failures: usize,
    pub packets_ignored: usize,
}

/// Routes chunk packets of one dimension into its [`World`].
pub struct PacketHandler {
    world: Arc<World>,
    strategy: &'static VersionStrategy,
    saver: ChunkSaver,
    mark_new_chunks: bool,
    stats: HandlerStats,
}

impl PacketHandler {
    pub fn new(
        world: Arc<World>,
        strategy: &'static VersionStrategy,
        saver: ChunkSaver,
        mark_new_chunks: bool,
    ) -> Self {
        Self {
            world,
            strategy,
            saver,
            mark_new_chunks,
            stats: HandlerStats::default(),
        }
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    pub fn stats(&self) -> HandlerStats {
        self.stats
    }

    /// Handles one packet. Malformed chunks are logged and skipped.
    pub fn handle(&mut self, packet: &RawPacket) {
        if packet.id == self.strategy.chunk_data_id {
            match self.handle_chunk_data(&packet.payload) {
                Ok(()) => self.stats.chunks_parsed += 1,
                Err(err) => {
                    log::warn!("Skipping chunk: {err}");
                    self.stats.chunks_failed += 1;
                }
            }
        } else if packet.id == self.strategy.unload_chunk_id {
            match self.handle_unload(&packet.payload) {
                Ok(true) => self.stats.chunks_unloaded += 1,
                Ok(false) => {}
                Err(err) => log::warn!("Bad unload packet: {err}"),
            }
        } else {
            log::debug!("Ignoring packet {:#04x}", packet.id);
            self.stats.packets_ignored += 1;
        }
    }

    fn handle_chunk_data(&self, payload: &[u8]) -> Result<(), HandleError> {
        let mut cursor = ByteCursor::new(payload);
        let header = ChunkDataHeader::read(&mut cursor, self.strategy)?;
        let dimension = self.world.dimension();
        let wrap = |source| HandleError::ChunkData {
            position: header.position,
            source,
        };

        if header.full {
            // A full column replaces whatever was loaded, but only once it decoded.
            let mut column = ChunkColumn::new(header.position, dimension);
            column
                .parse(&mut cursor, true, self.strategy, dimension)
                .map_err(wrap)?;
            self.saver.attach(&mut column);
            self.world.replace(column);
        } else {
            let (chunk, created) = self.world.get_or_create(header.position, |column| {
                column.mark_as_new(self.mark_new_chunks);
                self.saver.attach(column);
            });
            if created {
                log::debug!("Chunk {} arrived in parts", header.position);
            }
            chunk
                .write()
                .parse(&mut cursor, false, self.strategy, dimension)
                .map_err(wrap)?;
        }
        Ok(())
    }

    fn handle_unload(&self, payload: &[u8]) -> Result<bool, HandleError> {
        let mut cursor = ByteCursor::new(payload);
        let position = Vector2::new(cursor.get_i32_be()?, cursor.get_i32_be()?);
        Ok(self.world.unload(&position).is_some())
    }

    /// Queues every column that changed since it was last written, returning how many were
    /// queued. Columns that cannot be saved are logged and left unsaved.
    ///
    /// A column counts as saved once its file is queued. The save worker clears the flag
    /// again if the write fails.
    pub fn save_all(&mut self) -> usize {
        let mut saved = 0;
        for (position, chunk) in self.world.chunks() {
            let mut column = chunk.write();
            if column.is_saved() {
                continue;
            }
            match self.saver.save_loaded(&chunk, &column) {
                Ok(queued) => {
                    if queued {
                        saved += 1;
                    }
                    column.set_saved(true);
                }
                Err(err) => {
                    log::error!("Failed to save chunk {position}: {err}");
                    self.stats.save_failures += 1;
                }
            }
        }
        self.stats.chunks_saved += saved;
        saved
    }
}

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use wdl_util::{Dimension, math::vector2::Vector2};

use crate::chunk::ChunkColumn;

pub type SyncChunk = Arc<RwLock<ChunkColumn>>;

/// The loaded columns of one dimension, keyed by chunk position.
///
/// Each column sits behind its own lock, so different columns can be parsed in parallel.
#[derive(Debug)]
pub struct World {
    dimension: Dimension,
    loaded_chunks: DashMap<Vector2<i32>, SyncChunk>,
}

impl World {
    pub fn new(dimension: Dimension) -> Self {
        Self {
            dimension,
            loaded_chunks: DashMap::new(),
        }
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn get_chunk(&self, position: &Vector2<i32>) -> Option<SyncChunk> {
        self.loaded_chunks
            .get(position)
            .map(|entry| entry.value().clone())
    }

    /// Returns the column at `position`, creating an empty one if none is loaded.
    ///
    /// `init` runs on a newly created column before anyone else can see it.
    pub fn get_or_create(
        &self,
        position: Vector2<i32>,
        init: impl FnOnce(&mut ChunkColumn),
    ) -> (SyncChunk, bool) {
        let mut created = false;
        let chunk = self
            .loaded_chunks
            .entry(position)
            .or_insert_with(|| {
                created = true;
                let mut column = ChunkColumn::new(position, self.dimension);
                init(&mut column);
                Arc::new(RwLock::new(column))
            })
            .value()
            .clone();
        (chunk, created)
    }

    /// Stores a fresh column at `position`, returning the one it replaced.
    pub fn replace(&self, column: ChunkColumn) -> (SyncChunk, Option<SyncChunk>) {
        let chunk = Arc::new(RwLock::new(column));
        let position = chunk.read().position();
        let previous = self.loaded_chunks.insert(position, chunk.clone());
        (chunk, previous)
    }

    /// Evicts the column and runs its unload callback.
    pub fn unload(&self, position: &Vector2<i32>) -> Option<SyncChunk> {
        let (_, chunk) = self.loaded_chunks.remove(position)?;
        chunk.write().unload();
        Some(chunk)
    }

    pub fn loaded_chunk_count(&self) -> usize {
        self.loaded_chunks.len()
    }

    /// A snapshot of every loaded column.
    pub fn chunks(&self) -> Vec<(Vector2<i32>, SyncChunk)> {
        self.loaded_chunks
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }
}

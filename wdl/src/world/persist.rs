use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;
use tokio::sync::mpsc;
use wdl_nbt::nbt_compress::write_gzip_nbt_to_bytes;
use wdl_util::{Dimension, math::vector2::Vector2};
use wdl_world::{
    ChunkColumn, ChunkSerializingError, SyncChunk, VersionStrategy, block::BlockStateRegistry,
};

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("failed to build chunk data: {0}")]
    Serializing(#[from] ChunkSerializingError),
    #[error("failed to compress chunk: {0}")]
    Nbt(#[from] wdl_nbt::Error),
    #[error("the save worker has stopped")]
    WorkerGone,
}

/// A finished chunk file waiting to be written.
#[derive(Debug)]
pub struct SaveJob {
    pub path: PathBuf,
    pub data: Vec<u8>,
    /// The loaded column the file was built from. It is marked unsaved again if the write fails.
    pub chunk: Option<SyncChunk>,
}

impl SaveJob {
    fn failed(&self) {
        if let Some(chunk) = &self.chunk {
            chunk.write().set_saved(false);
        }
    }
}

/// Turns columns into gzipped chunk files and hands them to the [`SaveWorker`].
#[derive(Clone)]
pub struct ChunkSaver {
    root: PathBuf,
    strategy: &'static VersionStrategy,
    registry: Arc<dyn BlockStateRegistry>,
    sender: mpsc::UnboundedSender<SaveJob>,
}

impl ChunkSaver {
    pub fn new(
        output_folder: &Path,
        dimension: Dimension,
        strategy: &'static VersionStrategy,
        registry: Arc<dyn BlockStateRegistry>,
    ) -> (Self, SaveWorker) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let saver = Self {
            root: output_folder.join(dimension.folder()),
            strategy,
            registry,
            sender,
        };
        (saver, SaveWorker { receiver })
    }

    pub fn chunk_path(&self, position: Vector2<i32>) -> PathBuf {
        self.root.join(format!("c.{}.{}.dat", position.x, position.z))
    }

    /// Queues `column` for writing. Returns `false` when there was nothing to save.
    pub fn save(&self, column: &ChunkColumn) -> Result<bool, PersistError> {
        self.queue(column, None)
    }

    /// Like [`ChunkSaver::save`] for a column that stays loaded, `column` being the
    /// locked content of `chunk`.
    pub fn save_loaded(
        &self,
        chunk: &SyncChunk,
        column: &ChunkColumn,
    ) -> Result<bool, PersistError> {
        self.queue(column, Some(chunk.clone()))
    }

    fn queue(&self, column: &ChunkColumn, chunk: Option<SyncChunk>) -> Result<bool, PersistError> {
        let Some(nbt) = column.to_nbt(self.strategy, self.registry.as_ref())? else {
            return Ok(false);
        };
        let data = write_gzip_nbt_to_bytes(&nbt)?;
        self.sender
            .send(SaveJob {
                path: self.chunk_path(column.position()),
                data,
                chunk,
            })
            .map_err(|_| PersistError::WorkerGone)?;
        Ok(true)
    }

    /// Makes `column` save itself when it is unloaded.
    pub fn attach(&self, column: &mut ChunkColumn) {
        let saver = self.clone();
        column.on_unload(move |column| {
            if let Err(err) = saver.save(column) {
                log::error!("Failed to save chunk {}: {err}", column.position());
            }
        });
    }
}

/// Writes queued chunk files until every [`ChunkSaver`] is dropped.
pub struct SaveWorker {
    receiver: mpsc::UnboundedReceiver<SaveJob>,
}

impl SaveWorker {
    /// Returns how many files were written.
    pub async fn run(mut self) -> usize {
        let mut written = 0;
        while let Some(job) = self.receiver.recv().await {
            if let Some(parent) = job.path.parent() {
                if let Err(err) = tokio::fs::create_dir_all(parent).await {
                    log::error!("Failed to create {}: {err}", parent.display());
                    job.failed();
                    continue;
                }
            }
            match tokio::fs::write(&job.path, &job.data).await {
                Ok(()) => {
                    log::debug!("Wrote {}", job.path.display());
                    written += 1;
                }
                Err(err) => {
                    log::error!("Failed to write {}: {err}", job.path.display());
                    job.failed();
                }
            }
        }
        written
    }
}

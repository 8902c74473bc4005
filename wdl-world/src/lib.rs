pub mod block;
pub mod chunk;
pub mod world;

pub use chunk::{ChunkColumn, ChunkParsingError, ChunkSerializingError, version::VersionStrategy};
pub use world::{SyncChunk, World};

pub mod persist;

pub use persist::{ChunkSaver, SaveWorker};

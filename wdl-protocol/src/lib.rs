use thiserror::Error;

pub mod bytebuf;
pub mod codec;

pub use bytebuf::{ByteBufMut, cursor::ByteCursor};
pub use codec::var_int::VarInt;

/// Upper bound for a single framed packet, matching the vanilla client.
pub const MAX_PACKET_SIZE: usize = 2097152;

#[derive(Debug, Error)]
pub enum ReadingError {
    #[error("tried to read {needed} bytes but only {remaining} remain")]
    BufferUnderrun { needed: usize, remaining: usize },
    #[error("declared length {declared} exceeds the {remaining} remaining bytes")]
    LengthMismatch { declared: usize, remaining: usize },
    #[error("VarInt is longer than {} bytes", VarInt::MAX_SIZE)]
    VarIntTooLong,
    #[error("negative length {0}")]
    NegativeLength(i32),
    #[error("invalid nbt: {0}")]
    Nbt(#[from] wdl_nbt::Error),
}

#[derive(Debug, Error)]
pub enum WritingError {
    #[error("failed to write nbt: {0}")]
    Nbt(#[from] wdl_nbt::Error),
    #[error("too large: {0}")]
    TooLarge(String),
}

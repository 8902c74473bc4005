use std::collections::HashMap;

use bytes::BufMut;
use wdl_protocol::{ByteBufMut, ByteCursor, VarInt, WritingError};
use wdl_util::encompassing_bits;

use crate::block::AIR_ID;

use super::{
    ChunkParsingError,
    version::{MAX_INDIRECT_BITS, MIN_INDIRECT_BITS, VersionStrategy},
};

/// Splits `states` into its distinct ids, in order of first appearance, and the index of
/// each entry into them.
pub(crate) fn index_states(states: &[u32]) -> (Vec<u32>, Vec<u32>) {
    let mut distinct = Vec::new();
    let mut index_of = HashMap::new();
    let indices = states
        .iter()
        .map(|&state| {
            *index_of.entry(state).or_insert_with(|| {
                distinct.push(state);
                distinct.len() as u32 - 1
            })
        })
        .collect();
    (distinct, indices)
}

/// Maps the local indices stored in a section to global block-state ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Palette {
    /// Local index is the position in `states`.
    Indirect { bits: u8, states: Box<[u32]> },
    /// Local index is the global id.
    Direct { bits: u8 },
}

impl Palette {
    pub fn read(
        bits_per_entry: u8,
        cursor: &mut ByteCursor<'_>,
        strategy: &VersionStrategy,
    ) -> Result<Self, ChunkParsingError> {
        if bits_per_entry <= MAX_INDIRECT_BITS {
            let len = cursor.get_length()?;
            let states = (0..len)
                .map(|_| cursor.get_var_int().map(|VarInt(id)| id as u32))
                .collect::<Result<Box<[u32]>, _>>()?;
            Ok(Self::Indirect {
                bits: bits_per_entry.max(MIN_INDIRECT_BITS),
                states,
            })
        } else {
            if strategy.direct_palette_length {
                let len = cursor.get_length()?;
                if len != 0 {
                    log::debug!("Ignoring {len} palette entries sent with a direct palette");
                    for _ in 0..len {
                        cursor.get_var_int()?;
                    }
                }
            }
            Ok(Self::Direct {
                bits: strategy.direct_bits,
            })
        }
    }

    /// Builds the smallest palette able to hold `states`, returning it with the local index
    /// of every entry.
    pub fn from_states(states: &[u32], strategy: &VersionStrategy) -> (Self, Vec<u32>) {
        let (distinct, indices) = index_states(states);

        let bits = encompassing_bits(distinct.len()).max(MIN_INDIRECT_BITS);
        if bits <= MAX_INDIRECT_BITS {
            (
                Self::Indirect {
                    bits,
                    states: distinct.into(),
                },
                indices,
            )
        } else {
            (
                Self::Direct {
                    bits: strategy.direct_bits,
                },
                states.to_vec(),
            )
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            Self::Indirect { bits, .. } | Self::Direct { bits } => *bits,
        }
    }

    pub fn resolve(&self, local_index: u32) -> Result<u32, ChunkParsingError> {
        match self {
            Self::Indirect { states, .. } => states.get(local_index as usize).copied().ok_or(
                ChunkParsingError::PaletteIndexOutOfRange {
                    index: local_index,
                    len: states.len(),
                },
            ),
            Self::Direct { .. } => Ok(local_index),
        }
    }

    /// Whether every id this palette can produce is air.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Indirect { states, .. } => states.iter().all(|&state| state == AIR_ID),
            Self::Direct { .. } => false,
        }
    }

    pub fn write(
        &self,
        buf: &mut impl BufMut,
        strategy: &VersionStrategy,
    ) -> Result<(), WritingError> {
        buf.put_u8(self.bits());
        match self {
            Self::Indirect { states, .. } => {
                buf.put_length(states.len())?;
                for &state in states.iter() {
                    buf.put_var_int(&VarInt(state as i32));
                }
            }
            Self::Direct { .. } => {
                if strategy.direct_palette_length {
                    buf.put_var_int(&VarInt(0));
                }
            }
        }
        Ok(())
    }
}

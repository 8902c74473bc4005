use std::collections::HashMap;

use wdl_nbt::{COMPOUND_ID, NbtList, NbtTag, compound::NbtCompound};
use wdl_util::math::vector3::Vector3;

/// Raw tile-entity compounds of one column, keyed by absolute block position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileEntities {
    entries: HashMap<Vector3<i32>, NbtCompound>,
}

fn position_of(tag: &NbtCompound) -> Option<Vector3<i32>> {
    Some(Vector3::new(
        tag.get_int("x")?,
        tag.get_int("y")?,
        tag.get_int("z")?,
    ))
}

impl TileEntities {
    /// Stores `tag`, replacing any tile entity already at its position.
    ///
    /// Tags without integer `x`, `y` and `z` fields are dropped.
    pub fn add(&mut self, tag: NbtCompound) -> bool {
        match position_of(&tag) {
            Some(position) => {
                self.entries.insert(position, tag);
                true
            }
            None => {
                log::warn!("Dropping tile entity without a position: {:?}", tag.get_string("id"));
                false
            }
        }
    }

    pub fn get(&self, position: &Vector3<i32>) -> Option<&NbtCompound> {
        self.entries.get(position)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `TileEntities` list, ordered by y, z and x for stable output.
    pub fn to_nbt(&self) -> NbtList {
        let mut positions: Vec<&Vector3<i32>> = self.entries.keys().collect();
        positions.sort_by_key(|position| (position.y, position.z, position.x));
        NbtList::compounds(
            positions
                .into_iter()
                .filter_map(|position| self.entries.get(position).cloned()),
        )
    }

    pub fn from_nbt(list: &NbtList) -> Self {
        let mut entities = Self::default();
        if list.element_type() != COMPOUND_ID && !list.is_empty() {
            log::warn!("TileEntities is not a compound list");
            return entities;
        }
        for tag in list {
            if let NbtTag::Compound(compound) = tag {
                entities.add(compound.clone());
            }
        }
        entities
    }
}

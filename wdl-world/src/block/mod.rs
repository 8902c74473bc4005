use std::{collections::BTreeMap, fmt};

use wdl_nbt::{NbtTag, compound::NbtCompound};

pub mod registry;

pub use registry::{BlockStateRegistry, GlobalPalette};

/// The numeric id every version uses for air.
pub const AIR_ID: u32 = 0;

/// A named block state such as `minecraft:oak_log[axis=y]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockState {
    pub name: String,
    pub properties: BTreeMap<String, String>,
}

impl BlockState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The `{Name, Properties}` compound used in section palettes.
    pub fn to_nbt(&self) -> NbtCompound {
        let mut compound = NbtCompound::new();
        compound.put_string("Name", &self.name);
        if !self.properties.is_empty() {
            let properties = self
                .properties
                .iter()
                .map(|(key, value)| (key.clone(), NbtTag::from(value.as_str())))
                .collect();
            compound.put_component("Properties", properties);
        }
        compound
    }

    pub fn from_nbt(compound: &NbtCompound) -> Option<Self> {
        let name = compound.get_string("Name")?.clone();
        let properties = compound
            .get_compound("Properties")
            .map(|properties| {
                properties
                    .child_tags
                    .iter()
                    .filter_map(|(key, value)| {
                        value.extract_string().map(|value| (key.clone(), value.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(Self { name, properties })
    }
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.properties.is_empty() {
            let properties: Vec<String> = self
                .properties
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            write!(f, "[{}]", properties.join(","))?;
        }
        Ok(())
    }
}

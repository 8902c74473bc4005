use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use super::{AIR_ID, BlockState};

/// Resolves global block-state ids for one protocol version.
pub trait BlockStateRegistry: Send + Sync {
    fn state(&self, id: u32) -> Option<&BlockState>;

    fn id_of(&self, state: &BlockState) -> Option<u32>;

    fn is_air(&self, id: u32) -> bool {
        id == AIR_ID
    }
}

#[derive(Deserialize)]
struct ReportBlock {
    states: Vec<ReportState>,
}

#[derive(Deserialize)]
struct ReportState {
    id: u32,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

/// In-memory global palette, usually built from the server's `blocks.json` data report.
#[derive(Debug, Default, Clone)]
pub struct GlobalPalette {
    states: HashMap<u32, BlockState>,
    ids: HashMap<BlockState, u32>,
}

impl GlobalPalette {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the report generated by `java -cp server.jar net.minecraft.data.Main --reports`.
    pub fn from_report(json: &str) -> Result<Self, serde_json::Error> {
        let blocks: BTreeMap<String, ReportBlock> = serde_json::from_str(json)?;

        let mut palette = Self::new();
        for (name, block) in blocks {
            for state in block.states {
                palette.register(
                    state.id,
                    BlockState {
                        name: name.clone(),
                        properties: state.properties,
                    },
                );
            }
        }
        log::debug!("Loaded {} block states", palette.len());
        Ok(palette)
    }

    pub fn register(&mut self, id: u32, state: BlockState) {
        self.ids.insert(state.clone(), id);
        self.states.insert(id, state);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl BlockStateRegistry for GlobalPalette {
    fn state(&self, id: u32) -> Option<&BlockState> {
        self.states.get(&id)
    }

    fn id_of(&self, state: &BlockState) -> Option<u32> {
        self.ids.get(state).copied()
    }
}

impl FromIterator<(u32, BlockState)> for GlobalPalette {
    fn from_iter<T: IntoIterator<Item = (u32, BlockState)>>(iter: T) -> Self {
        let mut palette = Self::new();
        for (id, state) in iter {
            palette.register(id, state);
        }
        palette
    }
}

#[cfg(test)]
mod test {
    use crate::block::{BlockState, BlockStateRegistry, GlobalPalette};

    const REPORT: &str = r#"{
        "minecraft:air": { "states": [ { "id": 0, "default": true } ] },
        "minecraft:stone": { "states": [ { "id": 1, "default": true } ] },
        "minecraft:oak_log": {
            "properties": { "axis": ["x", "y", "z"] },
            "states": [
                { "id": 73, "properties": { "axis": "x" } },
                { "id": 74, "default": true, "properties": { "axis": "y" } },
                { "id": 75, "properties": { "axis": "z" } }
            ]
        }
    }"#;

    #[test]
    fn test_from_report() {
        let palette = GlobalPalette::from_report(REPORT).unwrap();
        assert_eq!(palette.len(), 5);

        let log = BlockState::new("minecraft:oak_log").with_property("axis", "y");
        assert_eq!(palette.id_of(&log), Some(74));
        assert_eq!(palette.state(1), Some(&BlockState::new("minecraft:stone")));
        assert_eq!(palette.state(2), None);
        assert!(palette.is_air(0));
        assert!(!palette.is_air(1));
    }

    #[test]
    fn test_bad_report() {
        assert!(GlobalPalette::from_report("{ \"minecraft:air\": 3 }").is_err());
    }
}

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Eq)]
pub struct ParseDimensionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    #[default]
    Overworld,
    Nether,
    End,
}

impl Dimension {
    /// Whether chunk sections in this dimension carry a sky light array.
    #[inline]
    pub const fn has_sky_light(self) -> bool {
        !matches!(self, Self::Nether)
    }

    /// Folder the dimension's data lives in, relative to the world root.
    pub const fn folder(self) -> &'static str {
        match self {
            Self::Overworld => "",
            Self::Nether => "DIM-1",
            Self::End => "DIM1",
        }
    }
}

impl TryFrom<i32> for Dimension {
    type Error = ParseDimensionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Nether),
            0 => Ok(Self::Overworld),
            1 => Ok(Self::End),
            _ => Err(ParseDimensionError),
        }
    }
}

impl FromStr for Dimension {
    type Err = ParseDimensionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overworld" | "minecraft:overworld" => Ok(Self::Overworld),
            "nether" | "the_nether" | "minecraft:the_nether" => Ok(Self::Nether),
            "end" | "the_end" | "minecraft:the_end" => Ok(Self::End),
            _ => Err(ParseDimensionError),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Overworld => "overworld",
            Self::Nether => "nether",
            Self::End => "end",
        };
        f.write_str(name)
    }
}

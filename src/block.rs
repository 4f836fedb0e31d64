//! Block and biome identifiers used by the column synthesizer.
//!
//! These are the small fixed vocabularies the generator needs: the blocks it
//! ever places or substitutes, and the biome categories it branches on.
//! Biome classification itself happens outside this crate; synthesis only
//! consumes the ambient biome at a column.

use serde::de::{self, Deserialize, Deserializer};
use serde::{Serialize, Serializer};
use std::fmt;

/// Block identifier.
///
/// Namespaced string ids (`minecraft:*`) are used in configuration files and
/// in the surface-block overrides delivered by tile data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Block {
    Air,
    Stone,
    Water,
    GrassBlock,
    Dirt,
    DirtPath,
    Farmland,
    Mycelium,
    Snow,
    SnowBlock,
    Sand,
    Bricks,
    GrayConcrete,
    GrayConcretePowder,
    MossBlock,
}

impl Block {
    /// Namespaced string id for this block.
    pub fn id(self) -> &'static str {
        match self {
            Block::Air => "minecraft:air",
            Block::Stone => "minecraft:stone",
            Block::Water => "minecraft:water",
            Block::GrassBlock => "minecraft:grass_block",
            Block::Dirt => "minecraft:dirt",
            Block::DirtPath => "minecraft:dirt_path",
            Block::Farmland => "minecraft:farmland",
            Block::Mycelium => "minecraft:mycelium",
            Block::Snow => "minecraft:snow",
            Block::SnowBlock => "minecraft:snow_block",
            Block::Sand => "minecraft:sand",
            Block::Bricks => "minecraft:bricks",
            Block::GrayConcrete => "minecraft:gray_concrete",
            Block::GrayConcretePowder => "minecraft:gray_concrete_powder",
            Block::MossBlock => "minecraft:moss_block",
        }
    }

    /// Parses a namespaced id. The `minecraft:` prefix is optional.
    pub fn from_id(id: &str) -> Option<Self> {
        let name = id.strip_prefix("minecraft:").unwrap_or(id);
        Some(match name {
            "air" => Block::Air,
            "stone" => Block::Stone,
            "water" => Block::Water,
            "grass_block" => Block::GrassBlock,
            "dirt" => Block::Dirt,
            "dirt_path" => Block::DirtPath,
            "farmland" => Block::Farmland,
            "mycelium" => Block::Mycelium,
            "snow" => Block::Snow,
            "snow_block" => Block::SnowBlock,
            "sand" => Block::Sand,
            "bricks" => Block::Bricks,
            "gray_concrete" => Block::GrayConcrete,
            "gray_concrete_powder" => Block::GrayConcretePowder,
            "moss_block" => Block::MossBlock,
            _ => return None,
        })
    }

    /// Organic surface covers that erode to dirt when directly under water.
    pub fn is_grass_like(self) -> bool {
        matches!(
            self,
            Block::GrassBlock | Block::DirtPath | Block::Farmland | Block::Mycelium | Block::Snow
        )
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl Serialize for Block {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}

impl<'de> Deserialize<'de> for Block {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = String::deserialize(deserializer)?;
        Block::from_id(&id).ok_or_else(|| de::Error::custom(format!("unknown block id '{id}'")))
    }
}

/// Ambient biome category at a column.
///
/// Only the categories the surface pass branches on are distinguished;
/// everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Biome {
    #[default]
    Other,
    Desert,
    SnowyPlains,
    SnowySlopes,
}

impl Biome {
    /// True for biomes whose surface defaults to snow block.
    pub fn is_snowy(self) -> bool {
        matches!(self, Biome::SnowyPlains | Biome::SnowySlopes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_round_trip() {
        for block in [
            Block::Stone,
            Block::Water,
            Block::GrassBlock,
            Block::DirtPath,
            Block::GrayConcretePowder,
            Block::MossBlock,
        ] {
            assert_eq!(Block::from_id(block.id()), Some(block));
        }
    }

    #[test]
    fn test_from_id_without_namespace() {
        assert_eq!(Block::from_id("sand"), Some(Block::Sand));
        assert_eq!(Block::from_id("minecraft:sand"), Some(Block::Sand));
    }

    #[test]
    fn test_from_id_unknown() {
        assert_eq!(Block::from_id("minecraft:end_stone"), None);
        assert_eq!(Block::from_id(""), None);
    }

    #[test]
    fn test_grass_like_set() {
        assert!(Block::GrassBlock.is_grass_like());
        assert!(Block::DirtPath.is_grass_like());
        assert!(Block::Farmland.is_grass_like());
        assert!(Block::Mycelium.is_grass_like());
        assert!(Block::Snow.is_grass_like());
        assert!(!Block::Dirt.is_grass_like());
        assert!(!Block::SnowBlock.is_grass_like());
        assert!(!Block::Stone.is_grass_like());
    }

    #[test]
    fn test_snowy_biomes() {
        assert!(Biome::SnowyPlains.is_snowy());
        assert!(Biome::SnowySlopes.is_snowy());
        assert!(!Biome::Desert.is_snowy());
        assert!(!Biome::Other.is_snowy());
    }
}

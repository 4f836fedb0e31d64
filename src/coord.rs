//! Tile coordinate types and block/tile/band conversions.

use std::fmt;

/// Columns along one edge of a tile.
pub const TILE_SIZE: i32 = 16;

/// Height of one vertical band used by the coarse fill classification.
pub const BAND_SIZE: i32 = 16;

/// Key identifying one rectangular tile of the world grid.
///
/// Tiles are addressed by signed grid coordinates; a tile covers the block
/// range `[x * 16, x * 16 + 16)` × `[z * 16, z * 16 + 16)`. Ordering is
/// lexicographic (x, then z).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileKey {
    /// Tile-grid X coordinate (east-west).
    pub x: i32,
    /// Tile-grid Z coordinate (north-south).
    pub z: i32,
}

impl TileKey {
    /// Creates a key from tile-grid coordinates.
    #[inline]
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Returns the key of the tile containing the given block position.
    #[inline]
    pub fn containing(block_x: i32, block_z: i32) -> Self {
        Self {
            x: block_to_tile(block_x),
            z: block_to_tile(block_z),
        }
    }

    /// Lowest block X coordinate covered by this tile.
    #[inline]
    pub fn min_block_x(&self) -> i32 {
        tile_to_min_block(self.x)
    }

    /// Lowest block Z coordinate covered by this tile.
    #[inline]
    pub fn min_block_z(&self) -> i32 {
        tile_to_min_block(self.z)
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Converts a block coordinate to the tile (or band) coordinate containing it.
///
/// Arithmetic shift keeps negative coordinates correct: block -1 is in tile -1.
#[inline]
pub fn block_to_tile(block: i32) -> i32 {
    block >> 4
}

/// Lowest block coordinate of a tile (or band).
#[inline]
pub fn tile_to_min_block(tile: i32) -> i32 {
    tile << 4
}

/// Column index within a tile for a global block coordinate.
#[inline]
pub fn block_to_local(block: i32) -> usize {
    (block & 15) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containing_positive() {
        assert_eq!(TileKey::containing(0, 0), TileKey::new(0, 0));
        assert_eq!(TileKey::containing(15, 15), TileKey::new(0, 0));
        assert_eq!(TileKey::containing(16, 31), TileKey::new(1, 1));
    }

    #[test]
    fn test_containing_negative() {
        assert_eq!(TileKey::containing(-1, -1), TileKey::new(-1, -1));
        assert_eq!(TileKey::containing(-16, -17), TileKey::new(-1, -2));
    }

    #[test]
    fn test_min_block_round_trips() {
        let key = TileKey::new(-3, 7);
        assert_eq!(key.min_block_x(), -48);
        assert_eq!(key.min_block_z(), 112);
        assert_eq!(TileKey::containing(key.min_block_x(), key.min_block_z()), key);
    }

    #[test]
    fn test_block_to_local() {
        assert_eq!(block_to_local(0), 0);
        assert_eq!(block_to_local(17), 1);
        assert_eq!(block_to_local(-1), 15);
        assert_eq!(block_to_local(-16), 0);
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let mut keys = vec![
            TileKey::new(1, 0),
            TileKey::new(0, 5),
            TileKey::new(0, -1),
            TileKey::new(-2, 9),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                TileKey::new(-2, 9),
                TileKey::new(0, -1),
                TileKey::new(0, 5),
                TileKey::new(1, 0),
            ]
        );
    }
}

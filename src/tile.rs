//! Immutable per-tile terrain data and the cache lookup result type.

use crate::block::Block;
use crate::coord::{tile_to_min_block, BAND_SIZE, TILE_SIZE};
use std::sync::Arc;

const GRID: usize = TILE_SIZE as usize;

/// Sentinel water height meaning "no water in this column".
const NO_WATER: i32 = i32::MIN;

/// Decoded terrain data for one tile.
///
/// Holds per-column ground, water, and surface (top-of-vegetation) heights
/// plus an optional authoritative surface-block override, on a fixed 16×16
/// grid. Heights are in the tile-local vertical frame; the generator applies
/// the configured vertical offset when writing blocks.
///
/// `TileData` is built once by a [`TileDataBuilder`], never mutated, and
/// shared read-only across consumers via `Arc`.
#[derive(Debug, Clone)]
pub struct TileData {
    ground: [[i32; GRID]; GRID],
    water: [[i32; GRID]; GRID],
    surface: [[i32; GRID]; GRID],
    surface_block: [[Option<Block>; GRID]; GRID],
    /// Lowest ground height in the tile, for the band classification.
    min_fill: i32,
    /// Highest filled level (ground or water) in the tile.
    max_fill: i32,
}

impl TileData {
    /// Ground height of the column at local (x, z).
    #[inline]
    pub fn ground_height(&self, x: usize, z: usize) -> i32 {
        self.ground[x][z]
    }

    /// Water surface height of the column, if the column holds water.
    #[inline]
    pub fn water_height(&self, x: usize, z: usize) -> Option<i32> {
        let w = self.water[x][z];
        (w != NO_WATER).then_some(w)
    }

    /// Surface height of the column (top of vegetation/structures).
    #[inline]
    pub fn surface_height(&self, x: usize, z: usize) -> i32 {
        self.surface[x][z]
    }

    /// Authoritative surface block for the column, if the data source
    /// supplied one.
    #[inline]
    pub fn surface_block(&self, x: usize, z: usize) -> Option<Block> {
        self.surface_block[x][z]
    }

    /// True when the vertical band lies entirely above every filled column,
    /// i.e. the band and everything above it is guaranteed air.
    #[inline]
    pub fn above_surface(&self, band: i32) -> bool {
        tile_to_min_block(band) > self.max_fill
    }

    /// True when the vertical band lies entirely below every column's
    /// ground, i.e. the band is guaranteed solid.
    #[inline]
    pub fn below_surface(&self, band: i32) -> bool {
        tile_to_min_block(band) + BAND_SIZE - 1 < self.min_fill
    }
}

/// Builder for [`TileData`].
///
/// Starts with a flat tile at the given base height and no water. The water
/// invariant (water height ≥ ground height where present) is enforced at
/// [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct TileDataBuilder {
    ground: [[i32; GRID]; GRID],
    water: [[i32; GRID]; GRID],
    surface: Option<[[i32; GRID]; GRID]>,
    surface_block: [[Option<Block>; GRID]; GRID],
}

impl TileDataBuilder {
    /// Creates a builder for a flat tile with every ground height set to
    /// `base_height` and no water or overrides.
    pub fn flat(base_height: i32) -> Self {
        Self {
            ground: [[base_height; GRID]; GRID],
            water: [[NO_WATER; GRID]; GRID],
            surface: None,
            surface_block: [[None; GRID]; GRID],
        }
    }

    /// Sets the ground height of one column.
    pub fn ground(mut self, x: usize, z: usize, height: i32) -> Self {
        self.ground[x][z] = height;
        self
    }

    /// Sets the water surface height of one column.
    pub fn water(mut self, x: usize, z: usize, height: i32) -> Self {
        self.water[x][z] = height;
        self
    }

    /// Sets the surface (top-of-vegetation) height of one column.
    ///
    /// Columns without an explicit surface height default to their ground
    /// height at build time.
    pub fn surface(mut self, x: usize, z: usize, height: i32) -> Self {
        let mut grid = self.surface.unwrap_or(self.ground);
        grid[x][z] = height;
        self.surface = Some(grid);
        self
    }

    /// Sets the authoritative surface block of one column.
    pub fn surface_block(mut self, x: usize, z: usize, block: Block) -> Self {
        self.surface_block[x][z] = Some(block);
        self
    }

    /// Finalizes the tile data.
    ///
    /// Returns `None` if any column has a water height below its ground
    /// height; malformed tiles are treated as a decode failure by callers.
    pub fn build(self) -> Option<TileData> {
        let surface = self.surface.unwrap_or(self.ground);

        let mut min_fill = i32::MAX;
        let mut max_fill = i32::MIN;
        for x in 0..GRID {
            for z in 0..GRID {
                let g = self.ground[x][z];
                let w = self.water[x][z];
                if w != NO_WATER && w < g {
                    return None;
                }
                min_fill = min_fill.min(g);
                max_fill = max_fill.max(g).max(if w == NO_WATER { g } else { w });
            }
        }

        Some(TileData {
            ground: self.ground,
            water: self.water,
            surface,
            surface_block: self.surface_block,
            min_fill,
            max_fill,
        })
    }
}

/// Outcome of a cache lookup for one tile.
///
/// Absence is explicit: a tile is either resolved, still being fetched, or
/// unavailable (failed, rejected, locked out, or timed out). Consumers treat
/// `Pending` and `Unavailable` identically for synthesis fallbacks; the
/// distinction matters only for diagnostics.
#[derive(Debug, Clone, Default)]
pub enum TileLookup {
    /// Tile data is resolved and shared read-only.
    Resolved(Arc<TileData>),
    /// A fetch is in flight; data may be available on a later call.
    Pending,
    /// No data for this call. Synthesis falls back to the flat pad.
    #[default]
    Unavailable,
}

impl TileLookup {
    /// Returns the resolved data, if any.
    pub fn data(&self) -> Option<&Arc<TileData>> {
        match self {
            TileLookup::Resolved(data) => Some(data),
            _ => None,
        }
    }

    /// True when the lookup carries resolved data.
    pub fn is_resolved(&self) -> bool {
        matches!(self, TileLookup::Resolved(_))
    }
}

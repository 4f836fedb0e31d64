//! Column synthesis: turning tile data (or its absence) into blocks.
//!
//! Pure given its inputs: the same tile data, bounds, and configuration
//! always produce the same blocks (with the deterministic mountain
//! threshold; the jittered mode trades that for visual variety).

use crate::block::{Biome, Block};
use crate::config::GeneratorConfig;
use crate::coord::{block_to_tile, tile_to_min_block, TILE_SIZE};
use crate::gen::{ChunkWriter, HeightKind, WorldBounds};
use crate::tile::TileData;
use serde::{Deserialize, Serialize};

const GRID: usize = TILE_SIZE as usize;

/// High-altitude surface rule: at or above the threshold, the surface block
/// is always stone regardless of biome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MountainThreshold {
    /// Single fixed height. Deterministic; the default.
    Fixed { height: i32 },
    /// Per-column height sampled uniformly from `base ± spread`, breaking
    /// up the hard stone line on large mountains.
    Jittered { base: i32, spread: i32 },
}

impl Default for MountainThreshold {
    fn default() -> Self {
        MountainThreshold::Fixed { height: 7500 }
    }
}

impl MountainThreshold {
    /// Threshold for one column.
    fn sample(self) -> i32 {
        match self {
            MountainThreshold::Fixed { height } => height,
            MountainThreshold::Jittered { base, spread } => {
                base + fastrand::i32(-spread..=spread)
            }
        }
    }
}

/// Synthesizes voxel columns from tile data.
#[derive(Debug, Clone)]
pub struct ColumnSynthesizer {
    config: GeneratorConfig,
}

impl ColumnSynthesizer {
    /// Creates a synthesizer with the given configuration.
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// Coarse pass: fills stone and water for a whole tile.
    ///
    /// With no tile data, pads a flat stone floor from the bottom of the
    /// world up to the vertical offset. With data, skips vertical bands the
    /// classification proves empty or solid, then fills the remaining
    /// columns individually.
    pub fn bulk_fill<W: ChunkWriter>(
        &self,
        data: Option<&TileData>,
        bounds: WorldBounds,
        writer: &mut W,
    ) {
        let WorldBounds { min_y, max_y } = bounds;
        let offset = self.config.vertical_offset;

        let Some(data) = data else {
            if offset > min_y {
                writer.fill_region(0, min_y, 0, 16, offset.min(max_y), 16, Block::Stone);
            }
            return;
        };

        // Band walk happens in the tile-local frame.
        let mut band = block_to_tile(min_y - offset);
        let max_band = block_to_tile(max_y - offset);

        if data.above_surface(band) {
            return;
        }
        while band < max_band && data.below_surface(band) {
            band += 1;
        }

        if band >= max_band {
            // Terrain tops out above the world ceiling: solid throughout.
            writer.fill_region(0, min_y, 0, 16, max_y, 16, Block::Stone);
            return;
        }

        let solid_top = (tile_to_min_block(band) + offset).clamp(min_y, max_y);
        if solid_top > min_y {
            writer.fill_region(0, min_y, 0, 16, solid_top, 16, Block::Stone);
        }

        for x in 0..GRID {
            for z in 0..GRID {
                let ground = (data.ground_height(x, z) + offset).min(max_y - 1);
                if ground < min_y {
                    continue;
                }
                writer.fill_region(x as i32, min_y, z as i32, x as i32 + 1, ground + 1, z as i32 + 1, Block::Stone);

                if let Some(water) = data.water_height(x, z) {
                    let water = (water + offset).min(max_y - 1);
                    if water > ground {
                        writer.fill_region(
                            x as i32,
                            ground + 1,
                            z as i32,
                            x as i32 + 1,
                            water + 1,
                            z as i32 + 1,
                            Block::Water,
                        );
                    }
                }
            }
        }
    }

    /// Fine pass: writes exactly one surface block per column.
    ///
    /// Selection order per column: authoritative override (through the
    /// substitution table), mountain-stone rule, biome rule, configured
    /// default. A grass-like choice directly under water erodes to dirt.
    pub fn surface_pass<W: ChunkWriter>(
        &self,
        data: Option<&TileData>,
        bounds: WorldBounds,
        writer: &mut W,
    ) {
        let Some(data) = data else { return };
        let WorldBounds { min_y, max_y } = bounds;
        let offset = self.config.vertical_offset;

        for x in 0..GRID {
            for z in 0..GRID {
                let ground = data.ground_height(x, z) + offset;
                if ground < min_y || ground >= max_y {
                    continue;
                }

                let mut material = if let Some(block) = data.surface_block(x, z) {
                    self.map_override(block)
                } else if ground >= self.config.mountain_threshold.sample() {
                    Block::Stone
                } else {
                    match writer.biome_at(x as i32, ground, z as i32) {
                        Biome::Desert => Block::Sand,
                        biome if biome.is_snowy() => Block::SnowBlock,
                        _ => self.config.surface_material,
                    }
                };

                if material.is_grass_like()
                    && ground + 1 < max_y
                    && writer.block_at(x as i32, ground + 1, z as i32) == Block::Water
                {
                    material = Block::Dirt;
                }

                writer.set_block(x as i32, ground, z as i32, material);
            }
        }
    }

    /// Height query for one column.
    ///
    /// Ocean-floor queries report ground height, default queries the
    /// surface (top-of-vegetation) height, both shifted by the vertical
    /// offset. Without data the vertical offset itself is the answer.
    pub fn base_height(
        &self,
        data: Option<&TileData>,
        local_x: usize,
        local_z: usize,
        kind: HeightKind,
    ) -> i32 {
        let offset = self.config.vertical_offset;
        match data {
            None => offset,
            Some(data) => match kind {
                HeightKind::OceanFloor => data.ground_height(local_x, local_z) + offset,
                HeightKind::Default => data.surface_height(local_x, local_z) + offset,
            },
        }
    }

    /// Maps an authoritative override block through the configured
    /// substitution table; unknown overrides pass through unchanged.
    fn map_override(&self, block: Block) -> Block {
        match block {
            Block::Bricks => self.config.building_outline_material,
            Block::GrayConcrete => self.config.road_material,
            Block::DirtPath => self.config.path_material,
            other => other,
        }
    }
}

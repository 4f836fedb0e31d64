//! World generation surface: the [`Generator`] facade and the traits and
//! types it speaks through.
//!
//! Block storage lives on the caller's side behind [`ChunkWriter`]; the
//! generator only decides what goes where. [`BufferChunk`] is a simple
//! in-memory writer for tests and demos.

pub mod synth;

pub use synth::{ColumnSynthesizer, MountainThreshold};

use crate::block::{Biome, Block};
use crate::config::GeneratorConfig;
use crate::coord::{block_to_local, TileKey};
use crate::fetch::{FetchGovernor, TickCache, TileCache};
use crate::provider::TileProvider;
use std::sync::Arc;

/// Vertical extent of the generated world. `max_y` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldBounds {
    pub min_y: i32,
    pub max_y: i32,
}

/// Which height a [`Generator::base_height`] query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightKind {
    /// Ground height, ignoring water above it.
    OceanFloor,
    /// Surface height, the top of vegetation and structures.
    Default,
}

/// Destination for generated blocks.
///
/// Coordinates are tile-local in `x`/`z` (`0..16`) and absolute in `y`.
/// Implementations are expected to tolerate overlapping fills; the bulk
/// pass writes some blocks twice.
pub trait ChunkWriter {
    /// Fills the half-open region `[min, max)` with one block.
    fn fill_region(
        &mut self,
        min_x: i32,
        min_y: i32,
        min_z: i32,
        max_x: i32,
        max_y: i32,
        max_z: i32,
        block: Block,
    );

    /// Writes a single block.
    fn set_block(&mut self, x: i32, y: i32, z: i32, block: Block);

    /// Reads a block previously written (or air).
    fn block_at(&self, x: i32, y: i32, z: i32) -> Block;

    /// Biome at a position, supplied by the surrounding world.
    fn biome_at(&self, x: i32, y: i32, z: i32) -> Biome;
}

/// In-memory [`ChunkWriter`] holding one 16x16 column stack.
///
/// Out-of-bounds writes are clamped away rather than panicking, matching
/// how real chunk storage behaves at the world ceiling.
pub struct BufferChunk {
    bounds: WorldBounds,
    blocks: Vec<Block>,
    biomes: [[Biome; 16]; 16],
}

impl BufferChunk {
    pub fn new(bounds: WorldBounds) -> Self {
        let height = (bounds.max_y - bounds.min_y).max(0) as usize;
        Self {
            bounds,
            blocks: vec![Block::Air; height * 256],
            biomes: [[Biome::Other; 16]; 16],
        }
    }

    /// Sets the biome reported for every `y` in one column.
    pub fn set_biome(&mut self, x: usize, z: usize, biome: Biome) {
        self.biomes[x][z] = biome;
    }

    fn index(&self, x: i32, y: i32, z: i32) -> Option<usize> {
        if !(0..16).contains(&x) || !(0..16).contains(&z) {
            return None;
        }
        if y < self.bounds.min_y || y >= self.bounds.max_y {
            return None;
        }
        let dy = (y - self.bounds.min_y) as usize;
        Some(dy * 256 + x as usize * 16 + z as usize)
    }
}

impl ChunkWriter for BufferChunk {
    fn fill_region(
        &mut self,
        min_x: i32,
        min_y: i32,
        min_z: i32,
        max_x: i32,
        max_y: i32,
        max_z: i32,
        block: Block,
    ) {
        for x in min_x.max(0)..max_x.min(16) {
            for z in min_z.max(0)..max_z.min(16) {
                for y in min_y.max(self.bounds.min_y)..max_y.min(self.bounds.max_y) {
                    if let Some(i) = self.index(x, y, z) {
                        self.blocks[i] = block;
                    }
                }
            }
        }
    }

    fn set_block(&mut self, x: i32, y: i32, z: i32, block: Block) {
        if let Some(i) = self.index(x, y, z) {
            self.blocks[i] = block;
        }
    }

    fn block_at(&self, x: i32, y: i32, z: i32) -> Block {
        self.index(x, y, z)
            .map(|i| self.blocks[i])
            .unwrap_or(Block::Air)
    }

    fn biome_at(&self, x: i32, _y: i32, z: i32) -> Biome {
        if (0..16).contains(&x) && (0..16).contains(&z) {
            self.biomes[x as usize][z as usize]
        } else {
            Biome::Other
        }
    }
}

/// Ties acquisition and synthesis together behind one handle.
///
/// Owns the authoritative tile cache, the tick-local read-through cache,
/// and a [`ColumnSynthesizer`]; shares the cache across clones cheaply
/// through `Arc`.
pub struct Generator<P> {
    config: GeneratorConfig,
    primary: Arc<TileCache<P>>,
    tick: Arc<TickCache<P>>,
    synth: ColumnSynthesizer,
}

impl<P> Clone for Generator<P> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            primary: Arc::clone(&self.primary),
            tick: Arc::clone(&self.tick),
            synth: self.synth.clone(),
        }
    }
}

impl<P: TileProvider> Generator<P> {
    /// Builds a generator around a provider, wiring the fetch governor and
    /// both cache tiers from the configuration.
    pub fn new(provider: P, config: GeneratorConfig) -> Self {
        let governor = Arc::new(FetchGovernor::new(
            config.fetch.admission,
            config.fetch.lockout_cooldown(),
        ));
        let primary = Arc::new(TileCache::new(provider, governor, &config.fetch));
        let tick = Arc::new(TickCache::new(Arc::clone(&primary), &config.fetch));
        let synth = ColumnSynthesizer::new(config.clone());
        Self {
            config,
            primary,
            tick,
            synth,
        }
    }

    /// Tile key covering a block position, with the horizontal offset
    /// applied before key derivation.
    pub fn tile_key_at(&self, block_x: i32, block_z: i32) -> TileKey {
        TileKey::containing(
            block_x + self.config.horizontal_offset_x,
            block_z + self.config.horizontal_offset_z,
        )
    }

    /// Bulk terrain pass for one tile. Waits on tile data up to the
    /// configured blocking timeout; on timeout or failure the tile renders
    /// as the flat fallback pad.
    pub async fn generate_noise<W: ChunkWriter>(
        &self,
        key: TileKey,
        bounds: WorldBounds,
        writer: &mut W,
    ) {
        let lookup = self.tick.get(key).await;
        self.synth
            .bulk_fill(lookup.data().map(Arc::as_ref), bounds, writer);
    }

    /// Surface pass for one tile. Absent data leaves the bulk result
    /// untouched.
    pub async fn generate_surface<W: ChunkWriter>(
        &self,
        key: TileKey,
        bounds: WorldBounds,
        writer: &mut W,
    ) {
        let lookup = self.tick.get(key).await;
        self.synth
            .surface_pass(lookup.data().map(Arc::as_ref), bounds, writer);
    }

    /// Non-blocking height query for a block column. Starts a background
    /// fetch on a cache miss and answers with the fallback until the tile
    /// resolves.
    pub fn base_height(&self, block_x: i32, block_z: i32, kind: HeightKind) -> i32 {
        let x = block_x + self.config.horizontal_offset_x;
        let z = block_z + self.config.horizontal_offset_z;
        let lookup = self.primary.peek(TileKey::containing(x, z));
        self.synth.base_height(
            lookup.data().map(Arc::as_ref),
            block_to_local(x),
            block_to_local(z),
            kind,
        )
    }

    /// The authoritative tile cache.
    pub fn cache(&self) -> &Arc<TileCache<P>> {
        &self.primary
    }

    /// The governor shared by every fetch this generator starts.
    pub fn governor(&self) -> &Arc<FetchGovernor> {
        self.primary.governor()
    }

    /// Active configuration.
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}

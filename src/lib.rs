//! Terravox - real-terrain voxel column generation
//!
//! This library turns per-tile elevation data from a remote source into
//! voxel columns: it fetches and caches 16x16 tiles of ground, water, and
//! surface heights, then synthesizes stone, water, and surface blocks for a
//! world whose storage lives on the caller's side.
//!
//! # High-Level API
//!
//! The [`gen`] module provides the [`gen::Generator`] facade that most
//! embedders want:
//!
//! ```ignore
//! use terravox::config::GeneratorConfig;
//! use terravox::gen::{Generator, WorldBounds};
//!
//! let generator = Generator::new(provider, GeneratorConfig::default());
//! let key = generator.tile_key_at(block_x, block_z);
//! generator.generate_noise(key, bounds, &mut chunk).await;
//! generator.generate_surface(key, bounds, &mut chunk).await;
//! ```
//!
//! Implement [`provider::TileProvider`] to plug in a data source, and
//! [`gen::ChunkWriter`] to receive blocks.

pub mod block;
pub mod config;
pub mod coord;
pub mod fetch;
pub mod gen;
pub mod logging;
pub mod provider;
pub mod tile;

pub use block::{Biome, Block};
pub use config::GeneratorConfig;
pub use coord::TileKey;
pub use gen::{ChunkWriter, Generator, HeightKind, WorldBounds};
pub use provider::{FetchError, TileProvider};
pub use tile::{TileData, TileLookup};

/// Version of the terravox library.
///
/// Defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Generator configuration: materials, offsets, and fetch tuning.
//!
//! Configuration is plain data with serde derives and a complete `Default`
//! carrying the design constants. A TOML file can override any subset of
//! fields:
//!
//! ```toml
//! surface_material = "minecraft:grass_block"
//! vertical_offset = 64
//!
//! [fetch]
//! admission = { mode = "hard_cap", max_in_flight = 12 }
//! lockout_cooldown_secs = 30
//! ```

use crate::block::Block;
use crate::fetch::AdmissionPolicy;
use crate::gen::MountainThreshold;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML or has invalid values.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Complete generator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Default surface block where no override and no biome rule applies.
    pub surface_material: Block,
    /// Material substituted for building-outline overrides.
    pub building_outline_material: Block,
    /// Material substituted for road overrides.
    pub road_material: Block,
    /// Material substituted for path overrides.
    pub path_material: Block,
    /// Y-axis shift applied to all heights coming out of tile data.
    pub vertical_offset: i32,
    /// X shift applied to block coordinates before tile-key derivation.
    pub horizontal_offset_x: i32,
    /// Z shift applied to block coordinates before tile-key derivation.
    pub horizontal_offset_z: i32,
    /// High-altitude surface rule: at or above this height the surface is
    /// always stone.
    pub mountain_threshold: MountainThreshold,
    /// Fetch and cache tuning.
    pub fetch: FetchConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            surface_material: Block::GrassBlock,
            building_outline_material: Block::Bricks,
            road_material: Block::GrayConcretePowder,
            path_material: Block::MossBlock,
            vertical_offset: 0,
            horizontal_offset_x: 0,
            horizontal_offset_z: 0,
            mountain_threshold: MountainThreshold::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl GeneratorConfig {
    /// Parses configuration from a TOML string.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }
}

/// Tuning for the acquisition subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Admission policy for new upstream fetches.
    pub admission: AdmissionPolicy,
    /// Lockout window applied after an upstream abuse signal, in seconds.
    pub lockout_cooldown_secs: u64,
    /// Idle time after which resolved cache entries are reclaimed, in
    /// seconds.
    pub idle_ttl_secs: u64,
    /// Maximum authoritative cache entries. At the cap, the least recently
    /// accessed settled entry is evicted to make room.
    pub max_entries: usize,
    /// How long a synthesis call may wait for an in-flight fetch, in
    /// milliseconds. Deployment profiles range from 2000 to 6000.
    pub blocking_timeout_ms: u64,
    /// Lifetime of tick-cache entries, in milliseconds. Roughly one
    /// generation pass.
    pub tick_ttl_ms: u64,
    /// Maximum tick-cache entries before wholesale discard.
    pub tick_capacity: usize,
    /// Whether a failed fetch evicts its cache entry immediately (instant
    /// retry on a later call) instead of replaying the failure until idle
    /// eviction.
    pub evict_failed: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            admission: AdmissionPolicy::default(),
            lockout_cooldown_secs: 30,
            idle_ttl_secs: 300,
            max_entries: 1000,
            blocking_timeout_ms: 2000,
            tick_ttl_ms: 1000,
            tick_capacity: 512,
            evict_failed: true,
        }
    }
}

impl FetchConfig {
    /// Lockout cooldown as a duration.
    pub fn lockout_cooldown(&self) -> Duration {
        Duration::from_secs(self.lockout_cooldown_secs)
    }

    /// Idle TTL for authoritative cache entries.
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    /// Blocking read timeout.
    pub fn blocking_timeout(&self) -> Duration {
        Duration::from_millis(self.blocking_timeout_ms)
    }

    /// Tick cache entry TTL.
    pub fn tick_ttl(&self) -> Duration {
        Duration::from_millis(self.tick_ttl_ms)
    }
}

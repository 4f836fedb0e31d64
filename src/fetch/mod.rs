//! Tile-data acquisition: governed fetching and two cache tiers.
//!
//! The hot synthesis path talks to [`TickCache`], which coalesces a
//! generation pass's repeated reads into one [`TileCache`] round-trip;
//! the authoritative [`TileCache`] deduplicates concurrent fetches per key
//! and runs them on background tasks admitted by the shared
//! [`FetchGovernor`].

pub mod cache;
pub mod governor;
pub mod tick;

pub use cache::TileCache;
pub use governor::{Admission, AdmissionPolicy, FetchGovernor, FetchTicket, RejectReason};
pub use tick::TickCache;

//! Remote tile data provider boundary.
//!
//! The provider is the crate's only view of the upstream elevation service:
//! one asynchronous, single-shot request per tile key. Transport details
//! (HTTP client, projection, wire format) live behind implementations of
//! [`TileProvider`]; this crate performs no retries at this boundary.
//! Retry and backoff are cache/governor concerns.

use crate::coord::TileKey;
use crate::tile::TileData;
use std::future::Future;
use thiserror::Error;

/// Errors a provider can report for a single tile fetch.
///
/// The variants carry exactly what failure classification needs: HTTP status
/// codes when the upstream answered, and typed transport signals when it did
/// not. Everything else is opaque.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Upstream answered with a non-success HTTP status.
    #[error("upstream returned HTTP {0}")]
    Status(u16),

    /// Connection was reset by the peer.
    #[error("connection reset by upstream")]
    ConnectionReset,

    /// Connection was refused.
    #[error("connection refused by upstream")]
    ConnectionRefused,

    /// The transport-level request timed out.
    #[error("request timed out")]
    Timeout,

    /// Response arrived but could not be decoded into tile data.
    #[error("malformed tile data: {0}")]
    Decode(String),

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Other(String),
}

impl FetchError {
    /// True for failures that signal upstream rate limiting or abuse
    /// protection. These trigger the global lockout; all other failures are
    /// transient per-tile conditions.
    pub fn is_abuse_signal(&self) -> bool {
        match self {
            FetchError::Status(429) => true,
            FetchError::ConnectionReset | FetchError::ConnectionRefused => true,
            FetchError::Other(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("too many requests") || msg.contains("429")
            }
            _ => false,
        }
    }
}

/// Asynchronous source of per-tile terrain data.
///
/// Implementations must be cheap to share (`Send + Sync`); the cache clones
/// an `Arc` of the provider into each background fetch task. A fetch that
/// outlives its caller keeps running; cancellation is not propagated
/// upstream.
pub trait TileProvider: Send + Sync + 'static {
    /// Fetches the data for one tile.
    fn fetch(&self, key: TileKey) -> impl Future<Output = Result<TileData, FetchError>> + Send;
}

//! Tick-local cache in front of the authoritative tile cache.
//!
//! A generation pass queries the same tile several times (bulk fill and
//! surface pass at minimum). The tick cache coalesces those calls into one
//! authoritative blocking read per tile per short window. Entries live for
//! about one synthesis tick; unavailable outcomes are remembered for the
//! window too, but never beyond it, so a later tick always retries.

use crate::config::FetchConfig;
use crate::coord::TileKey;
use crate::fetch::cache::TileCache;
use crate::provider::TileProvider;
use crate::tile::TileLookup;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tracing::{debug, trace};

#[derive(Debug)]
enum TickState {
    /// An authoritative read for this key is in progress; followers wait on
    /// the channel instead of issuing their own.
    InFlight(watch::Receiver<Option<TileLookup>>),
    /// Outcome recorded for the rest of the window.
    Settled(TileLookup),
}

#[derive(Debug)]
struct TickEntry {
    at: Instant,
    state: TickState,
}

/// What one lock-held window inspection decided for a caller.
enum Action {
    Hit(TileLookup),
    Wait(watch::Receiver<Option<TileLookup>>),
    Lead(watch::Sender<Option<TileLookup>>),
}

/// Short-TTL, bounded cache over [`TileCache`].
#[derive(Debug)]
pub struct TickCache<P> {
    primary: Arc<TileCache<P>>,
    ttl: Duration,
    capacity: usize,
    blocking_timeout: Duration,
    entries: Mutex<HashMap<TileKey, TickEntry>>,
    /// Unavailable outcomes recorded this session, for diagnostics only.
    recent_failures: std::sync::atomic::AtomicU64,
}

impl<P: TileProvider> TickCache<P> {
    /// Creates a tick cache in front of `primary`.
    pub fn new(primary: Arc<TileCache<P>>, config: &FetchConfig) -> Self {
        Self {
            primary,
            ttl: config.tick_ttl(),
            capacity: config.tick_capacity,
            blocking_timeout: config.blocking_timeout(),
            entries: Mutex::new(HashMap::new()),
            recent_failures: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Returns the tile lookup for `key`, going to the authoritative cache
    /// at most once per TTL window.
    ///
    /// The first caller in a window becomes the leader and performs the
    /// blocking authoritative read (up to the configured timeout);
    /// concurrent callers for the same key wait for the leader's outcome. A
    /// `Pending` outcome is recorded as `Unavailable` for the rest of the
    /// window.
    pub async fn get(&self, key: TileKey) -> TileLookup {
        let now = Instant::now();

        let action = {
            let mut entries = self.entries.lock().await;
            let existing = entries.get(&key).and_then(|entry| match &entry.state {
                TickState::InFlight(rx) => Some(Action::Wait(rx.clone())),
                TickState::Settled(lookup) if now.duration_since(entry.at) < self.ttl => {
                    Some(Action::Hit(lookup.clone()))
                }
                TickState::Settled(_) => None,
            });
            match existing {
                Some(action) => action,
                None => {
                    if entries.len() >= self.capacity {
                        // Stale entries first; if the window is genuinely
                        // full of live entries, discard wholesale rather
                        // than tracking order.
                        let ttl = self.ttl;
                        entries.retain(|_, e| now.duration_since(e.at) < ttl);
                        if entries.len() >= self.capacity {
                            debug!(
                                capacity = self.capacity,
                                "tick cache overflow, discarding window"
                            );
                            entries.clear();
                        }
                    }
                    let (tx, rx) = watch::channel(None);
                    entries.insert(
                        key,
                        TickEntry {
                            at: now,
                            state: TickState::InFlight(rx),
                        },
                    );
                    Action::Lead(tx)
                }
            }
        };

        match action {
            Action::Hit(lookup) => {
                trace!(tile = %key, "tick cache hit");
                lookup
            }
            Action::Wait(mut rx) => {
                // Clone out of the watch guard before awaiting so the
                // non-`Send` guard does not live across an await point.
                let outcome = rx
                    .wait_for(|outcome| outcome.is_some())
                    .await
                    .map(|guard| guard.clone());
                match outcome {
                    Ok(outcome) => outcome.unwrap_or_default(),
                    // Leader dropped before settling; read directly.
                    Err(_) => self.read_primary(key).await,
                }
            }
            Action::Lead(tx) => {
                let lookup = self.read_primary(key).await;
                let _ = tx.send(Some(lookup.clone()));
                lookup
            }
        }
    }

    /// One authoritative blocking read, recorded in the window.
    async fn read_primary(&self, key: TileKey) -> TileLookup {
        let lookup = match self.primary.get_timeout(key, self.blocking_timeout).await {
            TileLookup::Resolved(data) => TileLookup::Resolved(data),
            // Within this window the distinction is moot; the authoritative
            // cache keeps the fetch running for the next tick.
            TileLookup::Pending | TileLookup::Unavailable => {
                self.recent_failures
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                TileLookup::Unavailable
            }
        };

        let mut entries = self.entries.lock().await;
        entries.insert(
            key,
            TickEntry {
                at: Instant::now(),
                state: TickState::Settled(lookup.clone()),
            },
        );
        lookup
    }

    /// Count of unavailable outcomes observed, for diagnostics.
    pub fn recent_failures(&self) -> u64 {
        self.recent_failures
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Number of live window entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// True when the window holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

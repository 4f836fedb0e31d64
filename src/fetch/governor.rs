//! Shared fetch governor: admission control and upstream-abuse lockout.
//!
//! One governor instance is shared by every cache and fetch task. It owns
//! the only two pieces of mutable global state in the subsystem: the
//! active-request counter and the lockout deadline. It is injected
//! explicitly (`Arc<FetchGovernor>`), never a process-wide static, so tests
//! can run isolated governors side by side.
//!
//! # Admission policies
//!
//! Two pacing strategies exist in deployments and both are supported:
//!
//! - **Hard cap**: admit up to a fixed ceiling of in-flight fetches, reject
//!   beyond it. Rejection is expected backpressure, not a fault.
//! - **Soft delay**: always admit, but require a pacing delay before
//!   dispatch once a lower threshold of in-flight fetches is exceeded.

use crate::provider::FetchError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How new fetches are admitted against the in-flight count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AdmissionPolicy {
    /// Admit while fewer than `max_in_flight` fetches are outstanding,
    /// reject otherwise.
    HardCap { max_in_flight: usize },
    /// Always admit; demand a pacing delay of `delay_ms` before dispatch
    /// once more than `threshold` fetches are outstanding.
    SoftDelay { threshold: usize, delay_ms: u64 },
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        AdmissionPolicy::HardCap { max_in_flight: 12 }
    }
}

/// Outcome of an admission attempt.
#[derive(Debug)]
pub enum Admission {
    /// Fetch may start immediately. Dropping the ticket releases the slot.
    Admit(FetchTicket),
    /// Fetch may start after sleeping `delay` (soft-throttle pacing).
    AdmitAfter(FetchTicket, Duration),
    /// No fetch may start for this call.
    Reject(RejectReason),
}

/// Why an admission attempt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The hard cap of in-flight fetches is reached (expected backpressure).
    AtCapacity,
    /// The global lockout window is active.
    LockedOut,
}

/// Shared admission and lockout state for all upstream fetches.
#[derive(Debug)]
pub struct FetchGovernor {
    policy: AdmissionPolicy,
    cooldown: Duration,
    in_flight: AtomicUsize,
    /// Deadline before which all new fetches are short-circuited. A single
    /// coarse window is intentional: rate limiting is a property of the
    /// shared upstream channel, not of any one tile.
    locked_out_until: Mutex<Option<Instant>>,
}

impl FetchGovernor {
    /// Creates a governor with the given admission policy and lockout
    /// cooldown.
    pub fn new(policy: AdmissionPolicy, cooldown: Duration) -> Self {
        Self {
            policy,
            cooldown,
            in_flight: AtomicUsize::new(0),
            locked_out_until: Mutex::new(None),
        }
    }

    /// Attempts to admit a new fetch.
    ///
    /// Checks the lockout window first, then applies the admission policy.
    /// The returned ticket holds the in-flight slot until dropped; release
    /// is paired 1:1 with admission on every outcome path.
    pub fn try_admit(self: &Arc<Self>) -> Admission {
        if self.is_locked_out() {
            return Admission::Reject(RejectReason::LockedOut);
        }

        match self.policy {
            AdmissionPolicy::HardCap { max_in_flight } => {
                // Claim the slot with a compare-exchange so simultaneous
                // admitters can never overshoot the ceiling.
                let mut current = self.in_flight.load(Ordering::Acquire);
                loop {
                    if current >= max_in_flight {
                        debug!(
                            in_flight = current,
                            max_in_flight, "fetch rejected at capacity"
                        );
                        return Admission::Reject(RejectReason::AtCapacity);
                    }
                    match self.in_flight.compare_exchange(
                        current,
                        current + 1,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return Admission::Admit(self.ticket()),
                        Err(seen) => current = seen,
                    }
                }
            }
            AdmissionPolicy::SoftDelay {
                threshold,
                delay_ms,
            } => {
                let outstanding = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
                let ticket = self.ticket();
                if outstanding > threshold {
                    Admission::AdmitAfter(ticket, Duration::from_millis(delay_ms))
                } else {
                    Admission::Admit(ticket)
                }
            }
        }
    }

    /// A ticket for an in-flight slot already claimed on the counter.
    fn ticket(self: &Arc<Self>) -> FetchTicket {
        FetchTicket {
            governor: Arc::clone(self),
        }
    }

    /// Number of currently outstanding fetches.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// True while the lockout window is active.
    pub fn is_locked_out(&self) -> bool {
        let guard = self.locked_out_until.lock().unwrap();
        matches!(*guard, Some(until) if Instant::now() < until)
    }

    /// Classifies a fetch failure and activates the lockout on abuse
    /// signals (HTTP 429, connection reset/refused, "too many requests").
    ///
    /// Activation logs one warning; further abuse signals while the window
    /// is already active neither extend the deadline nor log again.
    /// Non-abuse failures are transient per-tile conditions and leave the
    /// governor untouched.
    pub fn on_failure(&self, err: &FetchError) {
        if !err.is_abuse_signal() {
            return;
        }

        let mut guard = self.locked_out_until.lock().unwrap();
        let now = Instant::now();
        let active = matches!(*guard, Some(until) if now < until);
        if !active {
            *guard = Some(now + self.cooldown);
            warn!(
                cooldown_secs = self.cooldown.as_secs(),
                error = %err,
                "upstream rate limiting detected, pausing fetches"
            );
        }
    }

    fn release(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// An admitted fetch's slot in the governor.
///
/// Held for the lifetime of the fetch; dropping it decrements the in-flight
/// counter exactly once, whatever the outcome path.
#[derive(Debug)]
pub struct FetchTicket {
    governor: Arc<FetchGovernor>,
}

impl Drop for FetchTicket {
    fn drop(&mut self) {
        self.governor.release();
    }
}

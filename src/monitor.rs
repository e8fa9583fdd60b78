//! # Connection Monitor
//!
//! Every wait in the printer and nibble protocols is "read the status
//! register until some bit pattern shows up". This module provides that one
//! primitive, [`poll_until`], plus the falling-edge variant the receiver
//! uses, [`poll_edge`].
//!
//! ## Bounds
//!
//! A [`PollPolicy`] sets the pause between polls and, optionally, a
//! wall-clock deadline and/or a maximum number of polls. Running out of
//! either yields [`LinkError::StalledPeer`]. An unbounded policy polls
//! until the predicate holds or the session is cancelled.
//!
//! ## Cancellation
//!
//! A [`CancelToken`] is checked before every poll and between sleep slices,
//! so Ctrl+C is honored within [`CANCEL_SLICE`] even while a 5 second
//! connection poll is sleeping.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::LinkError;
use crate::transport::{PortBackend, RegisterPort};

/// Longest uninterrupted sleep between cancellation checks.
pub const CANCEL_SLICE: Duration = Duration::from_millis(50);

/// Shared cancellation flag, tripped from the Ctrl+C handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<(), LinkError> {
        if self.is_cancelled() {
            return Err(LinkError::Cancelled);
        }
        Ok(())
    }

    /// Sleep for `duration`, waking early if cancelled.
    ///
    /// A zero duration yields the thread instead of sleeping.
    pub fn sleep(&self, duration: Duration) -> Result<(), LinkError> {
        if duration.is_zero() {
            thread::yield_now();
            return self.check();
        }
        let end = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= end {
                return Ok(());
            }
            thread::sleep((end - now).min(CANCEL_SLICE));
        }
    }
}

/// Pacing and bounds for a status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Pause between two status reads
    pub interval: Duration,
    /// Give up once this much time has passed
    pub deadline: Option<Duration>,
    /// Give up after this many reads
    pub max_polls: Option<u64>,
}

impl PollPolicy {
    /// Poll forever at `interval`.
    pub const fn every(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
            max_polls: None,
        }
    }

    pub fn within(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn at_most(mut self, polls: Option<u64>) -> Self {
        self.max_polls = polls;
        self
    }

    fn exhausted(&self, polls: u64, waited: Duration) -> bool {
        self.max_polls.is_some_and(|max| polls >= max)
            || self.deadline.is_some_and(|limit| waited >= limit)
    }
}

/// Read status until `done` accepts it and return that snapshot.
pub fn poll_until<B, F>(
    port: &mut RegisterPort<B>,
    policy: &PollPolicy,
    cancel: &CancelToken,
    done: F,
) -> Result<u8, LinkError>
where
    B: PortBackend,
    F: FnMut(u8) -> bool,
{
    poll_until_with(port, policy, cancel, done, |_| {})
}

/// [`poll_until`], calling `on_miss` with the poll count after each
/// rejected snapshot (progress indicators hook in here).
pub fn poll_until_with<B, F, M>(
    port: &mut RegisterPort<B>,
    policy: &PollPolicy,
    cancel: &CancelToken,
    mut done: F,
    mut on_miss: M,
) -> Result<u8, LinkError>
where
    B: PortBackend,
    F: FnMut(u8) -> bool,
    M: FnMut(u64),
{
    let start = Instant::now();
    let mut polls = 0u64;
    loop {
        cancel.check()?;
        let status = port.read_status();
        polls += 1;
        if done(status) {
            return Ok(status);
        }
        on_miss(polls);

        let waited = start.elapsed();
        if policy.exhausted(polls, waited) {
            return Err(LinkError::StalledPeer { polls, waited });
        }
        cancel.sleep(policy.interval)?;
    }
}

/// Wait for `asserted` to hold, then for it to stop holding, and return the
/// snapshot that showed it released.
///
/// The first phase uses `idle` (typically unbounded: nobody has started
/// talking yet). The second uses `armed`, which bounds a peer that went
/// quiet mid-transfer.
pub fn poll_edge<B, F>(
    port: &mut RegisterPort<B>,
    idle: &PollPolicy,
    armed: &PollPolicy,
    cancel: &CancelToken,
    mut asserted: F,
) -> Result<u8, LinkError>
where
    B: PortBackend,
    F: FnMut(u8) -> bool,
{
    poll_until(port, idle, cancel, &mut asserted)?;
    poll_until(port, armed, cancel, |s| !asserted(s))
}

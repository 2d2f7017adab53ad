//! Heartbeat timing.
//!
//! The driver reads with a timeout of a quarter of the negotiated interval.
//! Each timeout counts as one missed quarter; more than two full intervals of
//! silence shut the connection down.

use std::{
    sync::atomic::{AtomicU16, AtomicU32, Ordering},
    time::Duration,
};

/// Read timeouts tolerated before the broker is declared dead.
pub(crate) const MAX_MISSED_INTERVALS: u32 = 2 * 4;

#[derive(Debug, Default)]
pub(crate) struct Heartbeat {
    interval_secs: AtomicU16,
    missed: AtomicU32,
}

impl Heartbeat {
    pub(crate) fn set_interval(&self, secs: u16) {
        self.interval_secs.store(secs, Ordering::Release);
        self.reset_missed();
    }

    pub(crate) fn disable(&self) { self.set_interval(0); }

    pub(crate) fn interval_secs(&self) -> u16 { self.interval_secs.load(Ordering::Acquire) }

    /// Negotiated interval; `None` when heartbeats are disabled.
    pub(crate) fn interval(&self) -> Option<Duration> {
        match self.interval_secs() {
            0 => None,
            secs => Some(Duration::from_secs(u64::from(secs))),
        }
    }

    pub(crate) fn read_timeout(&self) -> Option<Duration> { self.interval().map(|interval| interval / 4) }

    pub(crate) fn reset_missed(&self) { self.missed.store(0, Ordering::Release); }

    /// Count a read timeout; returns `true` once too many have passed.
    pub(crate) fn record_timeout(&self) -> bool {
        if self.interval_secs() == 0 {
            return false;
        }
        self.missed.fetch_add(1, Ordering::AcqRel) + 1 > MAX_MISSED_INTERVALS
    }
}

//! Hand-driven network clock

use std::sync::atomic::{AtomicU64, Ordering};

use raop_common::{ClockDelta, ClockInstant, NetworkClock};

/// Clock that only moves when told to
///
/// With a non-zero step every `now()` call advances the clock by that step
/// after reading it, which lets a pacing loop see time pass without sleeping.
pub struct ManualClock {
    raw: AtomicU64,
    step: AtomicU64,
}

impl ManualClock {
    /// Start at an arbitrary, comfortably non-zero instant
    pub fn new() -> Self {
        Self::starting_at(ClockInstant::from_raw(3_900_000_000u64 << 32))
    }

    pub fn starting_at(at: ClockInstant) -> Self {
        Self {
            raw: AtomicU64::new(at.raw()),
            step: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, delta: ClockDelta) {
        self.raw.fetch_add(delta.raw(), Ordering::SeqCst);
    }

    pub fn set_step(&self, step: ClockDelta) {
        self.step.store(step.raw(), Ordering::SeqCst);
    }

    /// Current time without stepping
    pub fn peek(&self) -> ClockInstant {
        ClockInstant::from_raw(self.raw.load(Ordering::SeqCst))
    }
}

impl NetworkClock for ManualClock {
    fn now(&self) -> ClockInstant {
        let step = self.step.load(Ordering::SeqCst);
        ClockInstant::from_raw(self.raw.fetch_add(step, Ordering::SeqCst))
    }
}

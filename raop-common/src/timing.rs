//! Network clock timing for frame-accurate playback scheduling
//!
//! The receiver and this client share a network clock expressed as a 64-bit
//! NTP-style fixed-point value: whole seconds since the NTP epoch in the high
//! 32 bits and the fractional second (scaled to 2^32) in the low 32 bits.
//!
//! # Architecture
//!
//! Three time representations are in play:
//!
//! 1. **Clock time**: [`ClockInstant`] / [`ClockDelta`] (fixed point, 2^-32 s)
//! 2. **Frames**: `u64` counts of audio frames at the negotiated sample rate
//! 3. **Milliseconds**: `u64` values used for logging and progress reporting
//!
//! ## Conversion Flow
//!
//! ```text
//! latency (frames) ──from_frames()──┐
//!                                   ├──> start_at = now + wait - latency
//! wait (ms) ─────────from_millis()──┘
//!
//! frames sent ──elapsed_millis()──> progress (ms)
//! ```
//!
//! # Precision
//!
//! All conversions truncate towards zero at the fixed-point boundary. The
//! millisecond conversion keeps 22 fractional bits, so a millisecond value
//! converted to clock time and back may lose up to 1 ms:
//!
//! ```rust
//! use raop_common::timing::ClockDelta;
//!
//! assert_eq!(ClockDelta::from_millis(1000).as_millis(), 1000);
//! assert_eq!(ClockDelta::from_millis(200).as_millis(), 199);
//! ```
//!
//! Arithmetic on [`ClockInstant`] wraps like unsigned 64-bit arithmetic.

use std::fmt;
use std::ops::{Add, Sub};
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// Constants
// ============================================================================

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch (1970-01-01)
pub const NTP_UNIX_EPOCH_OFFSET: u64 = 0x83AA_7E80;

/// Milliseconds per second
const MILLIS_PER_SECOND: u64 = 1000;

// ============================================================================
// Clock values
// ============================================================================

/// A point on the shared network clock
///
/// Opaque fixed-point value: seconds in the high word, fraction in the low
/// word. Always obtained from a [`NetworkClock`] or computed from one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ClockInstant(u64);

/// A span of network clock time on the same fixed-point scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ClockDelta(u64);

impl ClockInstant {
    /// Wrap a raw 64-bit NTP value
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw 64-bit NTP value
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whole seconds (high 32 bits)
    pub const fn seconds(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Fractional second scaled to 2^32 (low 32 bits)
    pub const fn fraction(self) -> u32 {
        self.0 as u32
    }

    /// Clock time elapsed since `earlier` (wrapping)
    pub const fn since(self, earlier: ClockInstant) -> ClockDelta {
        ClockDelta(self.0.wrapping_sub(earlier.0))
    }
}

impl fmt::Display for ClockInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.seconds(), self.fraction())
    }
}

impl Add<ClockDelta> for ClockInstant {
    type Output = ClockInstant;

    fn add(self, rhs: ClockDelta) -> ClockInstant {
        ClockInstant(self.0.wrapping_add(rhs.0))
    }
}

impl Sub<ClockDelta> for ClockInstant {
    type Output = ClockInstant;

    fn sub(self, rhs: ClockDelta) -> ClockInstant {
        ClockInstant(self.0.wrapping_sub(rhs.0))
    }
}

impl Sub<ClockInstant> for ClockInstant {
    type Output = ClockDelta;

    fn sub(self, rhs: ClockInstant) -> ClockDelta {
        self.since(rhs)
    }
}

impl ClockDelta {
    /// Zero-length span
    pub const ZERO: ClockDelta = ClockDelta(0);

    /// Wrap a raw fixed-point span
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw fixed-point value
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Convert milliseconds to clock time
    ///
    /// Formula: `((ms << 22) / 1000) << 10`
    ///
    /// ```rust
    /// use raop_common::timing::ClockDelta;
    ///
    /// assert_eq!(ClockDelta::from_millis(0).raw(), 0);
    /// assert_eq!(ClockDelta::from_millis(1000).raw(), 1 << 32);
    /// assert_eq!(ClockDelta::from_millis(200).raw(), 858_992_640);
    /// ```
    pub const fn from_millis(ms: u64) -> Self {
        Self(((ms << 22) / MILLIS_PER_SECOND) << 10)
    }

    /// Convert a frame count at `sample_rate` to clock time
    ///
    /// Formula: `((frames << 16) / sample_rate) << 16`. Returns zero for a
    /// zero sample rate.
    ///
    /// ```rust
    /// use raop_common::timing::ClockDelta;
    ///
    /// assert_eq!(ClockDelta::from_frames(44_100, 44_100).raw(), 1 << 32);
    /// assert_eq!(ClockDelta::from_frames(11_025, 44_100).raw(), 1 << 30);
    /// ```
    pub const fn from_frames(frames: u64, sample_rate: u32) -> Self {
        if sample_rate == 0 {
            return Self::ZERO;
        }
        Self(((frames << 16) / sample_rate as u64) << 16)
    }

    /// Convert clock time to milliseconds (truncating)
    ///
    /// Formula: `((raw >> 10) * 1000) >> 22`
    pub const fn as_millis(self) -> u64 {
        ((self.0 >> 10) * MILLIS_PER_SECOND) >> 22
    }

    /// Convert clock time to a frame count at `sample_rate` (truncating)
    ///
    /// Formula: `((raw >> 16) * sample_rate) >> 16`
    pub const fn as_frames(self, sample_rate: u32) -> u64 {
        ((self.0 >> 16) * sample_rate as u64) >> 16
    }
}

impl Add for ClockDelta {
    type Output = ClockDelta;

    fn add(self, rhs: ClockDelta) -> ClockDelta {
        ClockDelta(self.0.wrapping_add(rhs.0))
    }
}

// ============================================================================
// Frame / millisecond helpers
// ============================================================================

/// Convert frames to milliseconds through the clock representation
///
/// ```rust
/// use raop_common::timing::frames_to_millis;
///
/// assert_eq!(frames_to_millis(44_100, 44_100), 1000);
/// assert_eq!(frames_to_millis(11_025, 44_100), 250);
/// ```
pub const fn frames_to_millis(frames: u64, sample_rate: u32) -> u64 {
    ClockDelta::from_frames(frames, sample_rate).as_millis()
}

/// Convert milliseconds to a frame count: `ms * sample_rate / 1000`
///
/// ```rust
/// use raop_common::timing::millis_to_frames;
///
/// assert_eq!(millis_to_frames(1000, 44_100), 44_100);
/// assert_eq!(millis_to_frames(250, 44_100), 11_025);
/// ```
pub const fn millis_to_frames(ms: u64, sample_rate: u32) -> u64 {
    ms * sample_rate as u64 / MILLIS_PER_SECOND
}

/// Audible playback time in milliseconds
///
/// `(frame_count - latency_frames) * 1000 / sample_rate`, saturating at zero:
/// frames still sitting in the receiver's latency buffer have not been heard
/// yet, so they do not count as elapsed.
///
/// ```rust
/// use raop_common::timing::elapsed_millis;
///
/// assert_eq!(elapsed_millis(88_200, 44_100, 44_100), 1000);
/// assert_eq!(elapsed_millis(1_000, 44_100, 44_100), 0);
/// ```
pub const fn elapsed_millis(frame_count: u64, latency_frames: u64, sample_rate: u32) -> u64 {
    if sample_rate == 0 || frame_count <= latency_frames {
        return 0;
    }
    (frame_count - latency_frames).saturating_mul(MILLIS_PER_SECOND) / sample_rate as u64
}

// ============================================================================
// Clock sources
// ============================================================================

/// Source of network clock time
///
/// Implementations must be callable from several threads at once.
pub trait NetworkClock: Send + Sync {
    /// Current network clock time
    fn now(&self) -> ClockInstant;
}

/// Network clock derived from the host's system time
///
/// NTP seconds = Unix seconds + [`NTP_UNIX_EPOCH_OFFSET`]; the fraction is
/// the microsecond part scaled to 2^32.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNtpClock;

impl NetworkClock for SystemNtpClock {
    fn now(&self) -> ClockInstant {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let seconds = since_epoch.as_secs() + NTP_UNIX_EPOCH_OFFSET;
        let fraction = ((since_epoch.subsec_micros() as u64) << 32) / 1_000_000;
        ClockInstant((seconds << 32) | fraction)
    }
}

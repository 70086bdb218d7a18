//! Playback state machine
//!
//! [`PlaybackControl`] owns every `Playing`/`Paused`/`Stopped` transition.
//! Each transition runs with the shared state lock held so that the
//! dispatcher's pause+flush and the scheduler's guarded send never
//! interleave.
//!
//! ```text
//! Playing --Pause--> Paused --Play--> Playing
//!    |                 |
//!    +----Stop / end of source----> Stopped --Play--> Playing
//! ```
//!
//! The scheduler ends its loop once it observes `Stopped`; a later Play
//! still re-anchors the transport.

use std::sync::Arc;

use raop_common::{ClockDelta, ClockInstant};
use tracing::{debug, info, warn};

use crate::session::{Session, SessionError};
use crate::state::SharedState;

/// Delay between a Play command and the first resumed frame being scheduled
pub const RESUME_DELAY_MS: u64 = 200;

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Result of a requested transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied {
        from: PlaybackState,
        to: PlaybackState,
    },
    /// Request had no effect in the current state
    Ignored(PlaybackState),
}

/// Result of a guarded chunk send
#[derive(Debug)]
pub enum SendOutcome {
    /// Transport accepted the chunk; frames will be heard at this instant
    Sent(ClockInstant),
    /// State left `Playing` before the chunk went out; the chunk was not sent
    NotPlaying(PlaybackState),
    Failed(SessionError),
}

/// Instant at which playback should start so that the first frame is heard
/// `wait_ms` after `base`
///
/// The receiver delays everything by its latency, so the start instant is
/// pulled back by that amount. Wrapping arithmetic keeps this total for any
/// input.
///
/// ```rust
/// use raop_common::{ClockDelta, ClockInstant};
/// use raop_play::playback::compute_start_at;
///
/// let now = ClockInstant::from_raw(100 << 32);
/// let start = compute_start_at(now, 200, 44_100, 44_100);
/// assert_eq!(start, now + ClockDelta::from_millis(200) - ClockDelta::from_frames(44_100, 44_100));
/// ```
pub fn compute_start_at(
    base: ClockInstant,
    wait_ms: u64,
    latency_frames: u64,
    sample_rate: u32,
) -> ClockInstant {
    base + ClockDelta::from_millis(wait_ms) - ClockDelta::from_frames(latency_frames, sample_rate)
}

/// Serialized playback transitions against one session
pub struct PlaybackControl {
    state: Arc<SharedState>,
    session: Arc<dyn Session>,
    latency_frames: u64,
    sample_rate: u32,
}

impl PlaybackControl {
    /// Create control for a connected session
    ///
    /// Latency and sample rate are sampled once here; both are fixed for the
    /// lifetime of a session.
    pub fn new(state: Arc<SharedState>, session: Arc<dyn Session>) -> Self {
        let latency_frames = session.latency_frames();
        let sample_rate = session.sample_rate();
        Self {
            state,
            session,
            latency_frames,
            sample_rate,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state.playback_state()
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn latency_frames(&self) -> u64 {
        self.latency_frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Schedule the initial start of a session
    ///
    /// `start` is an absolute network time (defaults to now); the first frame
    /// is heard `wait_ms` after it.
    pub fn schedule_start(&self, start: Option<ClockInstant>, wait_ms: u64) -> ClockInstant {
        let _guard = self.state.lock_playback();
        let base = start.unwrap_or_else(|| self.session.now());
        let at = compute_start_at(base, wait_ms, self.latency_frames, self.sample_rate);
        self.session.start_at(at);
        info!(
            "Start scheduled at {} (now {}, wait {} ms)",
            at,
            self.session.now(),
            wait_ms
        );
        at
    }

    /// Playing -> Paused, with transport pause then flush
    pub fn pause(&self) -> TransitionOutcome {
        let mut guard = self.state.lock_playback();
        let from = *guard;
        if from != PlaybackState::Playing {
            warn!("Pause requested while {}; ignoring", from);
            return TransitionOutcome::Ignored(from);
        }

        self.session.pause();
        self.session.flush();
        *guard = PlaybackState::Paused;
        info!("Pause at: {}", self.session.now());
        TransitionOutcome::Applied {
            from,
            to: PlaybackState::Paused,
        }
    }

    /// Resume playback
    ///
    /// Playback is (re)anchored so the next frame is heard
    /// [`RESUME_DELAY_MS`] from now, whatever the current state. Issuing
    /// Play while already playing re-anchors as well.
    pub fn play(&self) -> ClockInstant {
        let mut guard = self.state.lock_playback();
        let from = *guard;

        let now = self.session.now();
        let at = compute_start_at(now, RESUME_DELAY_MS, self.latency_frames, self.sample_rate);
        self.session.start_at(at);
        *guard = PlaybackState::Playing;
        info!("Restarting at: {} (now {}, was {})", at, now, from);
        at
    }

    /// Any state -> Stopped, with transport stop
    pub fn stop(&self) -> TransitionOutcome {
        let mut guard = self.state.lock_playback();
        let from = *guard;
        if from == PlaybackState::Stopped {
            debug!("Stop requested while already stopped");
            return TransitionOutcome::Ignored(from);
        }

        self.session.stop();
        *guard = PlaybackState::Stopped;
        info!("Stopped playback");
        TransitionOutcome::Applied {
            from,
            to: PlaybackState::Stopped,
        }
    }

    /// Source exhausted and receiver drained: -> Stopped without transport stop
    pub fn finish(&self) -> TransitionOutcome {
        let mut guard = self.state.lock_playback();
        let from = *guard;
        if from == PlaybackState::Stopped {
            return TransitionOutcome::Ignored(from);
        }
        *guard = PlaybackState::Stopped;
        info!("End of stream reached");
        TransitionOutcome::Applied {
            from,
            to: PlaybackState::Stopped,
        }
    }

    /// Send a chunk only if still `Playing`, under the transition lock
    ///
    /// Accepted frames are added to the shared frame counter.
    pub fn send_if_playing(&self, data: &[u8], frames: u64) -> SendOutcome {
        let guard = self.state.lock_playback();
        if *guard != PlaybackState::Playing {
            return SendOutcome::NotPlaying(*guard);
        }

        match self.session.send_chunk(data, frames) {
            Ok(at) => {
                self.state.add_frames(frames);
                SendOutcome::Sent(at)
            }
            Err(e) => SendOutcome::Failed(e),
        }
    }
}

//! Shared session state
//!
//! Thread-safe state shared by the playback scheduler and the command
//! dispatcher. One `Arc<SharedState>` is created per session and handed to
//! both workers at construction.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub use crate::playback::PlaybackState;

/// Shared state accessible by all session workers
///
/// The playback state sits behind a `Mutex` because transitions pair a state
/// change with transport calls that must not interleave (pause+flush vs.
/// start-at). Counters are lock-free.
pub struct SharedState {
    /// Current playback state
    playback_state: Mutex<PlaybackState>,

    /// Cooperative process shutdown flag
    shutdown: AtomicBool,

    /// Frames accepted by the transport so far
    frames_sent: AtomicU64,

    /// Audible playback time, refreshed once per second by the scheduler
    elapsed_ms: AtomicU64,
}

impl SharedState {
    /// Create new shared state; sessions start out `Playing`
    pub fn new() -> Self {
        Self {
            playback_state: Mutex::new(PlaybackState::Playing),
            shutdown: AtomicBool::new(false),
            frames_sent: AtomicU64::new(0),
            elapsed_ms: AtomicU64::new(0),
        }
    }

    /// Get current playback state
    pub fn playback_state(&self) -> PlaybackState {
        *self.lock_playback()
    }

    /// Lock the playback state for a transition or a guarded send
    ///
    /// The state is a plain `Copy` value, so a poisoned lock still holds a
    /// consistent value and is recovered.
    pub fn lock_playback(&self) -> MutexGuard<'_, PlaybackState> {
        self.playback_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask every worker to wind down
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Frames accepted by the transport so far
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Acquire)
    }

    /// Record frames accepted by the transport
    pub fn add_frames(&self, frames: u64) {
        self.frames_sent.fetch_add(frames, Ordering::AcqRel);
    }

    /// Last published audible playback time
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms.load(Ordering::Relaxed)
    }

    pub fn set_elapsed_ms(&self, elapsed_ms: u64) {
        self.elapsed_ms.store(elapsed_ms, Ordering::Relaxed);
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

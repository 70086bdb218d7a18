//! In-process receiver model
//!
//! [`LocalReceiver`] behaves like a receiver at the facade boundary without
//! any network traffic: it keeps a playout queue, drains it against the
//! network clock, applies back-pressure once the queue holds more than the
//! latency window, and honours pause/flush/start-at. It lets the whole
//! streaming core run end-to-end (dry runs, demos) and is the transport the
//! binary wires in until a real RAOP stack implements [`Session`].

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use raop_common::{ClockDelta, ClockInstant, NetworkClock, TrackMetadata};
use tracing::{debug, info};

use super::{ConnectOptions, Session, SessionError, MUTE_DB};

/// Output latency a typical receiver reports on top of the client's latency
pub const RECEIVER_AUDIO_LATENCY_FRAMES: u64 = 11_025;

/// Frame index `frame` starts sounding at `at`
#[derive(Debug, Clone, Copy)]
struct Anchor {
    at: ClockInstant,
    frame: u64,
}

#[derive(Debug)]
struct ReceiverState {
    peer: Option<SocketAddr>,
    /// Frames received so far (queue head)
    received: u64,
    /// Frames rendered or discarded before the current anchor
    consumed: u64,
    anchor: Option<Anchor>,
    volume_db: f32,
    keepalives: u64,
}

/// Receiver model implementing [`Session`]
pub struct LocalReceiver {
    clock: Arc<dyn NetworkClock>,
    options: ConnectOptions,
    state: Mutex<ReceiverState>,
}

impl LocalReceiver {
    pub fn new(clock: Arc<dyn NetworkClock>, options: ConnectOptions) -> Self {
        let volume_db = options.volume_db;
        Self {
            clock,
            options,
            state: Mutex::new(ReceiverState {
                peer: None,
                received: 0,
                consumed: 0,
                anchor: None,
                volume_db,
                keepalives: 0,
            }),
        }
    }

    /// Frames queued but not yet rendered
    pub fn queued_frames(&self) -> u64 {
        let state = self.lock();
        state.received - self.played(&state, self.clock.now())
    }

    /// Current volume in dB
    pub fn volume_db(&self) -> f32 {
        self.lock().volume_db
    }

    /// Number of keepalives received
    pub fn keepalives(&self) -> u64 {
        self.lock().keepalives
    }

    fn lock(&self) -> MutexGuard<'_, ReceiverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn latency_delta(&self) -> ClockDelta {
        ClockDelta::from_frames(self.latency_frames(), self.options.sample_rate)
    }

    /// Frames rendered (or discarded) by `now`
    fn played(&self, state: &ReceiverState, now: ClockInstant) -> u64 {
        match state.anchor {
            None => state.consumed,
            Some(anchor) if now < anchor.at => anchor.frame,
            Some(anchor) => {
                let rendered = now.since(anchor.at).as_frames(self.options.sample_rate);
                (anchor.frame + rendered).min(state.received)
            }
        }
    }

    /// Freeze the playout point at `now`
    fn halt(&self, state: &mut ReceiverState, now: ClockInstant) {
        state.consumed = self.played(state, now);
        state.anchor = None;
    }
}

impl Session for LocalReceiver {
    fn connect(&self, addr: IpAddr, port: u16, apply_volume_now: bool) -> Result<(), SessionError> {
        if port == 0 || addr.is_unspecified() {
            return Err(SessionError::Connect {
                addr,
                port,
                reason: "no receiver at this address".to_string(),
            });
        }

        let mut state = self.lock();
        state.peer = Some(SocketAddr::new(addr, port));
        info!(
            "Session established with {}:{} (codec {:?}, crypto {:?}, auth {})",
            addr, port, self.options.codec, self.options.crypto, self.options.auth
        );
        if apply_volume_now {
            info!("Initial volume {:.1} dB", state.volume_db);
        } else {
            state.volume_db = MUTE_DB;
        }
        Ok(())
    }

    fn latency_frames(&self) -> u64 {
        self.options.latency_frames + RECEIVER_AUDIO_LATENCY_FRAMES
    }

    fn sample_rate(&self) -> u32 {
        self.options.sample_rate
    }

    fn accepts_more_frames(&self) -> bool {
        let state = self.lock();
        if state.peer.is_none() {
            return false;
        }
        let queued = state.received - self.played(&state, self.clock.now());
        queued < self.latency_frames() + self.options.frames_per_chunk as u64
    }

    fn send_chunk(&self, data: &[u8], frames: u64) -> Result<ClockInstant, SessionError> {
        let now = self.clock.now();
        let mut state = self.lock();
        if state.peer.is_none() {
            return Err(SessionError::NotConnected);
        }

        let anchor = match state.anchor {
            Some(anchor) => anchor,
            None => {
                let anchor = Anchor {
                    at: now + self.latency_delta(),
                    frame: state.received,
                };
                debug!("Playout anchored at {} (frame {})", anchor.at, anchor.frame);
                state.anchor = Some(anchor);
                anchor
            }
        };

        let offset = state.received.saturating_sub(anchor.frame);
        let play_at = anchor.at + ClockDelta::from_frames(offset, self.options.sample_rate);
        state.received += frames;
        debug!("Queued {} frames ({} bytes), heard at {}", frames, data.len(), play_at);
        Ok(play_at)
    }

    fn start_at(&self, at: ClockInstant) {
        let now = self.clock.now();
        let mut state = self.lock();
        self.halt(&mut state, now);
        // Frames still queued are rendered first
        let anchor = Anchor {
            at: at + self.latency_delta(),
            frame: state.consumed,
        };
        state.anchor = Some(anchor);
        info!("Rendering resumes at {} (frame {})", anchor.at, anchor.frame);
    }

    fn pause(&self) {
        let now = self.clock.now();
        let mut state = self.lock();
        self.halt(&mut state, now);
        info!("Paused at frame {}", state.consumed);
    }

    fn flush(&self) {
        let now = self.clock.now();
        let mut state = self.lock();
        let played = self.played(&state, now);
        let dropped = state.received - played;
        state.received = played;
        state.consumed = played;
        // Data sent after a flush is anchored afresh one latency window out
        state.anchor = None;
        debug!("Flushed {} queued frames", dropped);
    }

    fn stop(&self) {
        self.pause();
        self.flush();
        info!("Stream stopped");
    }

    fn is_playing(&self) -> bool {
        let state = self.lock();
        state.anchor.is_some() && self.played(&state, self.clock.now()) < state.received
    }

    fn set_volume(&self, db: f32) {
        self.lock().volume_db = db;
        info!("Volume set to {:.1} dB", db);
    }

    fn set_progress(&self, elapsed_ms: u64, duration_ms: u64) {
        info!("Progress {} / {} ms", elapsed_ms, duration_ms);
    }

    fn set_metadata(&self, metadata: &TrackMetadata) {
        // DAAP tags: minm (title), asar (artist), asal (album), astn (track number)
        info!(
            "Metadata minm={:?} asar={:?} asal={:?} astn=1",
            metadata.title, metadata.artist, metadata.album
        );
    }

    fn set_artwork(&self, content_type: &str, data: &[u8]) {
        info!("Artwork {} ({} bytes)", content_type, data.len());
    }

    fn keepalive(&self) {
        let mut state = self.lock();
        state.keepalives += 1;
        debug!("Keepalive #{}", state.keepalives);
    }

    fn now(&self) -> ClockInstant {
        self.clock.now()
    }

    fn disconnect(&self) {
        let mut state = self.lock();
        if let Some(peer) = state.peer.take() {
            info!("Disconnected from {}", peer);
        }
        state.anchor = None;
        state.consumed = state.received;
    }
}

//! Recording session facade

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use raop_common::{ClockDelta, ClockInstant, NetworkClock, TrackMetadata};
use raop_play::artwork::{ArtworkBlob, ArtworkError, ArtworkFetcher};
use raop_play::session::{Session, SessionError, DEFAULT_SAMPLE_RATE};

use super::ManualClock;

/// One recorded facade call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect { addr: IpAddr, port: u16 },
    SendChunk { bytes: usize, frames: u64 },
    StartAt(ClockInstant),
    Pause,
    Flush,
    Stop,
    SetVolume(f32),
    SetProgress { elapsed_ms: u64, duration_ms: u64 },
    SetMetadata(TrackMetadata),
    SetArtwork { content_type: String, len: usize },
    Keepalive,
    Disconnect,
}

/// `Session` that records calls and answers from scripted knobs
pub struct RecordingSession {
    clock: Arc<ManualClock>,
    latency_frames: u64,
    calls: Mutex<Vec<Call>>,
    accepts: AtomicBool,
    /// `is_playing` answers true this many more times
    playing_polls: AtomicU64,
    fail_sends: AtomicBool,
}

impl RecordingSession {
    /// Session with one second of latency that always accepts frames
    pub fn new() -> Self {
        Self::with_latency(DEFAULT_SAMPLE_RATE as u64)
    }

    pub fn with_latency(latency_frames: u64) -> Self {
        Self {
            clock: Arc::new(ManualClock::new()),
            latency_frames,
            calls: Mutex::new(Vec::new()),
            accepts: AtomicBool::new(true),
            playing_polls: AtomicU64::new(0),
            fail_sends: AtomicBool::new(false),
        }
    }

    pub fn clock(&self) -> &Arc<ManualClock> {
        &self.clock
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than chunk sends and keepalives
    pub fn control_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::SendChunk { .. } | Call::Keepalive))
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn set_accepts(&self, accepts: bool) {
        self.accepts.store(accepts, Ordering::SeqCst);
    }

    pub fn set_playing_polls(&self, polls: u64) {
        self.playing_polls.store(polls, Ordering::SeqCst);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Session for RecordingSession {
    fn connect(&self, addr: IpAddr, port: u16, _apply_volume_now: bool) -> Result<(), SessionError> {
        self.record(Call::Connect { addr, port });
        Ok(())
    }

    fn latency_frames(&self) -> u64 {
        self.latency_frames
    }

    fn sample_rate(&self) -> u32 {
        DEFAULT_SAMPLE_RATE
    }

    fn accepts_more_frames(&self) -> bool {
        self.accepts.load(Ordering::SeqCst)
    }

    fn send_chunk(&self, data: &[u8], frames: u64) -> Result<ClockInstant, SessionError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SessionError::Send("scripted failure".to_string()));
        }
        self.record(Call::SendChunk {
            bytes: data.len(),
            frames,
        });
        Ok(self.clock.peek() + ClockDelta::from_frames(self.latency_frames, DEFAULT_SAMPLE_RATE))
    }

    fn start_at(&self, at: ClockInstant) {
        self.record(Call::StartAt(at));
    }

    fn pause(&self) {
        self.record(Call::Pause);
    }

    fn flush(&self) {
        self.record(Call::Flush);
    }

    fn stop(&self) {
        self.record(Call::Stop);
    }

    fn is_playing(&self) -> bool {
        self.playing_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn set_volume(&self, db: f32) {
        self.record(Call::SetVolume(db));
    }

    fn set_progress(&self, elapsed_ms: u64, duration_ms: u64) {
        self.record(Call::SetProgress {
            elapsed_ms,
            duration_ms,
        });
    }

    fn set_metadata(&self, metadata: &TrackMetadata) {
        self.record(Call::SetMetadata(metadata.clone()));
    }

    fn set_artwork(&self, content_type: &str, data: &[u8]) {
        self.record(Call::SetArtwork {
            content_type: content_type.to_string(),
            len: data.len(),
        });
    }

    fn keepalive(&self) {
        self.record(Call::Keepalive);
    }

    fn now(&self) -> ClockInstant {
        self.clock.now()
    }

    fn disconnect(&self) {
        self.record(Call::Disconnect);
    }
}

/// Artwork fetcher with a canned result
pub struct StubFetcher {
    result: Result<ArtworkBlob, String>,
}

impl StubFetcher {
    pub fn failing() -> Self {
        Self {
            result: Err("connection refused".to_string()),
        }
    }

    pub fn returning(content_type: &str, data: &[u8]) -> Self {
        Self {
            result: Ok(ArtworkBlob {
                content_type: content_type.to_string(),
                data: data.to_vec(),
            }),
        }
    }
}

impl ArtworkFetcher for StubFetcher {
    fn fetch(&self, url: &str) -> Result<ArtworkBlob, ArtworkError> {
        self.result.clone().map_err(|reason| ArtworkError::FetchFailed {
            url: url.to_string(),
            reason,
        })
    }
}

//! Test helper modules for raop-play integration tests
//!
//! Provides reusable test infrastructure components:
//! - ManualClock: network clock moved by hand (or by a fixed step per read)
//! - RecordingSession: `Session` that records every call in order
//! - StubFetcher: artwork fetcher with a canned result

#![allow(dead_code)]

pub mod manual_clock;
pub mod recording_session;

pub use manual_clock::ManualClock;
pub use recording_session::{Call, RecordingSession, StubFetcher};

use std::sync::Arc;

use raop_play::artwork::ArtworkAcquirer;
use raop_play::playback::PlaybackControl;
use raop_play::session::Session;
use raop_play::SharedState;

/// Session, shared state and control wired together
pub struct Harness {
    pub session: Arc<RecordingSession>,
    pub state: Arc<SharedState>,
    pub control: Arc<PlaybackControl>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_session(RecordingSession::new())
    }

    pub fn with_session(session: RecordingSession) -> Self {
        let session = Arc::new(session);
        let state = Arc::new(SharedState::new());
        let dyn_session: Arc<dyn Session> = session.clone();
        let control = Arc::new(PlaybackControl::new(state.clone(), dyn_session));
        Self {
            session,
            state,
            control,
        }
    }

    pub fn dyn_session(&self) -> Arc<dyn Session> {
        self.session.clone()
    }

    /// Artwork acquirer whose remote fetches always fail
    pub fn failing_artwork(&self) -> ArtworkAcquirer {
        ArtworkAcquirer::new(Arc::new(StubFetcher::failing()), self.state.clone())
    }
}

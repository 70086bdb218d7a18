//! Command dispatcher
//!
//! Applies parsed command batches to the playback state machine, the
//! accumulated track metadata and the session. Runs on its own thread,
//! polling the command channel so that it notices shutdown within one poll
//! interval.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use raop_common::metadata::seconds_from_int;
use raop_common::protocol::parse_int_or_zero;
use raop_common::{ActionKind, Command, TrackMetadata};
use tracing::{debug, error, info, warn};

use crate::artwork::ArtworkAcquirer;
use crate::playback::PlaybackControl;
use crate::session::{volume_to_db, Session};

/// How long the worker waits for a batch before re-checking shutdown
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Whether the dispatcher keeps serving commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchFlow {
    Continue,
    /// A Stop was applied; nothing more will play
    Terminate,
}

/// Applies commands for one session
pub struct CommandDispatcher {
    control: Arc<PlaybackControl>,
    session: Arc<dyn Session>,
    artwork: ArtworkAcquirer,
    metadata: TrackMetadata,
}

impl CommandDispatcher {
    pub fn new(
        control: Arc<PlaybackControl>,
        session: Arc<dyn Session>,
        artwork: ArtworkAcquirer,
    ) -> Self {
        Self {
            control,
            session,
            artwork,
            metadata: TrackMetadata::new(),
        }
    }

    /// Metadata accumulated so far
    pub fn metadata(&self) -> &TrackMetadata {
        &self.metadata
    }

    /// Apply one batch in order
    ///
    /// Once a Stop has been applied the rest of the batch is still processed
    /// for field updates, but further playback actions are dropped.
    pub fn apply_batch(&mut self, batch: Vec<Command>) -> DispatchFlow {
        let mut flow = DispatchFlow::Continue;
        for command in batch {
            match command {
                Command::Action(kind) if flow == DispatchFlow::Terminate && kind != ActionKind::SendMeta => {
                    debug!("Ignoring {} after stop", kind);
                }
                command => {
                    if self.apply(command) == DispatchFlow::Terminate {
                        flow = DispatchFlow::Terminate;
                    }
                }
            }
        }
        flow
    }

    /// Apply a single command
    pub fn apply(&mut self, command: Command) -> DispatchFlow {
        match command {
            Command::Action(kind) => self.apply_action(kind),
            Command::SetField(key, value) => {
                self.apply_field(&key, value);
                DispatchFlow::Continue
            }
        }
    }

    fn apply_action(&mut self, kind: ActionKind) -> DispatchFlow {
        match kind {
            ActionKind::Pause => {
                self.control.pause();
            }
            ActionKind::Play => {
                self.control.play();
            }
            ActionKind::Stop => {
                self.control.stop();
                return DispatchFlow::Terminate;
            }
            ActionKind::SendMeta => {
                info!(
                    "Sending metadata: title={:?} artist={:?} album={:?}",
                    self.metadata.title, self.metadata.artist, self.metadata.album
                );
                self.session.set_metadata(&self.metadata);
            }
        }
        DispatchFlow::Continue
    }

    fn apply_field(&mut self, key: &str, value: String) {
        match key {
            "TITLE" => self.metadata.title = value,
            "ARTIST" => self.metadata.artist = value,
            "ALBUM" => self.metadata.album = value,
            "DURATION" => {
                self.metadata.duration_seconds = seconds_from_int(parse_int_or_zero(&value));
            }
            "PROGRESS" => {
                self.metadata.progress_seconds = seconds_from_int(parse_int_or_zero(&value));
                self.session
                    .set_progress(self.metadata.progress_ms(), self.metadata.duration_ms());
            }
            "VOLUME" => {
                let volume = parse_int_or_zero(&value).clamp(0, 100);
                info!("Setting volume to: {}", volume);
                self.session.set_volume(volume_to_db(volume));
            }
            "ARTWORK" => match self.artwork.acquire(&value) {
                Ok(blob) => {
                    info!("Sending artwork ({}, {} bytes)", blob.content_type, blob.data.len());
                    self.session.set_artwork(&blob.content_type, &blob.data);
                }
                Err(e) => warn!("Unable to process artwork {}: {}", value, e),
            },
            _ => debug!("Ignoring unknown command {}={}", key, value),
        }
    }

    /// Serve batches from `batches` on a dedicated thread
    pub fn spawn(self, batches: Receiver<Vec<Command>>) -> DispatcherHandle {
        let thread = thread::spawn(move || self.worker_loop(batches));
        info!("Command dispatcher started");
        DispatcherHandle {
            thread: Some(thread),
        }
    }

    fn worker_loop(mut self, batches: Receiver<Vec<Command>>) -> TrackMetadata {
        let shared = Arc::clone(self.control.shared());
        loop {
            if shared.is_shutdown() {
                debug!("Dispatcher observed shutdown");
                break;
            }

            match batches.recv_timeout(POLL_INTERVAL) {
                Ok(batch) => {
                    if self.apply_batch(batch) == DispatchFlow::Terminate {
                        info!("Dispatcher stopping after stop command");
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Command channel closed");
                    break;
                }
            }
        }
        self.metadata
    }
}

/// Handle to a running dispatcher thread
pub struct DispatcherHandle {
    thread: Option<JoinHandle<TrackMetadata>>,
}

impl DispatcherHandle {
    /// Wait for the dispatcher to exit; returns the final metadata
    ///
    /// The worker only exits on shutdown, Stop or a closed channel, so request
    /// shutdown first.
    pub fn join(mut self) -> Option<TrackMetadata> {
        let handle = self.thread.take()?;
        match handle.join() {
            Ok(metadata) => {
                debug!("Dispatcher joined");
                Some(metadata)
            }
            Err(e) => {
                error!("Dispatcher thread panicked: {:?}", e);
                None
            }
        }
    }
}

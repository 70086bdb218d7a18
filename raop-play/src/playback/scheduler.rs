//! Playback pacing loop
//!
//! Reads PCM from an [`AudioSource`] in fixed-size chunks and feeds the
//! session whenever it reports room for more frames. Once per second it
//! publishes the audible elapsed time; every sixteenth of those ticks it
//! sends a keepalive. The loop ends when playback is stopped or when the
//! source is exhausted and the receiver has drained.
//!
//! The loop is blocking by nature (it polls the transport and sleeps
//! between polls) and is meant to run on a dedicated thread, e.g. through
//! `tokio::task::spawn_blocking`. [`await_scheduler`] bounds the wait for
//! such a task, since a read of an idle source never returns to observe a stop.

use std::sync::Arc;
use std::time::Duration;

use raop_common::timing::elapsed_millis;
use raop_common::{ClockDelta, ClockInstant};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use super::source::{AudioSource, SourceRead};
use super::state::{PlaybackControl, PlaybackState, SendOutcome};
use crate::session::{Session, BYTES_PER_FRAME, DEFAULT_FRAMES_PER_CHUNK};

// ========================================
// Configuration
// ========================================

/// Pacing parameters
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Frames per chunk handed to the transport
    pub chunk_frames: u32,
    pub bytes_per_frame: usize,
    /// Sleep when nothing was sent in a pass
    pub idle_sleep: Duration,
    /// Minimum time between periodic ticks
    pub tick_interval: ClockDelta,
    /// A keepalive goes out on every Nth periodic tick, starting with the first
    pub keepalive_every: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            chunk_frames: DEFAULT_FRAMES_PER_CHUNK,
            bytes_per_frame: BYTES_PER_FRAME,
            idle_sleep: Duration::from_millis(1),
            tick_interval: ClockDelta::from_millis(1_000),
            keepalive_every: 16,
        }
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerReport {
    pub frames_sent: u64,
    pub final_state: PlaybackState,
    pub periodic_ticks: u64,
}

/// How long shutdown waits for the scheduler after a stop
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Wait up to `grace` for a scheduler task
///
/// Returns `Ok(None)` when the task is still running after `grace`; the
/// task is then detached and left to the runtime's shutdown timeout.
pub async fn await_scheduler(
    task: JoinHandle<SchedulerReport>,
    grace: Duration,
) -> Result<Option<SchedulerReport>, JoinError> {
    match tokio::time::timeout(grace, task).await {
        Ok(joined) => joined.map(Some),
        Err(_) => {
            warn!(
                "Scheduler still blocked after {} ms, abandoning it",
                grace.as_millis()
            );
            Ok(None)
        }
    }
}

// ========================================
// Scheduler
// ========================================

/// Chunk read from the source but not yet accepted by the transport
#[derive(Debug, Clone, Copy)]
struct PendingChunk {
    bytes: usize,
    frames: u64,
}

/// Pacing loop for one session
pub struct PlaybackScheduler<S> {
    control: Arc<PlaybackControl>,
    session: Arc<dyn Session>,
    source: S,
    config: SchedulerConfig,
}

impl<S: AudioSource> PlaybackScheduler<S> {
    pub fn new(
        control: Arc<PlaybackControl>,
        session: Arc<dyn Session>,
        source: S,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            control,
            session,
            source,
            config,
        }
    }

    /// Run until stopped or drained
    pub fn run(mut self) -> SchedulerReport {
        let chunk_bytes = self.config.chunk_frames as usize * self.config.bytes_per_frame;
        let mut buf = vec![0u8; chunk_bytes];
        let mut pending: Option<PendingChunk> = None;
        let mut exhausted = false;
        let mut last_tick: Option<ClockInstant> = None;
        let mut ticks: u64 = 0;

        info!(
            "Scheduler started: {} frames per chunk, latency {} frames",
            self.config.chunk_frames,
            self.control.latency_frames()
        );

        loop {
            if self.control.state() == PlaybackState::Stopped {
                break;
            }

            let now = self.session.now();
            let due = match last_tick {
                None => true,
                Some(last) => now.since(last) > self.config.tick_interval,
            };
            if due {
                last_tick = Some(now);
                self.periodic_tick(ticks);
                ticks += 1;
            }

            let mut sent = false;
            if !exhausted
                && self.control.state() == PlaybackState::Playing
                && self.session.accepts_more_frames()
            {
                if pending.is_none() {
                    match self.source.read_chunk(&mut buf) {
                        SourceRead::Data(bytes) => {
                            pending = Some(PendingChunk {
                                bytes,
                                frames: (bytes / self.config.bytes_per_frame) as u64,
                            });
                        }
                        SourceRead::Empty => {}
                        SourceRead::Exhausted => {
                            debug!("Audio source exhausted");
                            exhausted = true;
                        }
                    }
                }

                if let Some(chunk) = pending {
                    match self.control.send_if_playing(&buf[..chunk.bytes], chunk.frames) {
                        SendOutcome::Sent(_) => {
                            pending = None;
                            sent = true;
                        }
                        SendOutcome::NotPlaying(state) => {
                            // Kept for when playback resumes
                            debug!("Holding chunk of {} frames while {}", chunk.frames, state);
                        }
                        SendOutcome::Failed(e) => {
                            warn!("Dropping chunk of {} frames: {}", chunk.frames, e);
                            pending = None;
                        }
                    }
                }
            }

            if exhausted && pending.is_none() && !self.session.is_playing() {
                self.control.finish();
                break;
            }

            if !sent {
                std::thread::sleep(self.config.idle_sleep);
            }
        }

        let report = SchedulerReport {
            frames_sent: self.control.shared().frames_sent(),
            final_state: self.control.state(),
            periodic_ticks: ticks,
        };
        info!(
            "Scheduler finished: {} frames sent, {} ms played",
            report.frames_sent,
            self.control.shared().elapsed_ms()
        );
        report
    }

    /// Publish elapsed time; send keepalive on every Nth tick
    fn periodic_tick(&self, index: u64) {
        let shared = self.control.shared();
        let frames = shared.frames_sent();
        let latency = self.control.latency_frames();
        let elapsed = elapsed_millis(frames, latency, self.control.sample_rate());
        shared.set_elapsed_ms(elapsed);

        if frames > latency {
            info!("elapsed milliseconds: {}", elapsed);
        }

        if self.config.keepalive_every > 0 && index % self.config.keepalive_every == 0 {
            debug!("Sending keepalive at {}", self.session.now());
            self.session.keepalive();
        }
    }
}

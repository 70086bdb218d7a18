//! Playback state machine and pacing loop

pub mod scheduler;
pub mod source;
pub mod state;

pub use scheduler::{
    await_scheduler, PlaybackScheduler, SchedulerConfig, SchedulerReport, SHUTDOWN_GRACE,
};
pub use source::{open_source, AudioSource, ReaderSource, SourceRead};
pub use state::{compute_start_at, PlaybackControl, PlaybackState, SendOutcome, TransitionOutcome};

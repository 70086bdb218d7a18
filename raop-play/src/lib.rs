//! # RAOP Player Library (raop-play)
//!
//! Streaming core of a command-line AirPlay (RAOP) audio sender.
//!
//! **Purpose:** Pace raw PCM from a file or stdin into a receiver session at
//! real-time rate, while a line-oriented command pipe pauses, resumes and
//! stops playback and pushes metadata, progress, volume and artwork.
//!
//! **Architecture:** A blocking pacing loop ([`playback::PlaybackScheduler`])
//! and a command worker ([`control::CommandDispatcher`]) share one
//! [`SharedState`] and one [`session::Session`]; every playback transition
//! goes through [`playback::PlaybackControl`].

pub mod artwork;
pub mod config;
pub mod control;
pub mod error;
pub mod playback;
pub mod session;
pub mod state;

pub use error::{Error, Result};
pub use state::SharedState;

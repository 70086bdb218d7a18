//! # RAOP Common Library
//!
//! Shared code for the raop-play streamer:
//! - Network clock representation and conversions
//! - Command protocol parsing (`KEY=VALUE` lines)
//! - Track metadata model
//! - Configuration file resolution
//! - Error types

pub mod config;
pub mod error;
pub mod metadata;
pub mod protocol;
pub mod timing;

pub use error::{Error, Result};
pub use metadata::TrackMetadata;
pub use protocol::{ActionKind, Command};
pub use timing::{ClockDelta, ClockInstant, NetworkClock, SystemNtpClock};

//! Session facade
//!
//! The narrow interface the scheduler and dispatcher use against the
//! transport that actually talks to the receiver. Connection setup,
//! encryption, packetization and clock synchronization all live behind
//! [`Session`]; this crate only paces data and forwards control.
//!
//! All methods take `&self`: implementations synchronize internally so that
//! the scheduler thread and the dispatcher thread can share one
//! `Arc<dyn Session>`.

mod local;

pub use local::{LocalReceiver, RECEIVER_AUDIO_LATENCY_FRAMES};

use std::net::IpAddr;

use raop_common::{ClockInstant, TrackMetadata};
use thiserror::Error;

/// Frames handed to the transport per chunk
pub const DEFAULT_FRAMES_PER_CHUNK: u32 = 352;

/// Negotiated stream sample rate (Hz)
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Bytes per frame for 16-bit stereo PCM
pub const BYTES_PER_FRAME: usize = 4;

/// Attenuation used for "muted" / "volume not set"
pub const MUTE_DB: f32 = -144.0;

/// Quietest audible volume step, in dB
const MIN_VOLUME_DB: f32 = -30.0;

/// Session facade errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Cannot connect to {addr}:{port}: {reason}")]
    Connect {
        addr: IpAddr,
        port: u16,
        reason: String,
    },

    #[error("Session is not connected")]
    NotConnected,

    #[error("Send failed: {0}")]
    Send(String),
}

/// Audio payload codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// ALAC-compressed frames
    Alac,
    /// Raw PCM wrapped in uncompressed ALAC frames
    AlacRaw,
}

/// Audio payload encryption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crypto {
    Clear,
    Rsa,
}

/// Everything the transport needs to set up a session
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub codec: Codec,
    pub crypto: Crypto,
    pub auth: bool,
    pub dacp_id: String,
    pub active_remote: String,
    /// mDNS `et` value (encryption types)
    pub et: String,
    /// mDNS `md` value (metadata capabilities)
    pub md: String,
    /// mDNS `am` value (model name)
    pub am: String,
    /// mDNS `pk` value (pairing key info)
    pub pk: String,
    pub secret: Option<String>,
    pub password: Option<Vec<u8>>,
    pub frames_per_chunk: u32,
    /// Client-side latency in frames, before the receiver adds its own
    pub latency_frames: u64,
    pub sample_rate: u32,
    pub sample_size: u16,
    pub channels: u16,
    /// Initial volume in dB ([`MUTE_DB`] when not set)
    pub volume_db: f32,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            codec: Codec::AlacRaw,
            crypto: Crypto::Clear,
            auth: false,
            dacp_id: String::new(),
            active_remote: String::new(),
            et: String::new(),
            md: String::new(),
            am: String::new(),
            pk: String::new(),
            secret: None,
            password: None,
            frames_per_chunk: DEFAULT_FRAMES_PER_CHUNK,
            latency_frames: DEFAULT_SAMPLE_RATE as u64,
            sample_rate: DEFAULT_SAMPLE_RATE,
            sample_size: 16,
            channels: 2,
            volume_db: MUTE_DB,
        }
    }
}

/// Transport contract consumed by the playback core
pub trait Session: Send + Sync {
    /// Connect to the receiver; `apply_volume_now` pushes the initial volume
    fn connect(&self, addr: IpAddr, port: u16, apply_volume_now: bool) -> Result<(), SessionError>;

    /// Total output latency (client + receiver) in frames
    fn latency_frames(&self) -> u64;

    /// Negotiated sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// True when the receiver buffer has room for another chunk
    fn accepts_more_frames(&self) -> bool;

    /// Queue `frames` frames of payload; returns the instant they will be heard
    fn send_chunk(&self, data: &[u8], frames: u64) -> Result<ClockInstant, SessionError>;

    /// Resume rendering so that the next frame starts at `at`
    fn start_at(&self, at: ClockInstant);

    fn pause(&self);

    /// Drop frames queued but not yet rendered
    fn flush(&self);

    fn stop(&self);

    /// True while queued frames are still being rendered
    fn is_playing(&self) -> bool;

    /// Set volume in dB (see [`volume_to_db`])
    fn set_volume(&self, db: f32);

    fn set_progress(&self, elapsed_ms: u64, duration_ms: u64);

    fn set_metadata(&self, metadata: &TrackMetadata);

    fn set_artwork(&self, content_type: &str, data: &[u8]);

    /// No-op request keeping idle sessions alive
    fn keepalive(&self);

    /// Current network clock time
    fn now(&self) -> ClockInstant;

    fn disconnect(&self);
}

/// Map a 0-100 volume to the receiver's dB scale
///
/// 0 mutes ([`MUTE_DB`]); 1..=100 maps linearly onto -30 dB..0 dB.
///
/// ```rust
/// use raop_play::session::volume_to_db;
///
/// assert_eq!(volume_to_db(0), -144.0);
/// assert_eq!(volume_to_db(100), 0.0);
/// assert_eq!(volume_to_db(50), -15.0);
/// ```
pub fn volume_to_db(volume: i64) -> f32 {
    if volume <= 0 {
        return MUTE_DB;
    }
    let volume = volume.min(100) as f32;
    MIN_VOLUME_DB - MIN_VOLUME_DB * volume / 100.0
}

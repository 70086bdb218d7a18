//! raop-play configuration
//!
//! Settings come from three layers, highest priority first: command-line
//! flags, the TOML configuration file, built-in defaults. Both the file and
//! the CLI are represented as a [`PlayerConfig`] with every field optional;
//! [`PlayerConfig::layered`] merges them and the getters apply defaults.
//!
//! The pure option derivations used at connect time (crypto selection,
//! forced auth, device password decoding, log level mapping) live here too.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use raop_common::config::{load_toml, resolve_config_file};
use raop_common::timing::millis_to_frames;
use serde::Deserialize;
use tracing::info;

use crate::control::default_command_pipe;
use crate::error::{Error, Result};
use crate::session::{Codec, Crypto, DEFAULT_FRAMES_PER_CHUNK, DEFAULT_SAMPLE_RATE};

/// Application name used for configuration directories
pub const APP_NAME: &str = "raop-play";

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "RAOP_PLAY_CONFIG";

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_LATENCY_MS: u64 = 1000;
pub const DEFAULT_DEBUG_LEVEL: u8 = 3;
pub const DEFAULT_DACP_ID: &str = "1A2B3D4EA1B2C3D4";
pub const DEFAULT_ACTIVE_REMOTE: &str = "ap5918800d";
pub const DEFAULT_ET: &str = "0,4";
pub const DEFAULT_MD: &str = "0,1,2";

// ========================================
// Layered settings
// ========================================

/// One configuration layer; `None` means "not set here"
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub port: Option<u16>,
    pub volume: Option<u8>,
    pub latency_ms: Option<u64>,
    pub debug: Option<u8>,
    pub dacp_id: Option<String>,
    pub active_remote: Option<String>,
    pub command_pipe: Option<PathBuf>,
    pub et: Option<String>,
    pub md: Option<String>,
    pub chunk_frames: Option<u32>,
    pub alac: Option<bool>,
}

impl PlayerConfig {
    /// Load the configuration file, if any
    ///
    /// `cli_path` wins over [`CONFIG_ENV_VAR`], which wins over the default
    /// locations. No file found means an empty layer.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_file(cli_path, CONFIG_ENV_VAR, APP_NAME)? {
            Some(path) => {
                let config: PlayerConfig = load_toml(&path)?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Merge `overrides` on top of `self`
    pub fn layered(self, overrides: PlayerConfig) -> PlayerConfig {
        PlayerConfig {
            port: overrides.port.or(self.port),
            volume: overrides.volume.or(self.volume),
            latency_ms: overrides.latency_ms.or(self.latency_ms),
            debug: overrides.debug.or(self.debug),
            dacp_id: overrides.dacp_id.or(self.dacp_id),
            active_remote: overrides.active_remote.or(self.active_remote),
            command_pipe: overrides.command_pipe.or(self.command_pipe),
            et: overrides.et.or(self.et),
            md: overrides.md.or(self.md),
            chunk_frames: overrides.chunk_frames.or(self.chunk_frames),
            alac: overrides.alac.or(self.alac),
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Initial volume 0-100; 0 leaves the receiver's volume alone
    pub fn volume(&self) -> u8 {
        self.volume.unwrap_or(0).min(100)
    }

    pub fn latency_ms(&self) -> u64 {
        self.latency_ms.unwrap_or(DEFAULT_LATENCY_MS)
    }

    /// Configured latency in frames at the stream sample rate
    pub fn latency_frames(&self) -> u64 {
        millis_to_frames(self.latency_ms(), DEFAULT_SAMPLE_RATE)
    }

    pub fn debug(&self) -> u8 {
        self.debug.unwrap_or(DEFAULT_DEBUG_LEVEL)
    }

    pub fn dacp_id(&self) -> &str {
        self.dacp_id.as_deref().unwrap_or(DEFAULT_DACP_ID)
    }

    pub fn active_remote(&self) -> &str {
        self.active_remote.as_deref().unwrap_or(DEFAULT_ACTIVE_REMOTE)
    }

    /// Command pipe path, derived from the active-remote id unless set
    pub fn command_pipe(&self) -> PathBuf {
        self.command_pipe
            .clone()
            .unwrap_or_else(|| default_command_pipe(self.active_remote()))
    }

    pub fn et(&self) -> &str {
        self.et.as_deref().unwrap_or(DEFAULT_ET)
    }

    pub fn md(&self) -> &str {
        self.md.as_deref().unwrap_or(DEFAULT_MD)
    }

    pub fn chunk_frames(&self) -> u32 {
        match self.chunk_frames {
            Some(frames) if frames > 0 => frames,
            _ => DEFAULT_FRAMES_PER_CHUNK,
        }
    }

    pub fn codec(&self) -> Codec {
        if self.alac.unwrap_or(false) {
            Codec::Alac
        } else {
            Codec::AlacRaw
        }
    }
}

// ========================================
// Derived connect options
// ========================================

/// Payload encryption: RSA only when requested (or auth is on) and the
/// receiver advertises encryption type 1
pub fn select_crypto(encrypt: bool, auth: bool, et: &str) -> Crypto {
    if (encrypt || auth) && et.contains('1') {
        Crypto::Rsa
    } else {
        Crypto::Clear
    }
}

/// AirPort Express receivers always need auth
pub fn auth_forced(am: &str) -> bool {
    am.to_ascii_lowercase().contains("airport")
}

/// An Apple TV that advertises a pairing key cannot be used without a secret
pub fn check_apple_tv(am: &str, pk: &str, secret: Option<&str>) -> Result<()> {
    let has_secret = secret.is_some_and(|s| !s.is_empty());
    if am.to_ascii_lowercase().contains("appletv") && !pk.is_empty() && !has_secret {
        return Err(Error::Config(
            "AppleTV requires authentication (need to send secret field)".to_string(),
        ));
    }
    Ok(())
}

/// Decode the device password
///
/// Only applies when a password is given and `pw` (the receiver's mDNS
/// password flag) is `true`. The password is base64 (padding optional) and
/// is XOR-ed with the receiver's UDN.
pub fn decode_password(password: Option<&str>, pw: &str, udn: Option<&str>) -> Result<Option<Vec<u8>>> {
    let password = match password {
        Some(p) if !p.is_empty() && pw.eq_ignore_ascii_case("true") => p,
        _ => return Ok(None),
    };

    let udn = match udn {
        Some(u) if !u.is_empty() => u.as_bytes(),
        _ => {
            return Err(Error::Config(
                "Device password requires the receiver UDN".to_string(),
            ))
        }
    };

    let mut decoded = STANDARD_NO_PAD
        .decode(password.trim_end_matches('='))
        .map_err(|e| Error::Config(format!("Invalid device password: {}", e)))?;

    for (byte, key) in decoded.iter_mut().zip(udn.iter().cycle()) {
        *byte ^= key;
    }
    Ok(Some(decoded))
}

// ========================================
// Log levels
// ========================================

/// Threshold for one log channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogThreshold {
    Off,
    Error,
    Info,
    Debug,
    Trace,
}

impl LogThreshold {
    pub fn as_str(self) -> &'static str {
        match self {
            LogThreshold::Off => "off",
            LogThreshold::Error => "error",
            LogThreshold::Info => "info",
            LogThreshold::Debug => "debug",
            LogThreshold::Trace => "trace",
        }
    }
}

/// Per-channel thresholds for a `--debug` level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLevels {
    /// Application (`raop_play`)
    pub main: LogThreshold,
    /// Transport (`raop_play::session`)
    pub raop: LogThreshold,
    /// Shared utilities (`raop_common`)
    pub util: LogThreshold,
}

/// Highest supported `--debug` level
pub const MAX_DEBUG_LEVEL: u8 = 9;

impl LogLevels {
    /// Map `--debug 0..=9`; higher levels clamp to 9
    pub fn from_debug_level(level: u8) -> Self {
        use LogThreshold as T;
        let (main, raop, util) = match level.min(MAX_DEBUG_LEVEL) {
            0 => (T::Off, T::Off, T::Off),
            1 => (T::Error, T::Error, T::Error),
            2 => (T::Info, T::Error, T::Error),
            3 => (T::Info, T::Info, T::Error),
            4 => (T::Debug, T::Error, T::Error),
            5 => (T::Debug, T::Info, T::Error),
            6 => (T::Debug, T::Debug, T::Error),
            7 => (T::Trace, T::Info, T::Error),
            8 => (T::Trace, T::Debug, T::Error),
            _ => (T::Trace, T::Trace, T::Error),
        };
        Self { main, raop, util }
    }

    /// `EnvFilter` directives for these thresholds
    pub fn directives(&self) -> String {
        format!(
            "raop_play={},raop_play::session={},raop_common={}",
            self.main.as_str(),
            self.raop.as_str(),
            self.util.as_str()
        )
    }
}

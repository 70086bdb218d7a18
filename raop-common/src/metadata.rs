//! Track metadata pushed to the receiver

/// Now-playing information for the current stream
///
/// Fields are filled in one command at a time and persist until overwritten;
/// the whole record is sent to the receiver as a single update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Track length in whole seconds
    pub duration_seconds: u32,
    /// Playback position in whole seconds
    pub progress_seconds: u32,
}

impl TrackMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track length in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.duration_seconds as u64 * 1000
    }

    /// Playback position in milliseconds
    pub fn progress_ms(&self) -> u64 {
        self.progress_seconds as u64 * 1000
    }
}

/// Clamp a parsed integer into a seconds field (negative values become 0)
pub fn seconds_from_int(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}

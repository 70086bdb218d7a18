//! Line-oriented command protocol
//!
//! Controllers drive a running stream by writing `KEY=VALUE` records, one per
//! line, to the command source:
//!
//! ```text
//! TITLE=<string>
//! ARTIST=<string>
//! ALBUM=<string>
//! DURATION=<integer seconds>
//! PROGRESS=<integer seconds>
//! ARTWORK=<url-or-path>
//! VOLUME=<integer 0-100>
//! ACTION=PAUSE | PLAY | STOP | SENDMETA
//! ```
//!
//! Parsing never fails: unknown keys are kept as [`Command::SetField`] so the
//! consumer decides what matters, lines with an empty key are dropped, and
//! numeric values are interpreted leniently by [`parse_int_or_zero`].
//!
//! # Examples
//!
//! ```rust
//! use raop_common::protocol::{parse_batch, ActionKind, Command};
//!
//! let commands = parse_batch(b"TITLE=Foo\nACTION=SENDMETA\n");
//! assert_eq!(
//!     commands,
//!     vec![
//!         Command::SetField("TITLE".into(), "Foo".into()),
//!         Command::Action(ActionKind::SendMeta),
//!     ]
//! );
//! ```

use std::fmt;

use tracing::{debug, warn};

/// Record separator
const LINE_SEPARATOR: u8 = b'\n';

/// Key that carries playback actions
pub const ACTION_KEY: &str = "ACTION";

/// Longest partial line carried between reads before it is discarded
pub const MAX_PARTIAL_LINE: usize = 64 * 1024;

/// Playback/metadata actions carried by `ACTION=` lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Pause,
    Play,
    Stop,
    SendMeta,
}

impl ActionKind {
    /// Match an `ACTION=` value (exact, case-sensitive)
    pub fn from_value(value: &str) -> Option<Self> {
        match value {
            "PAUSE" => Some(ActionKind::Pause),
            "PLAY" => Some(ActionKind::Play),
            "STOP" => Some(ActionKind::Stop),
            "SENDMETA" => Some(ActionKind::SendMeta),
            _ => None,
        }
    }

    /// Wire spelling of the action
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Pause => "PAUSE",
            ActionKind::Play => "PLAY",
            ActionKind::Stop => "STOP",
            ActionKind::SendMeta => "SENDMETA",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `KEY=VALUE` record (including unknown keys and unknown actions)
    SetField(String, String),
    /// Recognized `ACTION=` record
    Action(ActionKind),
}

/// Parse one line (without its separator)
///
/// Returns `None` for blank lines and lines with an empty key.
pub fn parse_line(line: &str) -> Option<Command> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.is_empty() {
        return None;
    }

    let (key, value) = match line.split_once('=') {
        Some((key, value)) => (key, value),
        None => (line, ""),
    };

    if key.is_empty() {
        debug!("Dropping command line with empty key: {:?}", line);
        return None;
    }

    if key == ACTION_KEY {
        if let Some(kind) = ActionKind::from_value(value) {
            return Some(Command::Action(kind));
        }
    }

    Some(Command::SetField(key.to_string(), value.to_string()))
}

/// Parse a buffer as one complete batch of records
///
/// A trailing line without a separator is parsed like any other line.
pub fn parse_batch(bytes: &[u8]) -> Vec<Command> {
    String::from_utf8_lossy(bytes)
        .split(LINE_SEPARATOR as char)
        .filter_map(parse_line)
        .collect()
}

/// Lenient integer parse, `atoi` style
///
/// Skips leading whitespace, accepts an optional sign followed by digits and
/// ignores anything after them. Returns 0 when no digits are present or the
/// value does not fit.
///
/// ```rust
/// use raop_common::protocol::parse_int_or_zero;
///
/// assert_eq!(parse_int_or_zero("57"), 57);
/// assert_eq!(parse_int_or_zero(" -12abc"), -12);
/// assert_eq!(parse_int_or_zero("loud"), 0);
/// ```
pub fn parse_int_or_zero(value: &str) -> i64 {
    let trimmed = value.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());

    match digits[..end].parse::<i64>() {
        Ok(n) if negative => -n,
        Ok(n) => n,
        Err(_) => 0,
    }
}

/// Streaming line decoder
///
/// Splits successive reads into lines and carries a partial trailing line
/// over to the next [`feed`](LineDecoder::feed), so a record split across two
/// physical reads is joined rather than lost.
#[derive(Debug, Default)]
pub struct LineDecoder {
    partial: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode all complete lines available after appending `bytes`
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Command> {
        self.partial.extend_from_slice(bytes);

        let Some(last_separator) = self.partial.iter().rposition(|&b| b == LINE_SEPARATOR) else {
            self.enforce_limit();
            return Vec::new();
        };

        let remainder = self.partial.split_off(last_separator + 1);
        let complete = std::mem::replace(&mut self.partial, remainder);
        self.enforce_limit();

        parse_batch(&complete)
    }

    /// Flush whatever partial line is left (end of stream)
    pub fn finish(&mut self) -> Vec<Command> {
        let rest = std::mem::take(&mut self.partial);
        parse_batch(&rest)
    }

    /// True when a partial line is waiting for its separator
    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    fn enforce_limit(&mut self) {
        if self.partial.len() > MAX_PARTIAL_LINE {
            warn!(
                "Discarding {} bytes of unterminated command input",
                self.partial.len()
            );
            self.partial.clear();
        }
    }
}

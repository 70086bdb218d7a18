//! Raw PCM audio sources
//!
//! The stream is headerless 16-bit little-endian stereo at 44.1 kHz, read
//! from a file or standard input. Reads are handed out in whole frames; a
//! trailing partial frame is carried over to the next read.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Path argument meaning "read from standard input"
pub const STDIN_SOURCE: &str = "-";

/// Outcome of a single read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRead {
    /// This many bytes (whole frames) were written to the buffer
    Data(usize),
    /// Nothing available right now; try again on the next pass
    Empty,
    /// End of stream
    Exhausted,
}

/// Producer of raw PCM bytes for the scheduler
pub trait AudioSource: Send {
    /// Fill `buf` with up to `buf.len()` bytes of whole frames
    fn read_chunk(&mut self, buf: &mut [u8]) -> SourceRead;
}

/// Open `path` as an audio source, `-` being standard input
pub fn open_source(path: &str) -> Result<Box<dyn Read + Send>> {
    if path == STDIN_SOURCE {
        debug!("Reading audio from stdin");
        return Ok(Box::new(io::stdin()));
    }

    let file = File::open(Path::new(path))
        .map_err(|e| Error::Source(format!("{}: {}", path, e)))?;
    debug!("Reading audio from {}", path);
    Ok(Box::new(file))
}

/// [`AudioSource`] over any byte reader
pub struct ReaderSource<R> {
    reader: R,
    bytes_per_frame: usize,
    /// Bytes of an incomplete frame from the previous read
    carry: Vec<u8>,
}

impl<R: Read + Send> ReaderSource<R> {
    pub fn new(reader: R, bytes_per_frame: usize) -> Self {
        Self {
            reader,
            bytes_per_frame: bytes_per_frame.max(1),
            carry: Vec::with_capacity(bytes_per_frame),
        }
    }
}

impl<R: Read + Send> AudioSource for ReaderSource<R> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> SourceRead {
        let carried = self.carry.len().min(buf.len());
        buf[..carried].copy_from_slice(&self.carry[..carried]);
        self.carry.drain(..carried);

        let read = loop {
            match self.reader.read(&mut buf[carried..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    // Nothing available yet; keep the carried bytes in front
                    let mut restored = buf[..carried].to_vec();
                    restored.extend_from_slice(&self.carry);
                    self.carry = restored;
                    return SourceRead::Empty;
                }
                Err(e) => {
                    warn!("Audio source read failed, treating as end of stream: {}", e);
                    break 0;
                }
            }
        };

        let total = carried + read;
        if read == 0 && !buf[carried..].is_empty() {
            if total > 0 {
                debug!("Dropping {} bytes of trailing partial frame", total);
            }
            return SourceRead::Exhausted;
        }

        let aligned = total - total % self.bytes_per_frame;
        self.carry.extend_from_slice(&buf[aligned..total]);
        if aligned == 0 {
            SourceRead::Empty
        } else {
            SourceRead::Data(aligned)
        }
    }
}

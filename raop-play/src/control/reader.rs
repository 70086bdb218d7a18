//! Command source reader
//!
//! Producer thread that reads the command source (normally a named pipe),
//! splits it into lines and forwards each read's complete commands as one
//! batch. A FIFO reports end-of-stream whenever its last writer goes away;
//! the reader treats that as "nothing yet" and polls again until shutdown.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use raop_common::protocol::LineDecoder;
use raop_common::Command;
use tracing::{debug, info, warn};

use crate::state::SharedState;

/// Pause between polls of an idle command source
pub const IDLE_POLL: Duration = Duration::from_millis(250);

/// Read buffer size; one read becomes at most one batch
const READ_BUFFER_SIZE: usize = 512;

/// Default command pipe path for an active-remote token
pub fn default_command_pipe(active_remote: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/fifo-{}", active_remote))
}

/// Spawn a reader thread on the file at `path`
///
/// The file is opened on the reader thread: opening a FIFO blocks until a
/// writer shows up. Failing to open it ends the thread, which closes the
/// channel.
pub fn spawn_pipe_reader(
    path: PathBuf,
    batches: Sender<Vec<Command>>,
    state: Arc<SharedState>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        info!("Listening for commands on {}", path.display());
        match File::open(&path) {
            Ok(file) => read_commands(file, &batches, &state),
            Err(e) => warn!("Cannot open command source {}: {}", path.display(), e),
        }
    })
}

/// Spawn a reader thread over an already-open source
pub fn spawn_reader<R>(
    reader: R,
    batches: Sender<Vec<Command>>,
    state: Arc<SharedState>,
) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || read_commands(reader, &batches, &state))
}

/// Read `reader` until shutdown or until nobody listens on `batches`
pub fn read_commands<R: Read>(
    mut reader: R,
    batches: &Sender<Vec<Command>>,
    state: &SharedState,
) {
    let mut decoder = LineDecoder::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];

    while !state.is_shutdown() {
        let batch = match reader.read(&mut buf) {
            Ok(0) => {
                // Writer went away; a dangling line is complete now
                let tail = decoder.finish();
                if tail.is_empty() {
                    thread::sleep(IDLE_POLL);
                    continue;
                }
                tail
            }
            Ok(n) => decoder.feed(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Command source read failed: {}", e);
                thread::sleep(IDLE_POLL);
                continue;
            }
        };

        if batch.is_empty() {
            continue;
        }

        debug!("Read {} commands", batch.len());
        if batches.send(batch).is_err() {
            debug!("Command channel closed, reader exiting");
            return;
        }
    }

    debug!("Command reader observed shutdown");
}

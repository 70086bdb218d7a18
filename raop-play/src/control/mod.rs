//! Command channel: pipe reader and dispatcher

pub mod dispatcher;
pub mod reader;

pub use dispatcher::{CommandDispatcher, DispatchFlow, DispatcherHandle};
pub use reader::{default_command_pipe, read_commands, spawn_pipe_reader, spawn_reader};

/// Capacity of the reader-to-dispatcher batch channel
pub const COMMAND_CHANNEL_CAPACITY: usize = 16;

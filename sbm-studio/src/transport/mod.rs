//! Command transport: JSON envelopes, dispatch, progress relay, stdio loop

pub mod command;
pub mod progress;
pub mod router;
pub mod stdio;

pub use command::{Command, CommandType, ProgressMessage, Response};
pub use progress::spawn_progress_forwarder;
pub use router::dispatch;
pub use stdio::serve;

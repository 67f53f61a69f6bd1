//! # cmdstream
//!
//! Run external processes and consume their output through channels.
//!
//! A [`Command`] spawns a process, reads stdout and stderr line by line,
//! merges both streams into one event channel and publishes a single
//! [`FinalState`] once every line has been delivered and the process has
//! been reaped.
//!
//! ## Features
//!
//! - **Streaming or buffering**: one event per line, or one aggregated event
//! - **Cancellation**: a [`CancelContext`] with optional deadline governs
//!   the whole execution; the process is killed and still reaped
//! - **Read-before-wait**: the process is only waited on after both pipes
//!   reached EOF, so no output is lost and no wait blocks on a full pipe
//! - **Pluggable processes**: drive any [`ProcessHandle`] implementation
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use cmdstream::{CancelContext, Command, CommandOptions};
//!
//! #[tokio::main]
//! async fn main() -> cmdstream::Result<()> {
//!     // Initialize logging
//!     cmdstream::logging::try_init().ok();
//!
//!     let ctx = CancelContext::with_timeout(Duration::from_secs(5));
//!     let cmd = Command::new(ctx, "sh", ["-c", "echo hello"], CommandOptions::default())?;
//!
//!     let (events, state) = cmd.collect().await?;
//!     println!("stdout: {:?}", events[0].stdout());
//!     println!("exit code: {}", state.exit_code);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod logging;
pub mod process;

// Re-export commonly used types
pub use context::{CancelContext, CancelReason};
pub use error::{CommandError, Result};
pub use execution::{
    AggregatedResult, Command, CommandOptions, ExecState, FinalState, LineEvent, Origin,
    OutputEvent,
};
pub use process::{ByteStream, ChildProcess, ProcessHandle};

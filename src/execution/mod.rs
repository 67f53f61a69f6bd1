//! Command execution engine.
//!
//! This module runs an external process and delivers its output:
//! - Line readers for stdout and stderr
//! - Fan-in of both streams into one event channel
//! - Streaming (one event per line) or buffering (one aggregated event)
//! - A final state published once all output has been consumed
//!
//! # Example
//!
//! ```no_run
//! use cmdstream::{CancelContext, Command};
//!
//! # async fn run() -> cmdstream::Result<()> {
//! let mut cmd = Command::streaming(CancelContext::background(), "sh", ["-c", "echo hello"])?;
//!
//! let mut events = cmd.execute()?;
//! while let Some(event) = events.recv().await {
//!     for line in event.out() {
//!         println!("{line}");
//!     }
//! }
//!
//! // Read the final state only after the event channel closed.
//! let state = cmd.wait().await?;
//! println!("exit code: {}", state.exit_code);
//! # Ok(())
//! # }
//! ```

mod aggregate;
mod command;
mod event;
mod merge;
mod reader;
mod state;

pub use aggregate::ResultAggregator;
pub use command::{Command, CommandOptions, DEFAULT_CHANNEL_CAPACITY, DEFAULT_FINAL_SEND_GRACE};
pub use event::{AggregatedResult, FinalState, LineEvent, Origin, OutputEvent};
pub use merge::{merge, MergedLines};
pub use reader::read_lines;
pub use state::ExecState;

//! Error types for cmdstream.

use thiserror::Error;

use crate::context::CancelReason;
use crate::execution::{ExecState, Origin};

/// Main error type for command execution.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The program name was empty.
    #[error("program name cannot be empty")]
    EmptyProgram,

    /// An execution option failed validation.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// Opening the stdout or stderr pipe failed.
    #[error("failed to open {origin} pipe: {source}")]
    PipeAcquisition {
        origin: Origin,
        #[source]
        source: std::io::Error,
    },

    /// The process could not be started.
    #[error("failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),

    /// Reading a line from an output stream failed.
    #[error("failed to read {origin}: {source}")]
    Read {
        origin: Origin,
        #[source]
        source: std::io::Error,
    },

    /// The governing context was cancelled or its deadline passed.
    #[error("execution cancelled: {0}")]
    Cancelled(CancelReason),

    /// The process exited with a non-zero status.
    #[error("exit status {code}")]
    Exit { code: i32 },

    /// The process was terminated by a signal.
    #[error("process terminated by signal")]
    Signal,

    /// The wait call itself failed.
    #[error("failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),

    /// Invalid lifecycle transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition { from: ExecState, to: ExecState },

    /// The final state receiver was already handed out.
    #[error("final state already taken")]
    FinalStateTaken,

    /// Channel receive error.
    #[error("channel closed")]
    ChannelClosed,
}

impl CommandError {
    /// Whether this error stems from cancellation or a timeout.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Whether this error stems from an expired deadline.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::Cancelled(CancelReason::DeadlineExceeded))
    }
}

/// Convenience Result type for cmdstream operations.
pub type Result<T> = std::result::Result<T, CommandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_program_display() {
        let err = CommandError::EmptyProgram;
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_pipe_error_display() {
        let err = CommandError::PipeAcquisition {
            origin: Origin::Stderr,
            source: std::io::Error::other("errStderrPipe"),
        };
        assert!(err.to_string().contains("stderr"));
        assert!(err.to_string().contains("errStderrPipe"));
    }

    #[test]
    fn test_cancelled_kinds() {
        let err = CommandError::Cancelled(CancelReason::DeadlineExceeded);
        assert!(err.is_cancelled());
        assert!(err.is_deadline_exceeded());
        assert!(err.to_string().contains("deadline exceeded"));

        let err = CommandError::Cancelled(CancelReason::Cancelled);
        assert!(err.is_cancelled());
        assert!(!err.is_deadline_exceeded());
    }

    #[test]
    fn test_exit_display() {
        let err = CommandError::Exit { code: 10 };
        assert_eq!(err.to_string(), "exit status 10");
        assert!(!err.is_cancelled());
    }
}

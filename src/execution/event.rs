//! Events delivered to callers of an execution.

use std::fmt;

use crate::error::CommandError;

/// Output stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// One line of output, or the terminal read error of a stream.
#[derive(Debug)]
pub struct LineEvent {
    /// Line text without its delimiter. Empty for read errors.
    pub text: String,
    /// Stream source.
    pub origin: Origin,
    /// Read error that ended the stream.
    pub error: Option<CommandError>,
}

impl LineEvent {
    /// Create a line event.
    pub fn line(origin: Origin, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin,
            error: None,
        }
    }

    /// Create the event that reports a failed read.
    pub fn failed(origin: Origin, source: std::io::Error) -> Self {
        Self {
            text: String::new(),
            origin,
            error: Some(CommandError::Read { origin, source }),
        }
    }

    /// Check whether this event carries a read error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// All output of an execution, split by stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedResult {
    /// Stdout lines in production order.
    pub stdout: Vec<String>,
    /// Stderr lines in production order.
    pub stderr: Vec<String>,
}

impl AggregatedResult {
    /// Stdout lines followed by stderr lines.
    pub fn out(&self) -> Vec<&str> {
        self.stdout
            .iter()
            .chain(self.stderr.iter())
            .map(String::as_str)
            .collect()
    }

    /// Check whether no line was captured.
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

/// Event published on the execution's event channel.
///
/// Streaming executions publish one `Line` per line; buffering executions
/// publish a single `Aggregated` event once the process output ends.
#[derive(Debug)]
pub enum OutputEvent {
    /// A single line forwarded live.
    Line(LineEvent),
    /// Every line of the execution.
    Aggregated {
        result: AggregatedResult,
        error: Option<CommandError>,
    },
}

impl OutputEvent {
    /// Stdout lines carried by this event.
    pub fn stdout(&self) -> &[String] {
        match self {
            Self::Line(line) if line.origin == Origin::Stdout && !line.is_error() => {
                std::slice::from_ref(&line.text)
            }
            Self::Line(_) => &[],
            Self::Aggregated { result, .. } => &result.stdout,
        }
    }

    /// Stderr lines carried by this event.
    pub fn stderr(&self) -> &[String] {
        match self {
            Self::Line(line) if line.origin == Origin::Stderr && !line.is_error() => {
                std::slice::from_ref(&line.text)
            }
            Self::Line(_) => &[],
            Self::Aggregated { result, .. } => &result.stderr,
        }
    }

    /// Stdout lines followed by stderr lines.
    pub fn out(&self) -> Vec<&str> {
        self.stdout()
            .iter()
            .chain(self.stderr().iter())
            .map(String::as_str)
            .collect()
    }

    /// Error attached to this event.
    pub fn error(&self) -> Option<&CommandError> {
        match self {
            Self::Line(line) => line.error.as_ref(),
            Self::Aggregated { error, .. } => error.as_ref(),
        }
    }
}

/// Terminal outcome of an execution, published exactly once.
#[derive(Debug)]
pub struct FinalState {
    /// Exit code, or -1 when none could be determined.
    pub exit_code: i32,
    /// Final error, if any.
    pub error: Option<CommandError>,
}

impl FinalState {
    /// Create a final state.
    pub fn new(exit_code: i32, error: Option<CommandError>) -> Self {
        Self { exit_code, error }
    }

    /// A clean exit.
    pub fn success() -> Self {
        Self::new(0, None)
    }

    /// Check if the process exited with code 0 and no error.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }
}

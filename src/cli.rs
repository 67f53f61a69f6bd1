//! Command-line interface for cmdstream.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Program to run.
    pub program: Option<String>,
    /// Arguments passed verbatim to the program.
    pub args: Vec<String>,
    /// Forward lines as they arrive.
    pub stream: bool,
    /// Timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Channel capacity.
    pub buffer: Option<usize>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
///
/// Options are only recognized before the program name; everything after
/// it belongs to the program.
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('s') | Long("stream") => {
                result.stream = true;
            }
            Short('t') | Long("timeout") => {
                let value: String = parser.value()?.parse()?;
                result.timeout_ms = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("timeout", value))?,
                );
            }
            Short('b') | Long("buffer") => {
                let value: String = parser.value()?.parse()?;
                let capacity: usize = value
                    .parse()
                    .map_err(|_| ArgsError::InvalidValue("buffer", value.clone()))?;
                if capacity == 0 {
                    return Err(ArgsError::InvalidValue("buffer", value));
                }
                result.buffer = Some(capacity);
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(program) => {
                let program = program.string()?;
                if program.is_empty() {
                    return Err(ArgsError::EmptyProgram);
                }
                result.program = Some(program);
                for raw in parser.raw_args()? {
                    result.args.push(
                        raw.into_string()
                            .map_err(|raw| ArgsError::InvalidUnicode(raw.to_string_lossy().into()))?,
                    );
                }
                break;
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"cmdstream {version}
Run a program and relay its stdout and stderr

USAGE:
    cmdstream [OPTIONS] [--] <PROGRAM> [ARGS...]

OPTIONS:
    -s, --stream            Relay lines as they arrive (default: buffer until exit)
    -t, --timeout <MS>      Kill the program after MS milliseconds
    -b, --buffer <N>        Channel capacity [default: 1]
    -c, --config <FILE>     Path to configuration file (JSON)
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    CMDSTREAM_STREAMING         Streaming mode (true/false, overrides config)
    CMDSTREAM_TIMEOUT_MS        Timeout in milliseconds (overrides config)
    CMDSTREAM_CHANNEL_CAPACITY  Channel capacity (overrides config)
    CMDSTREAM_LOG_LEVEL         Log level (overrides config)
    RUST_LOG                    Alternative log level setting

EXIT STATUS:
    The program's exit code, or 1 if it was killed or timed out.

EXAMPLES:
    # Buffer all output, print it once the program exits
    cmdstream sh -c 'echo hello; echo oops >&2'

    # Relay output live and give up after two seconds
    cmdstream -s -t 2000 -- ping -c 10 localhost
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("cmdstream {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// The program name was empty.
    EmptyProgram,
    /// A program argument is not valid UTF-8.
    InvalidUnicode(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::EmptyProgram => write!(f, "program name cannot be empty"),
            Self::InvalidUnicode(arg) => write!(f, "argument is not valid unicode: '{}'", arg),
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}

//! cmdstream binary entry point.

use std::process::ExitCode;

use cmdstream::cli::{self, Args};
use cmdstream::config::Config;
use cmdstream::{logging, CancelContext, Command, OutputEvent};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Try 'cmdstream --help' for more information.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }

    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };

    // Ignore the error if a subscriber is already installed
    let _ = logging::try_init_with(config.log_filter());

    match run(&args, &config).await {
        Ok(code) => exit_status(code),
        Err(RunError::Usage(message)) => {
            eprintln!("error: {}", message);
            ExitCode::from(2)
        }
        Err(RunError::Command(e)) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

enum RunError {
    Usage(String),
    Command(cmdstream::CommandError),
}

impl From<cmdstream::CommandError> for RunError {
    fn from(e: cmdstream::CommandError) -> Self {
        Self::Command(e)
    }
}

async fn run(args: &Args, config: &Config) -> Result<i32, RunError> {
    let Some(program) = args.program.clone() else {
        return Err(RunError::Usage("missing <PROGRAM>".to_string()));
    };
    let options = config.to_options().map_err(|e| RunError::Usage(e.to_string()))?;

    let ctx = match config.timeout() {
        Some(timeout) => CancelContext::with_timeout(timeout),
        None => CancelContext::background(),
    };

    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, cancelling");
            interrupt.cancel();
        }
    });

    let mut command = Command::new(ctx, program, args.args.clone(), options)?;
    debug!(?command, "running");

    let mut events = command.execute()?;
    while let Some(event) = events.recv().await {
        print_event(&event);
    }

    let state = command.wait().await?;
    match state.error {
        Some(ref e) if e.is_cancelled() => {
            warn!(error = %e, "command killed");
        }
        Some(ref e) => debug!(exit_code = state.exit_code, error = %e, "command failed"),
        None => {}
    }
    Ok(state.exit_code)
}

fn print_event(event: &OutputEvent) {
    for line in event.stdout() {
        println!("{}", line);
    }
    for line in event.stderr() {
        eprintln!("{}", line);
    }
    if let Some(e) = event.error() {
        warn!(error = %e, "output incomplete");
    }
}

fn exit_status(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}

//! Command definition and execution lifecycle.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::aggregate::aggregate;
use super::event::{FinalState, LineEvent, Origin, OutputEvent};
use super::merge::merge;
use super::reader::read_lines;
use super::state::{ExecState, Lifecycle};
use crate::context::{CancelContext, CancelReason};
use crate::error::CommandError;
use crate::process::{ByteStream, ChildProcess, ProcessHandle};
use crate::Result;

/// Default capacity of every internal and public channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1;

/// Default bound on the final aggregated send once the context is done.
pub const DEFAULT_FINAL_SEND_GRACE: Duration = Duration::from_millis(100);

/// Options for a command execution.
#[derive(Debug, Clone)]
pub struct CommandOptions {
    /// Forward lines live instead of buffering them into one event.
    pub streaming: bool,
    /// Capacity of the line and event channels.
    pub channel_capacity: usize,
    /// How long a buffered result is offered after cancellation.
    pub final_send_grace: Duration,
    /// Working directory override (if any).
    pub working_dir: Option<PathBuf>,
    /// Environment variables to set.
    pub env: HashMap<String, String>,
}

impl CommandOptions {
    /// Default options: buffering mode.
    pub fn new() -> Self {
        Self {
            streaming: false,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            final_send_grace: DEFAULT_FINAL_SEND_GRACE,
            working_dir: None,
            env: HashMap::new(),
        }
    }

    /// Set streaming mode.
    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Set the channel capacity.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the grace period for the final buffered send.
    pub fn final_send_grace(mut self, grace: Duration) -> Self {
        self.final_send_grace = grace;
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add multiple environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    /// Check the options before use.
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(CommandError::InvalidOption(
                "channel capacity must be at least 1".into(),
            ));
        }
        if self.env.keys().any(|k| k.is_empty() || k.contains('=')) {
            return Err(CommandError::InvalidOption(
                "environment variable names must be non-empty and must not contain '='".into(),
            ));
        }
        Ok(())
    }
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything consumed by a successful `execute`.
struct Pending<P> {
    handle: P,
    lifecycle: Lifecycle,
    final_tx: oneshot::Sender<FinalState>,
}

/// An external process whose output is delivered through channels.
///
/// Call [`execute`](Command::execute) and read the returned channel until
/// it closes, then read the final state with [`wait`](Command::wait) or
/// [`final_state`](Command::final_state). The final state is only
/// published after the event channel has been drained, so reading it
/// first may block for as long as output is pending.
pub struct Command<P: ProcessHandle = ChildProcess> {
    program: String,
    args: Vec<String>,
    options: CommandOptions,
    ctx: CancelContext,
    pending: Option<Pending<P>>,
    state: watch::Receiver<ExecState>,
    final_rx: Option<oneshot::Receiver<FinalState>>,
}

impl Command<ChildProcess> {
    /// Create a command running `program` with `args`.
    pub fn new<I, S>(
        ctx: CancelContext,
        program: impl Into<String>,
        args: I,
        options: CommandOptions,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let program = program.into();
        if program.is_empty() {
            return Err(CommandError::EmptyProgram);
        }
        options.validate()?;

        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let mut handle = ChildProcess::new(&program, &args).envs(&options.env);
        if let Some(dir) = &options.working_dir {
            handle = handle.working_dir(dir);
        }

        let mut command = Self::with_handle(ctx, program, handle, options)?;
        command.args = args;
        Ok(command)
    }

    /// Create a streaming command with default options.
    pub fn streaming<I, S>(ctx: CancelContext, program: impl Into<String>, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ctx, program, args, CommandOptions::new().streaming(true))
    }
}

impl<P: ProcessHandle> Command<P> {
    /// Create a command driving a caller-supplied process handle.
    ///
    /// `program` only names the command in logs and errors.
    pub fn with_handle(
        ctx: CancelContext,
        program: impl Into<String>,
        handle: P,
        options: CommandOptions,
    ) -> Result<Self> {
        let program = program.into();
        if program.is_empty() {
            return Err(CommandError::EmptyProgram);
        }
        options.validate()?;

        let (lifecycle, state) = Lifecycle::new();
        let (final_tx, final_rx) = oneshot::channel();

        Ok(Self {
            program,
            args: Vec::new(),
            options,
            ctx,
            pending: Some(Pending {
                handle,
                lifecycle,
                final_tx,
            }),
            state,
            final_rx: Some(final_rx),
        })
    }

    /// Program name.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Program arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Execution options.
    pub fn options(&self) -> &CommandOptions {
        &self.options
    }

    /// Check whether lines are forwarded live.
    pub fn is_streaming(&self) -> bool {
        self.options.streaming
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ExecState {
        *self.state.borrow()
    }

    /// Check whether the final state has been published.
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Start the process and return its event channel.
    ///
    /// Pipe and spawn failures are returned here and no channel is
    /// produced. A command can be executed at most once; a failed start
    /// consumes it as well.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn execute(&mut self) -> Result<mpsc::Receiver<OutputEvent>> {
        let Some(pending) = self.pending.take() else {
            let from = self.state();
            if from.is_started() {
                debug!(program = %self.program, state = ?from, "execute: already running");
            } else {
                debug!(program = %self.program, "execute: consumed by a failed start");
            }
            return Err(CommandError::InvalidStateTransition {
                from,
                to: ExecState::Started,
            });
        };
        let Pending {
            mut handle,
            lifecycle,
            final_tx,
        } = pending;

        let (stdout, stderr) = open_and_start(&mut handle, &lifecycle)?;
        info!(
            program = %self.program,
            args = ?self.args,
            streaming = self.options.streaming,
            "process started"
        );

        let capacity = self.options.channel_capacity;
        let merged = merge(
            &self.ctx,
            vec![
                read_lines(&self.ctx, stdout, Origin::Stdout, capacity),
                read_lines(&self.ctx, stderr, Origin::Stderr, capacity),
            ],
            capacity,
        );
        lifecycle.advance(ExecState::Merging)?;

        let (events_tx, events_rx) = mpsc::channel(capacity);
        let delivery = if self.options.streaming {
            tokio::spawn(relay(self.ctx.clone(), merged.lines, events_tx))
        } else {
            tokio::spawn(aggregate(
                self.ctx.clone(),
                merged.lines,
                events_tx,
                self.options.final_send_grace,
            ))
        };
        lifecycle.advance(ExecState::Draining)?;

        tokio::spawn(finalize(
            self.ctx.clone(),
            self.program.clone(),
            handle,
            merged.reads_done,
            delivery,
            lifecycle,
            final_tx,
        ));

        Ok(events_rx)
    }

    /// Take the final state channel.
    ///
    /// The channel yields exactly one value and then closes. It can be
    /// taken once; it closes without a value if the command never started.
    pub fn final_state(&mut self) -> Result<oneshot::Receiver<FinalState>> {
        self.final_rx.take().ok_or(CommandError::FinalStateTaken)
    }

    /// Wait for the final state.
    ///
    /// Drain the event channel first.
    pub async fn wait(&mut self) -> Result<FinalState> {
        let rx = self.final_state()?;
        rx.await.map_err(|_| CommandError::ChannelClosed)
    }

    /// Execute, drain every event, and return them with the final state.
    pub async fn collect(mut self) -> Result<(Vec<OutputEvent>, FinalState)> {
        let mut rx = self.execute()?;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        let state = self.wait().await?;
        Ok((events, state))
    }
}

impl<P: ProcessHandle> fmt::Debug for Command<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("options", &self.options)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Open both pipes, then spawn. Opened pipes are dropped on failure.
fn open_and_start<P: ProcessHandle>(
    handle: &mut P,
    lifecycle: &Lifecycle,
) -> Result<(ByteStream, ByteStream)> {
    let stdout = handle
        .open_stdout()
        .map_err(|source| CommandError::PipeAcquisition {
            origin: Origin::Stdout,
            source,
        })?;
    let stderr = handle
        .open_stderr()
        .map_err(|source| CommandError::PipeAcquisition {
            origin: Origin::Stderr,
            source,
        })?;
    handle.start().map_err(CommandError::Spawn)?;
    lifecycle.advance(ExecState::Started)?;
    Ok((stdout, stderr))
}

/// Streaming delivery: forward every merged line as its own event.
///
/// If the caller drops the event channel the merged lines are still
/// drained so the process never stalls on a full pipe.
async fn relay(
    ctx: CancelContext,
    mut merged: mpsc::Receiver<LineEvent>,
    events: mpsc::Sender<OutputEvent>,
) {
    let mut delivered = 0usize;
    let mut detached = false;

    while let Some(line) = merged.recv().await {
        if detached {
            continue;
        }
        tokio::select! {
            biased;
            () = ctx.done() => {
                debug!(delivered, "relay: cancelled, truncating output");
                break;
            }
            sent = events.send(OutputEvent::Line(line)) => {
                if sent.is_err() {
                    debug!(delivered, "relay: event receiver dropped, discarding output");
                    detached = true;
                } else {
                    delivered += 1;
                }
            }
        }
    }
    trace!(delivered, "relay: done");
}

/// Wait for the merge gate, reap the process, and publish the final state.
async fn finalize<P: ProcessHandle>(
    ctx: CancelContext,
    program: String,
    mut handle: P,
    reads_done: oneshot::Receiver<()>,
    delivery: JoinHandle<()>,
    lifecycle: Lifecycle,
    final_tx: oneshot::Sender<FinalState>,
) {
    // Waiting before both pipes hit EOF can block forever or lose output.
    if reads_done.await.is_err() {
        warn!(%program, "merge completion gate dropped");
    }

    let state = wait_for_exit(&ctx, &mut handle).await;
    advance_or_log(&lifecycle, ExecState::Waited);

    if let Err(e) = delivery.await {
        error!(%program, "output delivery task failed: {}", e);
    }

    info!(
        %program,
        exit_code = state.exit_code,
        error = ?state.error,
        "execution finished"
    );
    advance_or_log(&lifecycle, ExecState::Finalized);
    if final_tx.send(state).is_err() {
        debug!(%program, "final state receiver dropped");
    }
}

async fn wait_for_exit<P: ProcessHandle>(ctx: &CancelContext, handle: &mut P) -> FinalState {
    let waited = tokio::select! {
        biased;
        result = handle.wait() => Some(result),
        () = ctx.done() => None,
    };

    match waited {
        // Output was cut short, so the exit status does not describe the run.
        Some(result) if ctx.is_done() => {
            let reason = ctx.err().unwrap_or(CancelReason::Cancelled);
            debug!(%reason, exited = ?result, "process exited after cancellation");
            FinalState::new(-1, Some(CommandError::Cancelled(reason)))
        }
        Some(Ok(())) => FinalState::success(),
        Some(Err(e)) => FinalState::new(handle.last_exit_code(), Some(e)),
        None => {
            let reason = ctx.err().unwrap_or(CancelReason::Cancelled);
            debug!(%reason, "context done before exit, killing process");
            if let Err(e) = handle.kill() {
                warn!("failed to kill process: {}", e);
            }
            if let Err(e) = handle.wait().await {
                trace!(error = %e, "reaped killed process");
            }
            FinalState::new(-1, Some(CommandError::Cancelled(reason)))
        }
    }
}

fn advance_or_log(lifecycle: &Lifecycle, target: ExecState) {
    if let Err(e) = lifecycle.advance(target) {
        error!(current = ?lifecycle.current(), "{}", e);
    }
}

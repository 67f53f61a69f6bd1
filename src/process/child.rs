//! Tokio-backed process handle.

use std::collections::HashMap;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::oneshot;
use tracing::debug;

use super::{ByteStream, PendingPipe, ProcessHandle};
use crate::error::CommandError;

/// A child process spawned through [`tokio::process`].
///
/// Stdin is always null. Stdout and stderr are null unless opened before
/// [`start`](ProcessHandle::start). The child is killed if the handle is
/// dropped while it still runs.
#[derive(Debug)]
pub struct ChildProcess {
    program: String,
    command: Command,
    child: Option<Child>,
    stdout: Option<oneshot::Sender<ChildStdout>>,
    stderr: Option<oneshot::Sender<ChildStderr>>,
    stdout_opened: bool,
    stderr_opened: bool,
    exit_code: i32,
}

impl ChildProcess {
    /// Prepare a process; nothing runs until started.
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        Self {
            program: program.to_string(),
            command,
            child: None,
            stdout: None,
            stderr: None,
            stdout_opened: false,
            stderr_opened: false,
            exit_code: -1,
        }
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: &Path) -> Self {
        self.command.current_dir(dir);
        self
    }

    /// Add environment variables.
    pub fn envs(mut self, vars: &HashMap<String, String>) -> Self {
        self.command.envs(vars);
        self
    }

    /// Process ID, while the child is running.
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    fn ensure_not_started(&self, what: &str) -> std::io::Result<()> {
        if self.child.is_some() {
            return Err(std::io::Error::other(format!(
                "{what} after process started"
            )));
        }
        Ok(())
    }

    fn record(&mut self, status: ExitStatus) -> crate::Result<()> {
        self.exit_code = status.code().unwrap_or(-1);
        if status.success() {
            Ok(())
        } else if status.code().is_some() {
            Err(CommandError::Exit {
                code: self.exit_code,
            })
        } else {
            Err(CommandError::Signal)
        }
    }
}

impl ProcessHandle for ChildProcess {
    fn open_stdout(&mut self) -> std::io::Result<ByteStream> {
        self.ensure_not_started("stdout pipe requested")?;
        if self.stdout_opened {
            return Err(std::io::Error::other("stdout pipe already opened"));
        }
        self.command.stdout(Stdio::piped());
        let (tx, pipe) = PendingPipe::new();
        self.stdout = Some(tx);
        self.stdout_opened = true;
        Ok(Box::new(pipe))
    }

    fn open_stderr(&mut self) -> std::io::Result<ByteStream> {
        self.ensure_not_started("stderr pipe requested")?;
        if self.stderr_opened {
            return Err(std::io::Error::other("stderr pipe already opened"));
        }
        self.command.stderr(Stdio::piped());
        let (tx, pipe) = PendingPipe::new();
        self.stderr = Some(tx);
        self.stderr_opened = true;
        Ok(Box::new(pipe))
    }

    fn start(&mut self) -> std::io::Result<()> {
        self.ensure_not_started("start")?;
        let mut child = self.command.spawn()?;
        debug!(program = %self.program, pid = ?child.id(), "process spawned");

        // A dropped receiver just means the caller released that pipe.
        if let (Some(tx), Some(pipe)) = (self.stdout.take(), child.stdout.take()) {
            let _ = tx.send(pipe);
        }
        if let (Some(tx), Some(pipe)) = (self.stderr.take(), child.stderr.take()) {
            let _ = tx.send(pipe);
        }

        self.child = Some(child);
        Ok(())
    }

    async fn wait(&mut self) -> crate::Result<()> {
        let child = self.child.as_mut().ok_or_else(|| {
            CommandError::Wait(std::io::Error::other("process not started"))
        })?;
        let status = child.wait().await.map_err(CommandError::Wait)?;
        debug!(program = %self.program, ?status, "process exited");
        self.record(status)
    }

    fn kill(&mut self) -> std::io::Result<()> {
        match self.child.as_mut() {
            Some(child) => child.start_kill(),
            None => Ok(()),
        }
    }

    fn last_exit_code(&self) -> i32 {
        self.exit_code
    }
}

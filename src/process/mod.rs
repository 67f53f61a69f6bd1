//! Process handle abstraction.
//!
//! The execution engine never talks to the operating system directly. It
//! drives a [`ProcessHandle`]: open both output pipes, start, and later
//! wait. [`ChildProcess`] is the tokio-backed implementation; tests and
//! embedders can plug in their own.

mod child;

pub use child::ChildProcess;

use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::oneshot;

/// Byte stream produced by a process output pipe.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// A process the execution engine can drive.
///
/// Pipes are opened before [`start`](ProcessHandle::start). Dropping a
/// returned stream releases the pipe.
pub trait ProcessHandle: Send + 'static {
    /// Open the stdout pipe.
    fn open_stdout(&mut self) -> std::io::Result<ByteStream>;

    /// Open the stderr pipe.
    fn open_stderr(&mut self) -> std::io::Result<ByteStream>;

    /// Spawn the process.
    fn start(&mut self) -> std::io::Result<()>;

    /// Wait for the process to exit.
    ///
    /// Returns an error for non-zero exits and signal termination; the
    /// code is then available from [`last_exit_code`](ProcessHandle::last_exit_code).
    fn wait(&mut self) -> impl Future<Output = crate::Result<()>> + Send;

    /// Ask the process to terminate immediately.
    fn kill(&mut self) -> std::io::Result<()>;

    /// Exit code recorded by the last wait, or -1 if none is known.
    fn last_exit_code(&self) -> i32;
}

/// A pipe requested before spawn and handed over once the process starts.
///
/// Reads stay pending until the pipe arrives. If the process never starts
/// the stream reports EOF.
#[derive(Debug)]
pub(crate) enum PendingPipe<R> {
    Waiting(oneshot::Receiver<R>),
    Open(R),
    Closed,
}

impl<R> PendingPipe<R> {
    pub(crate) fn new() -> (oneshot::Sender<R>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self::Waiting(rx))
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for PendingPipe<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        loop {
            match this {
                Self::Waiting(rx) => {
                    let handed_over = ready!(Pin::new(rx).poll(cx));
                    *this = match handed_over {
                        Ok(pipe) => Self::Open(pipe),
                        Err(_) => Self::Closed,
                    };
                }
                Self::Open(pipe) => return Pin::new(pipe).poll_read(cx, buf),
                Self::Closed => return Poll::Ready(Ok(())),
            }
        }
    }
}

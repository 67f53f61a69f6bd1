//! Line reader turning a byte stream into tagged line events.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::event::{LineEvent, Origin};
use crate::context::CancelContext;

/// Spawn a task reading `source` line by line.
///
/// The returned receiver yields one [`LineEvent`] per line, in order.
/// Bytes that are not valid UTF-8 are replaced, never treated as an error.
/// An I/O error is reported once as a failed event and ends the sequence.
/// The task stops as soon as `ctx` is done or the receiver is dropped.
pub fn read_lines<R>(
    ctx: &CancelContext,
    source: R,
    origin: Origin,
    capacity: usize,
) -> mpsc::Receiver<LineEvent>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let ctx = ctx.clone();

    tokio::spawn(async move {
        let mut reader = BufReader::new(source);
        let mut buf = Vec::new();
        let mut count = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                () = ctx.done() => {
                    debug!(%origin, count, "line reader: cancelled");
                    break;
                }
                next = reader.read_until(b'\n', &mut buf) => next,
            };

            let event = match next {
                Ok(0) => {
                    debug!(%origin, count, "line reader: EOF");
                    break;
                }
                Ok(_) => {
                    let event = LineEvent::line(origin, decode_line(&buf));
                    buf.clear();
                    event
                }
                Err(e) => {
                    debug!(%origin, error = %e, "line reader: read failed");
                    LineEvent::failed(origin, e)
                }
            };
            let terminal = event.is_error();

            tokio::select! {
                biased;
                () = ctx.done() => {
                    debug!(%origin, count, "line reader: cancelled while emitting");
                    break;
                }
                sent = tx.send(event) => {
                    if sent.is_err() {
                        debug!(%origin, "line reader: channel closed");
                        break;
                    }
                }
            }

            if terminal {
                break;
            }
            count += 1;
            trace!(%origin, count, "line reader: emitted line");
        }
    });

    rx
}

/// Strip a trailing `\n` or `\r\n` and decode lossily.
fn decode_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

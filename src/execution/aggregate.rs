//! Buffering mode: collect every line into one result event.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::event::{AggregatedResult, LineEvent, Origin, OutputEvent};
use crate::context::CancelContext;
use crate::error::CommandError;

/// Accumulates merged lines by stream.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    result: AggregatedResult,
    error: Option<CommandError>,
}

impl ResultAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one merged event.
    ///
    /// The first read error is kept for the final event; later ones are
    /// only logged.
    pub fn push(&mut self, line: LineEvent) {
        if let Some(e) = line.error {
            if self.error.is_none() {
                self.error = Some(e);
            } else {
                warn!(origin = %line.origin, error = %e, "aggregator: additional read error");
            }
            return;
        }
        match line.origin {
            Origin::Stdout => self.result.stdout.push(line.text),
            Origin::Stderr => self.result.stderr.push(line.text),
        }
    }

    /// Lines collected so far.
    pub fn result(&self) -> &AggregatedResult {
        &self.result
    }

    /// Build the single event published for this execution.
    pub fn finish(self) -> OutputEvent {
        OutputEvent::Aggregated {
            result: self.result,
            error: self.error,
        }
    }
}

/// Drain `merged` and publish one aggregated event on `events`.
///
/// When the context is done by the time the merge ends, the event carries
/// the cancellation error (unless a read error was recorded) and the send
/// is attempted for at most `grace`.
pub(crate) async fn aggregate(
    ctx: CancelContext,
    mut merged: mpsc::Receiver<LineEvent>,
    events: mpsc::Sender<OutputEvent>,
    grace: Duration,
) {
    let mut aggregator = ResultAggregator::new();
    while let Some(line) = merged.recv().await {
        aggregator.push(line);
    }

    let cancelled = ctx.err();
    if let Some(reason) = cancelled {
        if aggregator.error.is_none() {
            aggregator.error = Some(CommandError::Cancelled(reason));
        }
    }
    debug!(
        stdout = aggregator.result.stdout.len(),
        stderr = aggregator.result.stderr.len(),
        "aggregator: merged output ended"
    );

    let event = aggregator.finish();
    if cancelled.is_some() {
        match tokio::time::timeout(grace, events.send(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => debug!("aggregator: event receiver dropped"),
            Err(_) => debug!("aggregator: final event not taken within grace period"),
        }
    } else if events.send(event).await.is_err() {
        debug!("aggregator: event receiver dropped");
    }
}

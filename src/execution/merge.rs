//! Fan-in of several line sequences into one delivery channel.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, trace};

use super::event::LineEvent;
use crate::context::CancelContext;

/// Output of [`merge`].
#[derive(Debug)]
pub struct MergedLines {
    /// Interleaved events of every source.
    pub lines: mpsc::Receiver<LineEvent>,
    /// Fires once every source ended and the merged sender side is closed.
    pub reads_done: oneshot::Receiver<()>,
}

/// Merge `sources` into one channel.
///
/// Order within a source is preserved; order across sources is not. The
/// merged channel ends only after every source ended. Once `ctx` is done,
/// forwarders drop the event they hold and stop without draining their
/// source.
pub fn merge(
    ctx: &CancelContext,
    sources: Vec<mpsc::Receiver<LineEvent>>,
    capacity: usize,
) -> MergedLines {
    let (tx, rx) = mpsc::channel(capacity);
    let (done_tx, done_rx) = oneshot::channel();

    let mut forwarders = JoinSet::new();
    for (index, source) in sources.into_iter().enumerate() {
        forwarders.spawn(forward(ctx.clone(), index, source, tx.clone()));
    }
    // Only forwarders may hold senders, so the channel closes when they finish.
    drop(tx);

    tokio::spawn(async move {
        let mut forwarded = 0usize;
        while let Some(joined) = forwarders.join_next().await {
            match joined {
                Ok(count) => forwarded += count,
                Err(e) => error!("merge forwarder failed: {}", e),
            }
        }
        debug!(forwarded, "merge: all sources exhausted");
        if done_tx.send(()).is_err() {
            trace!("merge: completion gate dropped");
        }
    });

    MergedLines {
        lines: rx,
        reads_done: done_rx,
    }
}

async fn forward(
    ctx: CancelContext,
    index: usize,
    mut source: mpsc::Receiver<LineEvent>,
    sink: mpsc::Sender<LineEvent>,
) -> usize {
    let mut count = 0usize;

    loop {
        let event = tokio::select! {
            biased;
            () = ctx.done() => {
                debug!(source = index, count, "merge forwarder: cancelled");
                break;
            }
            event = source.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        tokio::select! {
            biased;
            () = ctx.done() => {
                debug!(source = index, count, "merge forwarder: abandoned event");
                break;
            }
            sent = sink.send(event) => {
                if sent.is_err() {
                    debug!(source = index, "merge forwarder: merged channel closed");
                    break;
                }
            }
        }
        count += 1;
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::event::Origin;
    use std::time::Duration;

    fn source(origin: Origin, lines: &[&str]) -> mpsc::Receiver<LineEvent> {
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            tx.try_send(LineEvent::line(origin, *line)).unwrap();
        }
        rx
    }

    async fn drain(merged: &mut MergedLines) -> Vec<LineEvent> {
        let mut events = Vec::new();
        while let Some(event) = tokio::time::timeout(Duration::from_secs(1), merged.lines.recv())
            .await
            .unwrap()
        {
            events.push(event);
        }
        events
    }

    fn texts(events: &[LineEvent], origin: Origin) -> Vec<&str> {
        events
            .iter()
            .filter(|e| e.origin == origin)
            .map(|e| e.text.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_merge_preserves_per_source_order() {
        let ctx = CancelContext::background();
        let mut merged = merge(
            &ctx,
            vec![
                source(Origin::Stdout, &["1", "2", "3"]),
                source(Origin::Stderr, &["a", "b"]),
            ],
            1,
        );

        let events = drain(&mut merged).await;
        assert_eq!(events.len(), 5);
        assert_eq!(texts(&events, Origin::Stdout), vec!["1", "2", "3"]);
        assert_eq!(texts(&events, Origin::Stderr), vec!["a", "b"]);

        tokio::time::timeout(Duration::from_secs(1), merged.reads_done)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_merge_waits_for_slow_source() {
        let ctx = CancelContext::background();
        let (slow_tx, slow_rx) = mpsc::channel(1);
        let mut merged = merge(&ctx, vec![source(Origin::Stdout, &["fast"]), slow_rx], 1);

        let first = merged.lines.recv().await.unwrap();
        assert_eq!(first.text, "fast");

        // One source ended, the other is still open: no completion yet.
        let pending = tokio::time::timeout(Duration::from_millis(50), merged.lines.recv()).await;
        assert!(pending.is_err());

        slow_tx
            .send(LineEvent::line(Origin::Stderr, "slow"))
            .await
            .unwrap();
        drop(slow_tx);

        let events = drain(&mut merged).await;
        assert_eq!(texts(&events, Origin::Stderr), vec!["slow"]);
        assert!(merged.reads_done.await.is_ok());
    }

    #[tokio::test]
    async fn test_merge_no_sources() {
        let ctx = CancelContext::background();
        let mut merged = merge(&ctx, Vec::new(), 1);
        assert!(merged.lines.recv().await.is_none());
        assert!(merged.reads_done.await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_completes_without_draining() {
        let ctx = CancelContext::background();
        // Sources stay open and full; nobody reads the merged side.
        let (_out_tx, out_rx) = mpsc::channel(4);
        let (_err_tx, err_rx) = mpsc::channel(4);
        let merged = merge(&ctx, vec![out_rx, err_rx], 1);

        ctx.cancel();
        tokio::time::timeout(Duration::from_secs(1), merged.reads_done)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_abandons_blocked_send() {
        let ctx = CancelContext::background();
        let mut merged = merge(
            &ctx,
            vec![source(Origin::Stdout, &["1", "2", "3", "4"])],
            1,
        );

        // Let the forwarder fill the merged buffer and block.
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.cancel();

        tokio::time::timeout(Duration::from_secs(1), &mut merged.reads_done)
            .await
            .unwrap()
            .unwrap();
        let events = drain(&mut merged).await;
        assert!(events.len() < 4);
    }
}

//! Stream throttling utilities

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

use crate::types::TelemetryPacket;

/// Items that carry a position in a sequence.
pub trait Sequenced {
    fn sequence_number(&self) -> u32;
}

impl Sequenced for TelemetryPacket {
    fn sequence_number(&self) -> u32 {
        self.sequence_number
    }
}

/// Extension trait to add throttling to any Stream of sequenced items
pub trait ThrottleExt: Stream {
    /// Throttle the stream to emit at most once per interval
    ///
    /// Of the items that arrive during an interval only the one with the
    /// highest sequence number is emitted, so a late retransmission or a
    /// backfilled gap never replaces a newer reading on a display.
    fn throttle(self, duration: Duration) -> Throttle<Self>
    where
        Self: Sized,
        Self::Item: Sequenced,
    {
        Throttle::new(self, duration)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// A stream combinator that throttles emission rate
    pub struct Throttle<S: Stream> {
        #[pin]
        stream: S,
        interval: Interval,
        pending: Option<S::Item>,
        exhausted: bool,
    }
}

impl<S: Stream> Throttle<S>
where
    S::Item: Sequenced,
{
    /// Create a new throttled stream
    pub fn new(stream: S, duration: Duration) -> Self {
        let mut interval = interval(duration);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self { stream, interval, pending: None, exhausted: false }
    }
}

impl<S: Stream> Stream for Throttle<S>
where
    S::Item: Sequenced,
{
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        // Drain everything available, keeping the newest sequence
        while !*this.exhausted {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => {
                    let newer = this
                        .pending
                        .as_ref()
                        .is_none_or(|held| item.sequence_number() >= held.sequence_number());
                    if newer {
                        *this.pending = Some(item);
                    }
                }
                Poll::Ready(None) => *this.exhausted = true,
                Poll::Pending => break,
            }
        }

        if this.pending.is_none() {
            return if *this.exhausted { Poll::Ready(None) } else { Poll::Pending };
        }

        // Flush the last held item as soon as the source ends
        if !*this.exhausted {
            ready!(this.interval.poll_tick(cx));
        }
        Poll::Ready(this.pending.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::packet;
    use futures::StreamExt;
    use tokio::sync::mpsc;
    use tokio::time::Instant;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    #[tokio::test(start_paused = true)]
    async fn keeps_highest_sequence_per_interval() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut throttled = UnboundedReceiverStream::new(rx).throttle(Duration::from_millis(100));

        tx.send(packet(5, 0.0, 0.0, 0.0)).unwrap();
        tx.send(packet(4, 0.0, 0.0, 0.0)).unwrap();
        assert_eq!(throttled.next().await.unwrap().sequence_number, 5);

        let start = Instant::now();
        tx.send(packet(6, 0.0, 0.0, 0.0)).unwrap();
        tx.send(packet(8, 0.0, 0.0, 0.0)).unwrap();
        tx.send(packet(7, 0.0, 0.0, 0.0)).unwrap();
        assert_eq!(throttled.next().await.unwrap().sequence_number, 8);
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_held_item_when_source_ends() {
        let source = futures::stream::iter([2, 9, 3].map(|seq| packet(seq, 0.0, 0.0, 0.0)));
        let out: Vec<u32> = source.throttle(Duration::from_secs(1)).map(|p| p.sequence_number).collect().await;
        assert_eq!(out, vec![9]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_source_ends() {
        let source = futures::stream::iter(Vec::<TelemetryPacket>::new());
        assert!(source.throttle(Duration::from_secs(1)).next().await.is_none());
    }
}

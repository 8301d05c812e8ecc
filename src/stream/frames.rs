//! Polling stream over a frame ring

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

use crate::ring::FrameReader;
use crate::types::ScanFrame;

pin_project! {
    /// Async view of a [`FrameReader`].
    ///
    /// Yields a ready frame immediately; otherwise sleeps until the next poll
    /// tick and checks again. The ring has no wakeup, so `poll_interval` bounds
    /// the added latency. Never ends on its own.
    pub struct FrameStream {
        reader: FrameReader,
        interval: Interval,
    }
}

impl FrameStream {
    /// Create a stream polling every `poll_interval`.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if `poll_interval` is zero.
    pub fn new(reader: FrameReader, poll_interval: Duration) -> Self {
        let mut interval = interval(poll_interval);
        // Don't burst after a slow consumer
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self { reader, interval }
    }

    pub fn reader(&self) -> &FrameReader {
        &self.reader
    }
}

impl Stream for FrameStream {
    type Item = ScanFrame;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        loop {
            if let Some(frame) = this.reader.try_take() {
                return Poll::Ready(Some(frame));
            }
            ready!(this.interval.poll_tick(cx));
        }
    }
}

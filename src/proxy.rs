//! Consumer-side scan proxy
//!
//! [`ScanProxy`] owns a [`Receiver`], a [`Reassembler`] running inside the
//! receive callback, and the reader half of the frame ring. Application
//! threads poll [`ScanProxy::try_take_frame`]; tokio consumers can use
//! [`ScanProxy::frames`].
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use rangecast::{ProxyConfig, ScanProxy};
//! use std::net::Ipv4Addr;
//!
//! # fn main() -> rangecast::Result<()> {
//! let proxy = ScanProxy::new(ProxyConfig::multicast(Ipv4Addr::new(239, 110, 88, 88), 8800))?;
//! proxy.start()?;
//!
//! loop {
//!     if let Some(frame) = proxy.try_take_frame() {
//!         println!("frame {} with {} nodes", frame.seq, frame.valid_count());
//!     }
//!     # break;
//! }
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ProxyConfig;
use crate::reassembly::{Outcome, Reassembler};
use crate::ring::{FrameReader, frame_ring};
use crate::stream::FrameStream;
use crate::transport::{Datagram, Receiver};
use crate::types::{ScanFrame, seq_after};
use crate::{DropReason, Result};

/// Snapshot of proxy counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyStats {
    /// Datagrams received
    pub messages: u64,
    pub frames_completed: u64,
    /// Frames handed to readers
    pub frames_delivered: u64,
    /// Frames skipped between consecutive completed sequence numbers
    pub frames_lost: u64,
    pub malformed: u64,
    pub sequence_gaps: u64,
    pub buffer_full: u64,
    pub bogus_writes: u64,
}

impl ProxyStats {
    /// Datagrams that did not contribute to a frame.
    pub fn dropped(&self) -> u64 {
        self.malformed + self.sequence_gaps + self.buffer_full + self.bogus_writes
    }
}

#[derive(Debug, Default)]
struct Counters {
    messages: AtomicU64,
    frames_completed: AtomicU64,
    frames_lost: AtomicU64,
    malformed: AtomicU64,
    sequence_gaps: AtomicU64,
    buffer_full: AtomicU64,
    bogus_writes: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: &Outcome) {
        let counter = match outcome {
            Outcome::Started { .. } | Outcome::Continued { .. } => return,
            Outcome::Completed { .. } => &self.frames_completed,
            Outcome::Dropped(DropReason::MalformedPacket { .. }) => &self.malformed,
            Outcome::Dropped(DropReason::SequenceGap { .. }) => &self.sequence_gaps,
            Outcome::Dropped(DropReason::BufferFull { .. }) => &self.buffer_full,
            Outcome::Dropped(DropReason::BogusWrite { .. }) => &self.bogus_writes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Frames skipped between consecutive completed sequence numbers.
///
/// Only forward moves count; a completion at or behind the newest one seen
/// (a stale frame or a restarted publisher) is ignored until the stream passes
/// it again.
#[derive(Debug, Default)]
struct LossTracker {
    newest: Option<u32>,
}

impl LossTracker {
    /// Record a completed frame and return how many frames were skipped before it.
    fn complete(&mut self, seq: u32) -> u32 {
        match self.newest {
            Some(newest) if !seq_after(seq, newest) => 0,
            Some(newest) => {
                self.newest = Some(seq);
                seq.wrapping_sub(newest) - 1
            }
            None => {
                self.newest = Some(seq);
                0
            }
        }
    }
}

/// Receives fragments, reassembles frames, and buffers them for polling.
pub struct ScanProxy {
    receiver: Receiver,
    reader: FrameReader,
    counters: Arc<Counters>,
    config: ProxyConfig,
}

impl ScanProxy {
    /// Bind the receiver and install the reassembly callback. Does not start
    /// listening.
    pub fn new(config: ProxyConfig) -> Result<Self> {
        config.validate()?;

        let receiver = Receiver::init_on_interface(
            config.interface,
            config.group,
            config.port,
            config.reuse_port,
        )?;
        let (writer, reader) = frame_ring(config.capacity);
        let counters = Arc::new(Counters::default());

        let mut reassembler = Reassembler::new(writer);
        let mut losses = LossTracker::default();
        let callback_counters = Arc::clone(&counters);
        receiver.set_callback(move |datagram: Datagram<'_>| {
            callback_counters.messages.fetch_add(1, Ordering::Relaxed);

            let outcome = reassembler.handle_datagram(datagram.payload);
            if let Outcome::Completed { seq } = outcome {
                let skipped = losses.complete(seq);
                if skipped > 0 {
                    debug!(seq, skipped, source = %datagram.source, "Frames lost");
                    callback_counters
                        .frames_lost
                        .fetch_add(u64::from(skipped), Ordering::Relaxed);
                }
            }
            callback_counters.record(&outcome);
        });

        info!(addr = %receiver.local_addr(), capacity = config.capacity, "Scan proxy ready");
        Ok(Self { receiver, reader, counters, config })
    }

    /// Start receiving; restarts the loop if already running.
    pub fn start(&self) -> Result<()> {
        self.receiver.start_listen()
    }

    pub fn stop(&self) {
        self.receiver.stop_listen();
    }

    pub fn is_running(&self) -> bool {
        self.receiver.is_listening()
    }

    /// Take the oldest ready frame, if any. Never blocks.
    pub fn try_take_frame(&self) -> Option<ScanFrame> {
        self.reader.try_take()
    }

    /// Like [`try_take_frame`](Self::try_take_frame), copying into `out`.
    pub fn try_take_frame_into(&self, out: &mut ScanFrame) -> bool {
        self.reader.try_take_into(out)
    }

    /// Datagrams received since construction.
    pub fn message_count(&self) -> u64 {
        self.counters.messages.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> ProxyStats {
        let c = &self.counters;
        ProxyStats {
            messages: c.messages.load(Ordering::Relaxed),
            frames_completed: c.frames_completed.load(Ordering::Relaxed),
            frames_delivered: self.reader.delivered(),
            frames_lost: c.frames_lost.load(Ordering::Relaxed),
            malformed: c.malformed.load(Ordering::Relaxed),
            sequence_gaps: c.sequence_gaps.load(Ordering::Relaxed),
            buffer_full: c.buffer_full.load(Ordering::Relaxed),
            bogus_writes: c.bogus_writes.load(Ordering::Relaxed),
        }
    }

    /// A reader handle for polling from other threads.
    pub fn reader(&self) -> FrameReader {
        self.reader.clone()
    }

    /// Stream of frames polled every `poll_interval`. Requires a tokio runtime.
    pub fn frames(&self, poll_interval: Duration) -> FrameStream {
        FrameStream::new(self.reader(), poll_interval)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.receiver.local_addr()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

impl Drop for ScanProxy {
    fn drop(&mut self) {
        self.receiver.close();
    }
}

impl std::fmt::Debug for ScanProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanProxy")
            .field("receiver", &self.receiver)
            .field("stats", &self.stats())
            .finish()
    }
}

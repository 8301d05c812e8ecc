//! Producer side: pull frames from a sensor and multicast them
//!
//! A [`ScanSource`] yields complete frames (the vendor driver implements it
//! outside this crate). [`ScanPublisher`] numbers each frame, splits it into
//! six fragments and sends them through a [`Sender`], either one frame per
//! [`publish_one`](ScanPublisher::publish_one) call or continuously on a
//! background [`Worker`].
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use rangecast::publisher::{ScanPublisher, ScanSource};
//! use rangecast::{PublisherConfig, ScanFrame, SourceError};
//!
//! struct Lidar;
//!
//! impl ScanSource for Lidar {
//!     fn next_frame(&mut self) -> Result<ScanFrame, SourceError> {
//!         // Block on the device until a full revolution is available
//!         Ok(ScanFrame::new())
//!     }
//! }
//!
//! # fn main() -> rangecast::Result<()> {
//! let config = PublisherConfig::from_yaml_str("ttl: 16\nchannels: [\"239.110.88.88:8800\"]")?;
//! let handle = ScanPublisher::from_config(Lidar, &config)?.spawn()?;
//! // ...
//! let stats = handle.stop();
//! println!("published {} frames", stats.frames);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use crate::config::PublisherConfig;
use crate::sync::Worker;
use crate::transport::Sender;
use crate::types::wire::{FRAGMENT_WIRE_SIZE, FragmentBytes};
use crate::types::{NODE_COUNT, ScanFrame};
use crate::{PublishError, Result, SourceError};

/// Consecutive failed publishes after which the background loop gives up.
pub const MAX_SOURCE_ERRORS: u32 = 10;

const BACKOFF_BASE_MS: u64 = 50;
const BACKOFF_MAX_MS: u64 = 1_000;

/// Supplier of complete frames.
pub trait ScanSource: Send + 'static {
    /// Block until the next full frame is available.
    ///
    /// `seq` is assigned by the publisher; whatever the source puts there is
    /// overwritten.
    fn next_frame(&mut self) -> std::result::Result<ScanFrame, SourceError>;
}

impl<F> ScanSource for F
where
    F: FnMut() -> std::result::Result<ScanFrame, SourceError> + Send + 'static,
{
    fn next_frame(&mut self) -> std::result::Result<ScanFrame, SourceError> {
        self()
    }
}

/// Assigns wrapping sequence numbers to outgoing frames.
#[derive(Debug, Clone, Default)]
pub struct Fragmenter {
    next_seq: u32,
}

impl Fragmenter {
    pub fn new(start_seq: u32) -> Self {
        Self { next_seq: start_seq }
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    /// Number the frame and return its sequence number.
    pub fn stamp(&mut self, frame: &mut ScanFrame) -> u32 {
        let seq = self.next_seq;
        frame.seq = seq;
        self.next_seq = seq.wrapping_add(1);
        seq
    }

    /// Number the frame and encode its fragments in sub-sequence order.
    pub fn encode<'f>(
        &mut self,
        frame: &'f mut ScanFrame,
    ) -> impl Iterator<Item = FragmentBytes> + use<'f> {
        self.stamp(frame);
        frame.fragments().map(|fragment| fragment.to_bytes())
    }
}

/// Result of one publish step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Published {
    pub seq: u32,
    /// Bytes accepted across all channels and fragments
    pub bytes: usize,
}

/// Pulls frames from a [`ScanSource`] and sends them as fragments.
pub struct ScanPublisher<S> {
    source: S,
    sender: Sender,
    fragmenter: Fragmenter,
}

impl<S: ScanSource> ScanPublisher<S> {
    pub fn new(source: S, sender: Sender) -> Self {
        Self { source, sender, fragmenter: Fragmenter::default() }
    }

    /// Open a sender with the configured TTL and channels.
    pub fn from_config(source: S, config: &PublisherConfig) -> Result<Self> {
        config.validate()?;
        let mut sender = Sender::init(config.ttl)?;
        for channel in &config.channels {
            sender.add_channel(*channel);
        }
        Ok(Self::new(source, sender))
    }

    /// Start numbering at `seq` instead of 0.
    pub fn with_start_seq(mut self, seq: u32) -> Self {
        self.fragmenter = Fragmenter::new(seq);
        self
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    /// Pull one frame, fragment it and send all six fragments.
    pub fn publish_one(&mut self) -> std::result::Result<Published, PublishError> {
        let mut frame = self.source.next_frame()?;

        let count = frame.count as usize;
        if count > NODE_COUNT {
            return Err(SourceError::TooManyNodes { count }.into());
        }
        frame.angle[count..].fill(0);
        frame.distance[count..].fill(0);
        frame.quality[count..].fill(0);

        let seq = self.fragmenter.next_seq();
        let mut bytes = 0;
        for encoded in self.fragmenter.encode(&mut frame) {
            bytes += self.sender.send(&encoded)?;
        }

        trace!(seq, count, bytes, "Frame published");
        if bytes == 0 {
            debug!(seq, "Frame reached no channel");
        }
        Ok(Published { seq, bytes })
    }

    /// Run the publish loop on a background thread until stopped.
    pub fn spawn(self) -> Result<PublisherHandle> {
        let stats = Arc::new(PublisherCounters::default());
        let worker_stats = Arc::clone(&stats);
        let mut publisher = self;

        let worker = Worker::spawn("scan-publisher", move |cancel| {
            info!("Publish loop started");
            let mut consecutive_errors = 0u32;

            while !cancel.is_cancelled() {
                match publisher.publish_one() {
                    Ok(published) => {
                        consecutive_errors = 0;
                        worker_stats.frames.fetch_add(1, Ordering::Relaxed);
                        worker_stats.bytes.fetch_add(published.bytes as u64, Ordering::Relaxed);
                    }
                    Err(e) => {
                        consecutive_errors += 1;
                        worker_stats.errors.fetch_add(1, Ordering::Relaxed);

                        if !e.is_retryable() || consecutive_errors >= MAX_SOURCE_ERRORS {
                            error!(error = %e, consecutive_errors, "Publish loop giving up");
                            break;
                        }

                        let backoff = backoff_delay(consecutive_errors);
                        warn!(error = %e, consecutive_errors, ?backoff, "Publish failed, retrying");
                        thread::sleep(backoff);
                    }
                }
            }

            info!(frames = worker_stats.frames.load(Ordering::Relaxed), "Publish loop ended");
        })?;

        Ok(PublisherHandle { worker, stats })
    }
}

/// Delay before retrying after the `consecutive_errors`-th failure in a row:
/// the base delay, doubling per further failure, capped.
fn backoff_delay(consecutive_errors: u32) -> Duration {
    let doublings = consecutive_errors.saturating_sub(1).min(5);
    Duration::from_millis((BACKOFF_BASE_MS << doublings).min(BACKOFF_MAX_MS))
}

#[derive(Debug, Default)]
struct PublisherCounters {
    frames: AtomicU64,
    bytes: AtomicU64,
    errors: AtomicU64,
}

/// Snapshot of publish loop counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStats {
    pub frames: u64,
    pub bytes: u64,
    /// Failed publish steps, consecutive or not
    pub errors: u64,
}

/// Control handle for a spawned publish loop.
///
/// Dropping the handle stops the loop. Cancellation is observed between
/// frames, so a stop waits for the source's current `next_frame` to return.
#[derive(Debug)]
pub struct PublisherHandle {
    worker: Worker,
    stats: Arc<PublisherCounters>,
}

impl PublisherHandle {
    pub fn stats(&self) -> PublisherStats {
        PublisherStats {
            frames: self.stats.frames.load(Ordering::Relaxed),
            bytes: self.stats.bytes.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
        }
    }

    /// The loop ended, either stopped or after too many errors.
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Stop the loop and return final counters.
    pub fn stop(self) -> PublisherStats {
        let stats = Arc::clone(&self.stats);
        self.worker.stop();
        PublisherStats {
            frames: stats.frames.load(Ordering::Relaxed),
            bytes: stats.bytes.load(Ordering::Relaxed),
            errors: stats.errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SyntheticSource;
    use crate::types::{Channel, Fragment, LAST_SUBSEQ};
    use std::net::{Ipv4Addr, UdpSocket};
    use std::time::Instant;

    fn loopback() -> (UdpSocket, Sender) {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
        socket.set_read_timeout(Some(Duration::from_secs(2))).expect("timeout");
        let mut sender = Sender::init(0).expect("sender");
        let port = socket.local_addr().expect("addr").port();
        sender.add_channel(Channel::new(Ipv4Addr::LOCALHOST, port));
        (socket, sender)
    }

    #[test]
    fn fragmenter_numbers_frames_and_wraps() {
        let mut fragmenter = Fragmenter::new(u32::MAX);
        let mut frame = ScanFrame::new();
        assert_eq!(fragmenter.stamp(&mut frame), u32::MAX);
        assert_eq!(frame.seq, u32::MAX);

        let encoded: Vec<_> = fragmenter.encode(&mut frame).collect();
        assert_eq!(encoded.len(), 6);
        for (subseq, bytes) in encoded.iter().enumerate() {
            let fragment = Fragment::decode(bytes).expect("decodes");
            assert_eq!(fragment.seq, 0);
            assert_eq!(fragment.subseq, subseq as u32);
        }
        assert_eq!(fragmenter.next_seq(), 1);
    }

    #[test]
    fn publish_one_sends_six_fragments() {
        let (socket, sender) = loopback();
        let mut publisher = ScanPublisher::new(SyntheticSource::new(), sender).with_start_seq(7);

        let published = publisher.publish_one().expect("publish");
        assert_eq!(published, Published { seq: 7, bytes: 6 * FRAGMENT_WIRE_SIZE });

        let mut buf = [0u8; 1024];
        for subseq in 0..=LAST_SUBSEQ {
            let (len, _) = socket.recv_from(&mut buf).expect("fragment");
            let fragment = Fragment::decode(&buf[..len]).expect("decodes");
            assert_eq!((fragment.seq, fragment.subseq), (7, subseq));
        }
    }

    #[test]
    fn oversized_frames_are_rejected() {
        let (_socket, sender) = loopback();
        let source = || {
            let mut frame = ScanFrame::new();
            frame.count = NODE_COUNT as u32 + 1;
            Ok::<_, SourceError>(frame)
        };
        let mut publisher = ScanPublisher::new(source, sender);
        let err = publisher.publish_one().expect_err("too many nodes");
        assert!(matches!(err, PublishError::Source(SourceError::TooManyNodes { count: 721 })));
    }

    #[test]
    fn tail_beyond_count_is_zeroed() {
        let (socket, sender) = loopback();
        let source = || {
            let mut frame = ScanFrame::new();
            frame.count = 10;
            frame.angle.fill(0xFFFF);
            Ok::<_, SourceError>(frame)
        };
        let mut publisher = ScanPublisher::new(source, sender);
        publisher.publish_one().expect("publish");

        let mut buf = [0u8; 1024];
        let (len, _) = socket.recv_from(&mut buf).expect("fragment 0");
        let fragment = Fragment::decode(&buf[..len]).expect("decodes");
        assert_eq!(fragment.angle[9], 0xFFFF);
        assert_eq!(fragment.angle[10], 0);
    }

    #[test]
    fn backoff_starts_at_base_and_caps() {
        let delays: Vec<u64> = (1..=8).map(|n| backoff_delay(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![50, 100, 200, 400, 800, 1_000, 1_000, 1_000]);
        assert_eq!(backoff_delay(u32::MAX), Duration::from_millis(BACKOFF_MAX_MS));
    }

    #[test]
    fn spawned_loop_gives_up_after_repeated_errors() {
        let (_socket, sender) = loopback();
        let source = || Err::<ScanFrame, _>(SourceError::Grab { reason: "no data".into() });
        let handle = ScanPublisher::new(source, sender).spawn().expect("spawn");

        let deadline = Instant::now() + Duration::from_secs(30);
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(handle.is_finished());
        let stats = handle.stop();
        assert_eq!(stats.errors, u64::from(MAX_SOURCE_ERRORS));
        assert_eq!(stats.frames, 0);
    }

    #[test]
    fn disconnect_ends_the_loop_immediately() {
        let (_socket, sender) = loopback();
        let source =
            || Err::<ScanFrame, _>(SourceError::Disconnected { reason: "unplugged".into() });
        let handle = ScanPublisher::new(source, sender).spawn().expect("spawn");

        let deadline = Instant::now() + Duration::from_secs(2);
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(handle.stop().errors, 1);
    }

    #[test]
    fn spawned_loop_stops_on_request() {
        let (_socket, sender) = loopback();
        let source = SyntheticSource::new().with_interval(Duration::from_millis(2));
        let handle = ScanPublisher::new(source, sender).spawn().expect("spawn");

        thread::sleep(Duration::from_millis(50));
        assert!(handle.stats().frames > 0);
        let stats = handle.stop();
        assert!(stats.frames > 0);
        assert_eq!(stats.bytes, stats.frames * 6 * FRAGMENT_WIRE_SIZE as u64);
    }
}

//! Test utilities: deterministic scan sources and datagram builders
//!
//! Shared by unit tests and the criterion benches (`benchmark` feature).

#![cfg(any(test, feature = "benchmark"))]

use std::thread;
use std::time::{Duration, Instant};

use crate::SourceError;
use crate::publisher::ScanSource;
use crate::types::wire::FragmentBytes;
use crate::types::{FRAGMENT_NODE_COUNT, Fragment, LAST_SUBSEQ, NODE_COUNT, ScanFrame};

/// Nanoseconds one synthetic revolution takes (10 Hz).
pub const SYNTHETIC_SCAN_NS: i64 = 100_000_000;

/// Scan source producing a fixed sweep pattern.
///
/// Node `i` of every frame has angle `i` half-degrees (q6 with the check bit
/// clear), a distance that varies with the frame index, and full quality.
/// Timestamps advance by [`SYNTHETIC_SCAN_NS`] per frame.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    produced: u64,
    interval: Option<Duration>,
    limit: Option<u64>,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self { produced: 0, interval: None, limit: None }
    }

    /// Sleep between frames, like a real sensor.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Report `Disconnected` after `frames` frames.
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    /// The frame this source yields as its `index`-th output.
    pub fn frame_at(index: u64) -> ScanFrame {
        let mut frame = ScanFrame::new();
        frame.ascending = true;
        frame.count = NODE_COUNT as u32;
        frame.scan_begin_ns = index as i64 * SYNTHETIC_SCAN_NS;
        frame.scan_end_ns = frame.scan_begin_ns + SYNTHETIC_SCAN_NS;
        for i in 0..NODE_COUNT {
            frame.angle[i] = ((i as u16) * 32) << 1;
            frame.distance[i] = 4_000 + ((i as u64 + index) % 1_000) as u16;
            frame.quality[i] = 47 << 2;
        }
        frame
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<ScanFrame, SourceError> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return Err(SourceError::Disconnected { reason: "synthetic limit reached".into() });
        }
        if let Some(interval) = self.interval {
            thread::sleep(interval);
        }
        let frame = Self::frame_at(self.produced);
        self.produced += 1;
        Ok(frame)
    }
}

/// Encoded fragment whose first angle of the slice is set to `marker`.
pub fn marked_fragment(seq: u32, subseq: u32, marker: u16) -> FragmentBytes {
    let mut fragment = Fragment::new(seq, subseq);
    fragment.count = NODE_COUNT as u32;
    fragment.angle[0] = marker;
    fragment.to_bytes()
}

/// The six encoded fragments of `frame`, numbered `seq`.
pub fn frame_datagrams(frame: &ScanFrame, seq: u32) -> Vec<FragmentBytes> {
    let mut frame = frame.clone();
    frame.seq = seq;
    frame.fragments().map(|fragment| fragment.to_bytes()).collect()
}

/// Fragments for `frames` consecutive synthetic frames starting at `start_seq`.
pub fn synthetic_stream(start_seq: u32, frames: u32) -> Vec<FragmentBytes> {
    (0..frames)
        .flat_map(|offset| {
            let frame = SyntheticSource::frame_at(u64::from(offset));
            frame_datagrams(&frame, start_seq.wrapping_add(offset))
        })
        .collect()
}

/// Check that every slice of `frame` carries its sub-sequence marker at offset 0.
pub fn has_slice_markers(frame: &ScanFrame) -> bool {
    (0..=LAST_SUBSEQ)
        .all(|subseq| frame.angle[subseq as usize * FRAGMENT_NODE_COUNT] == subseq as u16)
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

//! Fragment reassembly
//!
//! Datagrams are decoded, checked against the expected `(seq, subseq)` and
//! copied into the frame ring. Fragments of a frame must arrive in order; any
//! out-of-order fragment discards the rest of its frame, and the stream
//! resynchronizes on the next sub-sequence 0.
//!
//! ```text
//! expected (0,0) ──(7,0) resync──▶ (7,1) ──(7,1)──▶ (7,2) ... (7,5) ──▶ (8,0)
//!                                    │
//!                                    └──(7,3) gap: dropped, still expect (7,1)
//! ```

use std::fmt;
use tracing::{debug, trace};

use crate::DropReason;
use crate::ring::FrameWriter;
use crate::types::{FIRST_SUBSEQ, Fragment, LAST_SUBSEQ};

/// Expected-position tracker for the fragment stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceTracker {
    expected_seq: u32,
    expected_subseq: u32,
}

impl SequenceTracker {
    pub const fn new() -> Self {
        Self { expected_seq: 0, expected_subseq: FIRST_SUBSEQ }
    }

    /// Next `(seq, subseq)` that is accepted as in-sequence.
    pub const fn expected(&self) -> (u32, u32) {
        (self.expected_seq, self.expected_subseq)
    }

    /// Accept the in-sequence fragment or any sub-sequence 0; reject the rest.
    ///
    /// A rejected fragment leaves the expectation unchanged.
    pub fn observe(&mut self, seq: u32, subseq: u32) -> Result<(), DropReason> {
        let in_sequence = (seq, subseq) == self.expected();
        if !in_sequence && subseq != FIRST_SUBSEQ {
            return Err(DropReason::SequenceGap {
                seq,
                subseq,
                expected_seq: self.expected_seq,
                expected_subseq: self.expected_subseq,
            });
        }

        if subseq == LAST_SUBSEQ {
            self.expected_seq = seq.wrapping_add(1);
            self.expected_subseq = FIRST_SUBSEQ;
        } else {
            self.expected_seq = seq;
            self.expected_subseq = subseq + 1;
        }
        Ok(())
    }
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// What happened to one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// First fragment copied into a fresh slot.
    Started { seq: u32 },
    /// Middle fragment copied.
    Continued { seq: u32, subseq: u32 },
    /// Last fragment copied and the frame published.
    Completed { seq: u32 },
    Dropped(DropReason),
}

impl Outcome {
    pub fn is_dropped(&self) -> bool {
        matches!(self, Outcome::Dropped(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Started { seq } => write!(f, "started {seq}"),
            Outcome::Continued { seq, subseq } => write!(f, "continued {seq}|{subseq}"),
            Outcome::Completed { seq } => write!(f, "completed {seq}"),
            Outcome::Dropped(reason) => write!(f, "dropped: {reason}"),
        }
    }
}

/// Turns a datagram stream into frames in the ring.
///
/// Runs on the receive thread and owns the ring's only writer.
#[derive(Debug)]
pub struct Reassembler {
    tracker: SequenceTracker,
    writer: FrameWriter,
}

impl Reassembler {
    pub fn new(writer: FrameWriter) -> Self {
        Self { tracker: SequenceTracker::new(), writer }
    }

    pub fn expected(&self) -> (u32, u32) {
        self.tracker.expected()
    }

    /// Decode and apply one datagram.
    pub fn handle_datagram(&mut self, bytes: &[u8]) -> Outcome {
        match Fragment::decode(bytes) {
            Ok(fragment) => self.handle_fragment(&fragment),
            Err(reason) => {
                debug!(len = bytes.len(), "Incomplete packet received");
                Outcome::Dropped(reason)
            }
        }
    }

    /// Apply one decoded fragment.
    pub fn handle_fragment(&mut self, fragment: &Fragment) -> Outcome {
        let (seq, subseq) = (fragment.seq, fragment.subseq);

        if let Err(reason) = self.tracker.observe(seq, subseq) {
            trace!(%reason, "Fragment out of sequence");
            return Outcome::Dropped(reason);
        }

        let written = if fragment.is_first() {
            self.writer.begin(fragment)
        } else {
            self.writer.write_fragment(fragment)
        };
        if let Err(reason) = written {
            match reason {
                DropReason::BufferFull { .. } => debug!(seq, "Buffer full, dropping frame"),
                _ => trace!(seq, subseq, "Bogus write entry"),
            }
            return Outcome::Dropped(reason);
        }

        if fragment.is_last() {
            return match self.writer.commit() {
                Some(seq) => {
                    trace!(seq, "Frame committed");
                    Outcome::Completed { seq }
                }
                None => Outcome::Dropped(DropReason::BogusWrite { seq, subseq }),
            };
        }

        if fragment.is_first() {
            Outcome::Started { seq }
        } else {
            Outcome::Continued { seq, subseq }
        }
    }
}

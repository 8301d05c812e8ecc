//! Core types for range-scan streaming.
//!
//! ## Architecture
//!
//! - [`ScanFrame`] is one complete sensor reading: 720 angle/distance/quality
//!   triples plus sequence number and scan timestamps
//! - [`Fragment`] is one datagram carrying a sixth of a frame
//! - [`Channel`] is an IPv4 destination (unicast or multicast group) for a sender
//!
//! The frame/fragment split is fixed: [`FRAGMENTS_PER_FRAME`] fragments of
//! [`FRAGMENT_NODE_COUNT`] nodes each, sent in sub-sequence order
//! [`FIRST_SUBSEQ`]..=[`LAST_SUBSEQ`].
//!
//! ## Usage Example
//!
//! ```rust
//! use rangecast::types::{ScanFrame, FRAGMENT_NODE_COUNT, FRAGMENTS_PER_FRAME};
//!
//! let mut frame = ScanFrame::new();
//! frame.seq = 42;
//! frame.count = 720;
//! frame.angle[FRAGMENT_NODE_COUNT] = 7;
//!
//! let fragments: Vec<_> = frame.fragments().collect();
//! assert_eq!(fragments.len(), FRAGMENTS_PER_FRAME);
//! assert_eq!(fragments[1].angle[0], 7);
//! ```

mod channel;
mod fragment;
mod frame;
pub mod wire;

pub use channel::Channel;
pub use fragment::Fragment;
pub use frame::{ScanFrame, ScanNode};

/// Nodes (angle/distance/quality triples) in one full frame.
pub const NODE_COUNT: usize = 720;

/// Nodes carried by one fragment.
pub const FRAGMENT_NODE_COUNT: usize = 120;

/// Fragments making up one frame.
pub const FRAGMENTS_PER_FRAME: usize = 6;

/// Sub-sequence of the first fragment of a frame.
pub const FIRST_SUBSEQ: u32 = 0;

/// Sub-sequence of the last fragment of a frame.
pub const LAST_SUBSEQ: u32 = (FRAGMENTS_PER_FRAME - 1) as u32;

const _: () = assert!(FRAGMENTS_PER_FRAME * FRAGMENT_NODE_COUNT == NODE_COUNT);

/// Node offset of a fragment's slice inside its frame.
#[inline]
pub const fn fragment_offset(subseq: u32) -> usize {
    subseq as usize * FRAGMENT_NODE_COUNT
}

/// Compare sequence numbers with wraparound using the half-range rule.
/// Returns true if `a` is considered newer than `b`.
pub fn seq_after(a: u32, b: u32) -> bool {
    if a == b {
        return false;
    }
    a.wrapping_sub(b) < 0x8000_0000
}

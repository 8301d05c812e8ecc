//! Frame fragment, the unit carried by one datagram

use std::fmt;

use super::{FRAGMENT_NODE_COUNT, FIRST_SUBSEQ, LAST_SUBSEQ};

/// A sixth of a [`super::ScanFrame`].
///
/// Header fields are duplicated in every fragment of a frame so that any
/// fragment can start or continue a reassembly on its own.
#[derive(Clone, PartialEq, Eq)]
pub struct Fragment {
    pub seq: u32,
    pub subseq: u32,
    pub ascending: bool,
    pub count: u32,
    pub scan_begin_ns: i64,
    pub scan_end_ns: i64,
    pub angle: [u16; FRAGMENT_NODE_COUNT],
    pub distance: [u16; FRAGMENT_NODE_COUNT],
    pub quality: [u8; FRAGMENT_NODE_COUNT],
}

impl Fragment {
    /// Create a zero-payload fragment.
    pub const fn new(seq: u32, subseq: u32) -> Self {
        Self {
            seq,
            subseq,
            ascending: false,
            count: 0,
            scan_begin_ns: 0,
            scan_end_ns: 0,
            angle: [0; FRAGMENT_NODE_COUNT],
            distance: [0; FRAGMENT_NODE_COUNT],
            quality: [0; FRAGMENT_NODE_COUNT],
        }
    }

    /// First fragment of its frame
    #[inline]
    pub fn is_first(&self) -> bool {
        self.subseq == FIRST_SUBSEQ
    }

    /// Last fragment of its frame
    #[inline]
    pub fn is_last(&self) -> bool {
        self.subseq == LAST_SUBSEQ
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("seq", &self.seq)
            .field("subseq", &self.subseq)
            .field("ascending", &self.ascending)
            .field("count", &self.count)
            .field("scan_begin_ns", &self.scan_begin_ns)
            .field("scan_end_ns", &self.scan_end_ns)
            .finish_non_exhaustive()
    }
}

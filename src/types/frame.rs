//! Full range-scan frame

use std::fmt;

use super::{FRAGMENT_NODE_COUNT, FRAGMENTS_PER_FRAME, Fragment, NODE_COUNT, fragment_offset};

/// Right shift applied to raw angle values to drop the check bit.
const ANGLE_SHIFT: u32 = 1;
/// Right shift applied to raw quality values to drop the sync bits.
const QUALITY_SHIFT: u32 = 2;

/// One complete sensor reading.
///
/// Arrays are fixed at [`NODE_COUNT`]; only the first `count` entries are
/// meaningful and the remainder is zero-filled by the producer.
///
/// Raw values are kept in the driver's fixed-point encoding:
/// - `angle`: degrees in q6 with a check bit in bit 0
/// - `distance`: millimetres in q2
/// - `quality`: signal quality in the upper six bits
#[derive(Clone, PartialEq, Eq)]
pub struct ScanFrame {
    /// Frame sequence number (wraps)
    pub seq: u32,
    /// Nodes are sorted by ascending angle
    pub ascending: bool,
    /// Valid node count
    pub count: u32,
    /// Scan start, nanoseconds since the Unix epoch
    pub scan_begin_ns: i64,
    /// Scan end, nanoseconds since the Unix epoch
    pub scan_end_ns: i64,
    pub angle: [u16; NODE_COUNT],
    pub distance: [u16; NODE_COUNT],
    pub quality: [u8; NODE_COUNT],
}

/// One decoded measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanNode {
    pub angle_deg: f32,
    pub distance_mm: f32,
    pub quality: u8,
}

impl ScanFrame {
    /// Create a zeroed frame.
    pub const fn new() -> Self {
        Self {
            seq: 0,
            ascending: false,
            count: 0,
            scan_begin_ns: 0,
            scan_end_ns: 0,
            angle: [0; NODE_COUNT],
            distance: [0; NODE_COUNT],
            quality: [0; NODE_COUNT],
        }
    }

    /// Build the fragment for one sub-sequence.
    ///
    /// # Panics
    ///
    /// Panics if `subseq` is not a valid sub-sequence.
    pub fn fragment(&self, subseq: u32) -> Fragment {
        assert!((subseq as usize) < FRAGMENTS_PER_FRAME, "sub-sequence {} out of range", subseq);

        let start = fragment_offset(subseq);
        let end = start + FRAGMENT_NODE_COUNT;

        let mut fragment = Fragment::new(self.seq, subseq);
        fragment.ascending = self.ascending;
        fragment.count = self.count;
        fragment.scan_begin_ns = self.scan_begin_ns;
        fragment.scan_end_ns = self.scan_end_ns;
        fragment.angle.copy_from_slice(&self.angle[start..end]);
        fragment.distance.copy_from_slice(&self.distance[start..end]);
        fragment.quality.copy_from_slice(&self.quality[start..end]);
        fragment
    }

    /// All fragments of this frame in transmission order.
    pub fn fragments(&self) -> impl Iterator<Item = Fragment> + '_ {
        (0..FRAGMENTS_PER_FRAME as u32).map(move |subseq| self.fragment(subseq))
    }

    /// Copy a fragment's header fields and node slice into this frame.
    ///
    /// The fragment's sub-sequence must already be validated.
    pub fn apply_fragment(&mut self, fragment: &Fragment) {
        let start = fragment_offset(fragment.subseq);
        let end = start + FRAGMENT_NODE_COUNT;

        self.seq = fragment.seq;
        self.ascending = fragment.ascending;
        self.count = fragment.count;
        self.scan_begin_ns = fragment.scan_begin_ns;
        self.scan_end_ns = fragment.scan_end_ns;
        self.angle[start..end].copy_from_slice(&fragment.angle);
        self.distance[start..end].copy_from_slice(&fragment.distance);
        self.quality[start..end].copy_from_slice(&fragment.quality);
    }

    /// Number of valid nodes, clamped to the array length.
    pub fn valid_count(&self) -> usize {
        (self.count as usize).min(NODE_COUNT)
    }

    /// Decode the valid nodes into physical units.
    pub fn nodes(&self) -> impl Iterator<Item = ScanNode> + '_ {
        (0..self.valid_count()).map(move |i| ScanNode {
            angle_deg: (self.angle[i] >> ANGLE_SHIFT) as f32 / 64.0,
            distance_mm: self.distance[i] as f32 / 4.0,
            quality: self.quality[i] >> QUALITY_SHIFT,
        })
    }

    /// Scan duration in nanoseconds, zero if the timestamps are inverted.
    pub fn scan_duration_ns(&self) -> i64 {
        self.scan_end_ns.saturating_sub(self.scan_begin_ns).max(0)
    }
}

impl Default for ScanFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Node arrays are summarized; 2160 numbers are not useful in logs
        f.debug_struct("ScanFrame")
            .field("seq", &self.seq)
            .field("ascending", &self.ascending)
            .field("count", &self.count)
            .field("scan_begin_ns", &self.scan_begin_ns)
            .field("scan_end_ns", &self.scan_end_ns)
            .field("angle[..4]", &&self.angle[..4])
            .field("distance[..4]", &&self.distance[..4])
            .finish_non_exhaustive()
    }
}

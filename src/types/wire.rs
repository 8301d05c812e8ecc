//! Fragment wire format
//!
//! Fixed-size, little-endian, no padding:
//!
//! ```text
//! offset  size  field
//!      0     4  seq            u32
//!      4     4  subseq         u32  (0..=5)
//!      8     4  ascend         u32  (0 or 1)
//!     12     4  count          u32
//!     16     8  scan_begin_ts  i64  nanoseconds
//!     24     8  scan_end_ts    i64  nanoseconds
//!     32   240  angle[120]     u16
//!    272   240  distance[120]  u16
//!    512   120  quality[120]   u8
//!    632        (total)
//! ```
//!
//! A datagram of any other length is rejected before reassembly runs.

use super::{FRAGMENT_NODE_COUNT, Fragment, LAST_SUBSEQ};
use crate::DropReason;

const HEADER_SIZE: usize = 4 * 4 + 8 * 2;
const ANGLE_OFFSET: usize = HEADER_SIZE;
const DISTANCE_OFFSET: usize = ANGLE_OFFSET + FRAGMENT_NODE_COUNT * 2;
const QUALITY_OFFSET: usize = DISTANCE_OFFSET + FRAGMENT_NODE_COUNT * 2;

/// Exact byte length of an encoded fragment.
pub const FRAGMENT_WIRE_SIZE: usize = QUALITY_OFFSET + FRAGMENT_NODE_COUNT;

const _: () = assert!(FRAGMENT_WIRE_SIZE == 632);

/// Encoded fragment bytes.
pub type FragmentBytes = [u8; FRAGMENT_WIRE_SIZE];

impl Fragment {
    /// Encode into a caller-provided buffer.
    pub fn encode_into(&self, out: &mut FragmentBytes) {
        out[0..4].copy_from_slice(&self.seq.to_le_bytes());
        out[4..8].copy_from_slice(&self.subseq.to_le_bytes());
        out[8..12].copy_from_slice(&u32::from(self.ascending).to_le_bytes());
        out[12..16].copy_from_slice(&self.count.to_le_bytes());
        out[16..24].copy_from_slice(&self.scan_begin_ns.to_le_bytes());
        out[24..32].copy_from_slice(&self.scan_end_ns.to_le_bytes());

        for (i, value) in self.angle.iter().enumerate() {
            let at = ANGLE_OFFSET + i * 2;
            out[at..at + 2].copy_from_slice(&value.to_le_bytes());
        }
        for (i, value) in self.distance.iter().enumerate() {
            let at = DISTANCE_OFFSET + i * 2;
            out[at..at + 2].copy_from_slice(&value.to_le_bytes());
        }
        out[QUALITY_OFFSET..].copy_from_slice(&self.quality);
    }

    /// Encode into a new byte array.
    pub fn to_bytes(&self) -> FragmentBytes {
        let mut out = [0u8; FRAGMENT_WIRE_SIZE];
        self.encode_into(&mut out);
        out
    }

    /// Decode a received datagram.
    ///
    /// Fails with [`DropReason::MalformedPacket`] if the length is not exactly
    /// [`FRAGMENT_WIRE_SIZE`] or the sub-sequence is out of range.
    pub fn decode(bytes: &[u8]) -> Result<Self, DropReason> {
        let buf: &FragmentBytes =
            bytes.try_into().map_err(|_| DropReason::MalformedPacket { len: bytes.len() })?;

        let subseq = read_u32(buf, 4);
        if subseq > LAST_SUBSEQ {
            return Err(DropReason::MalformedPacket { len: bytes.len() });
        }

        let mut fragment = Fragment::new(read_u32(buf, 0), subseq);
        fragment.ascending = read_u32(buf, 8) != 0;
        fragment.count = read_u32(buf, 12);
        fragment.scan_begin_ns = read_i64(buf, 16);
        fragment.scan_end_ns = read_i64(buf, 24);

        for i in 0..FRAGMENT_NODE_COUNT {
            fragment.angle[i] = read_u16(buf, ANGLE_OFFSET + i * 2);
            fragment.distance[i] = read_u16(buf, DISTANCE_OFFSET + i * 2);
        }
        fragment.quality.copy_from_slice(&buf[QUALITY_OFFSET..]);

        Ok(fragment)
    }
}

#[inline]
fn read_u16(buf: &FragmentBytes, at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

#[inline]
fn read_u32(buf: &FragmentBytes, at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[inline]
fn read_i64(buf: &FragmentBytes, at: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    i64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn layout_offsets_match_the_wire_table() {
        assert_eq!(HEADER_SIZE, 32);
        assert_eq!(ANGLE_OFFSET, 32);
        assert_eq!(DISTANCE_OFFSET, 272);
        assert_eq!(QUALITY_OFFSET, 512);
    }

    #[test]
    fn header_fields_are_little_endian() {
        let mut fragment = Fragment::new(0x0102_0304, 5);
        fragment.ascending = true;
        fragment.count = 720;
        fragment.scan_begin_ns = -2;
        fragment.angle[0] = 0xABCD;
        fragment.quality[119] = 0xEE;

        let bytes = fragment.to_bytes();
        assert_eq!(&bytes[0..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[4..8], &[5, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[1, 0, 0, 0]);
        assert_eq!(&bytes[12..16], &720u32.to_le_bytes());
        assert_eq!(&bytes[16..24], &[0xFE, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&bytes[32..34], &[0xCD, 0xAB]);
        assert_eq!(bytes[FRAGMENT_WIRE_SIZE - 1], 0xEE);
    }

    #[test]
    fn wrong_lengths_are_malformed() {
        let bytes = Fragment::new(1, 0).to_bytes();
        for len in [0, 1, FRAGMENT_WIRE_SIZE - 1] {
            assert_eq!(Fragment::decode(&bytes[..len]), Err(DropReason::MalformedPacket { len }));
        }

        let mut long = bytes.to_vec();
        long.push(0);
        assert_eq!(
            Fragment::decode(&long),
            Err(DropReason::MalformedPacket { len: FRAGMENT_WIRE_SIZE + 1 })
        );
    }

    #[test]
    fn out_of_range_subsequence_is_malformed() {
        let mut bytes = Fragment::new(1, 0).to_bytes();
        bytes[4] = 6;
        assert!(matches!(Fragment::decode(&bytes), Err(DropReason::MalformedPacket { .. })));
    }

    #[test]
    fn nonzero_ascend_decodes_as_true() {
        let mut bytes = Fragment::new(1, 0).to_bytes();
        bytes[8] = 0;
        bytes[11] = 0x80;
        assert!(Fragment::decode(&bytes).map(|f| f.ascending).unwrap_or(false));
    }

    proptest! {
        #[test]
        fn decode_preserves_payload_values(
            seq in any::<u32>(),
            subseq in 0u32..=LAST_SUBSEQ,
            begin in any::<i64>(),
            angles in prop::collection::vec(any::<u16>(), FRAGMENT_NODE_COUNT),
            qualities in prop::collection::vec(any::<u8>(), FRAGMENT_NODE_COUNT)
        ) {
            let mut fragment = Fragment::new(seq, subseq);
            fragment.scan_begin_ns = begin;
            fragment.angle.copy_from_slice(&angles);
            fragment.quality.copy_from_slice(&qualities);

            let decoded = Fragment::decode(&fragment.to_bytes());
            prop_assert_eq!(decoded, Ok(fragment));
        }
    }
}

//! Fixed-capacity frame ring between the receive thread and consumers
//!
//! One [`FrameWriter`] (owned by the reassembler on the receive thread) and any
//! number of [`FrameReader`] clones share a ring of frame slots. Nothing blocks
//! and nothing allocates after construction.
//!
//! Each slot carries two counters. With `w` the write counter and `r` the read
//! counter (both wrapping):
//!
//! | state         | condition               |
//! |---------------|-------------------------|
//! | empty         | `w` even, `w == r`      |
//! | being written | `w` odd, `w - r == 1`   |
//! | ready         | `w` even, `w - r == 2`  |
//! | being read    | `r` odd                 |
//!
//! The writer bumps `w` to claim (odd) and to publish (even); a reader bumps
//! `r` to claim (odd, by compare-exchange so concurrent readers never share a
//! slot) and to release (even). Publishing stores use `Release` and every
//! observation of the peer's counter uses `Acquire`, so frame contents written
//! before a publish are visible to the reader that claims it, and reads
//! finished before a release happen before the writer reuses the slot.
//!
//! When the writer's current slot is still occupied the incoming frame is
//! dropped; unread frames are never overwritten.
//!
//! ## Usage Example
//!
//! ```rust
//! use rangecast::ring::frame_ring;
//! use rangecast::types::{Fragment, LAST_SUBSEQ};
//!
//! let (mut writer, reader) = frame_ring(4);
//! for subseq in 0..=LAST_SUBSEQ {
//!     let fragment = Fragment::new(1, subseq);
//!     if subseq == 0 {
//!         writer.begin(&fragment).unwrap();
//!     } else {
//!         writer.write_fragment(&fragment).unwrap();
//!     }
//! }
//! assert_eq!(writer.commit(), Some(1));
//! assert_eq!(reader.try_take().map(|frame| frame.seq), Some(1));
//! ```

use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::DropReason;
use crate::types::{Fragment, ScanFrame};

/// Default number of frame slots.
pub const DEFAULT_RING_CAPACITY: usize = 100;

struct SlotData {
    frame: ScanFrame,
    committed_ns: i64,
}

struct Slot {
    write: AtomicU32,
    read: AtomicU32,
    data: UnsafeCell<SlotData>,
}

impl Slot {
    fn new() -> Self {
        Self {
            write: AtomicU32::new(0),
            read: AtomicU32::new(0),
            data: UnsafeCell::new(SlotData { frame: ScanFrame::new(), committed_ns: 0 }),
        }
    }

    fn is_ready(&self) -> bool {
        let write = self.write.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        write & 1 == 0 && write.wrapping_sub(read) == 2
    }
}

struct Shared {
    slots: Box<[Slot]>,
    read_cursor: CachePadded<AtomicUsize>,
    write_cursor: CachePadded<AtomicUsize>,
    delivered: AtomicU64,
}

// SAFETY: `Slot::data` is only touched by the party that holds the slot per the
// counter protocol: the single writer while `w` is odd, or the one reader whose
// compare-exchange made `r` odd. The counters themselves are atomics.
unsafe impl Sync for Shared {}

/// Create a ring with `capacity` slots.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn frame_ring(capacity: usize) -> (FrameWriter, FrameReader) {
    assert!(capacity > 0, "frame ring capacity must be non-zero");

    let slots: Box<[Slot]> = (0..capacity).map(|_| Slot::new()).collect();
    let shared = Arc::new(Shared {
        slots,
        read_cursor: CachePadded::new(AtomicUsize::new(0)),
        write_cursor: CachePadded::new(AtomicUsize::new(0)),
        delivered: AtomicU64::new(0),
    });

    debug!(capacity, "Frame ring allocated");
    (FrameWriter { shared: Arc::clone(&shared), cursor: 0, open: None }, FrameReader { shared })
}

/// Producer half of the ring. There is exactly one per ring.
pub struct FrameWriter {
    shared: Arc<Shared>,
    cursor: usize,
    /// Sequence number of the frame being written into the cursor slot.
    open: Option<u32>,
}

impl FrameWriter {
    /// Claim the current slot and copy the first fragment of a frame into it.
    ///
    /// If a previous frame is still open (its tail never arrived), the slot is
    /// reused in place. Fails with [`DropReason::BufferFull`] when the slot
    /// holds an unread frame.
    pub fn begin(&mut self, fragment: &Fragment) -> Result<(), DropReason> {
        let slot = &self.shared.slots[self.cursor];

        if let Some(abandoned) = self.open {
            debug!(abandoned, seq = fragment.seq, "Restarting open slot for new frame");
        } else {
            let write = slot.write.load(Ordering::Relaxed);
            let read = slot.read.load(Ordering::Acquire);
            if write & 1 != 0 || write != read {
                return Err(DropReason::BufferFull { seq: fragment.seq });
            }
            slot.write.store(write.wrapping_add(1), Ordering::Release);
        }

        // SAFETY: the slot's write counter is odd, so no reader touches `data`.
        unsafe { (*slot.data.get()).frame.apply_fragment(fragment) };
        self.open = Some(fragment.seq);
        Ok(())
    }

    /// Copy a continuation fragment into the open slot.
    ///
    /// Fails with [`DropReason::BogusWrite`] when no frame is open.
    pub fn write_fragment(&mut self, fragment: &Fragment) -> Result<(), DropReason> {
        let bogus = DropReason::BogusWrite { seq: fragment.seq, subseq: fragment.subseq };
        if self.open.is_none() {
            return Err(bogus);
        }

        let slot = &self.shared.slots[self.cursor];
        let write = slot.write.load(Ordering::Relaxed);
        let read = slot.read.load(Ordering::Acquire);
        if write & 1 == 0 || write.wrapping_sub(read) != 1 {
            return Err(bogus);
        }

        // SAFETY: as in `begin`, the odd write counter excludes readers.
        unsafe { (*slot.data.get()).frame.apply_fragment(fragment) };
        Ok(())
    }

    /// Publish the open frame and advance to the next slot.
    ///
    /// Returns the committed sequence number, or `None` when no frame was open.
    pub fn commit(&mut self) -> Option<u32> {
        let seq = self.open.take()?;
        let slot = &self.shared.slots[self.cursor];

        // SAFETY: still held by the writer until the store below.
        unsafe { (*slot.data.get()).committed_ns = unix_nanos() };

        let write = slot.write.load(Ordering::Relaxed);
        slot.write.store(write.wrapping_add(1), Ordering::Release);

        self.cursor = (self.cursor + 1) % self.shared.slots.len();
        self.shared.write_cursor.store(self.cursor, Ordering::Release);
        Some(seq)
    }

    /// Sequence number of the frame currently being written.
    pub fn open_seq(&self) -> Option<u32> {
        self.open
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }
}

impl std::fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter")
            .field("capacity", &self.capacity())
            .field("cursor", &self.cursor)
            .field("open", &self.open)
            .finish()
    }
}

/// Consumer half of the ring. Clones share one read cursor; each ready frame
/// is delivered to exactly one of them.
#[derive(Clone)]
pub struct FrameReader {
    shared: Arc<Shared>,
}

impl FrameReader {
    /// Copy the next ready frame into `out`, without allocating.
    ///
    /// Returns false, leaving `out` untouched, when no frame is ready.
    pub fn try_take_into(&self, out: &mut ScanFrame) -> bool {
        self.take_into(out).is_some()
    }

    /// Take the next ready frame.
    pub fn try_take(&self) -> Option<ScanFrame> {
        let mut frame = ScanFrame::new();
        self.take_into(&mut frame).map(|_| frame)
    }

    /// Take the next ready frame with its commit time in nanoseconds since
    /// the Unix epoch.
    pub fn try_take_stamped(&self) -> Option<(ScanFrame, i64)> {
        let mut frame = ScanFrame::new();
        self.take_into(&mut frame).map(|committed_ns| (frame, committed_ns))
    }

    fn take_into(&self, out: &mut ScanFrame) -> Option<i64> {
        let shared = &*self.shared;
        loop {
            let index = shared.read_cursor.load(Ordering::Acquire);
            let slot = &shared.slots[index];

            let write = slot.write.load(Ordering::Acquire);
            let read = slot.read.load(Ordering::Acquire);
            if write & 1 != 0 || write.wrapping_sub(read) != 2 {
                return None;
            }
            slot.read
                .compare_exchange(read, read.wrapping_add(1), Ordering::AcqRel, Ordering::Acquire)
                .ok()?;

            // A stale cursor means this slot was refilled after another reader
            // moved on; hand it back so frames leave in order.
            if shared.read_cursor.load(Ordering::Acquire) != index {
                slot.read.store(read, Ordering::Release);
                continue;
            }

            // SAFETY: our compare-exchange made `r` odd; the writer will not claim
            // the slot and no other reader can claim it until we release.
            let committed_ns = unsafe {
                let data = &*slot.data.get();
                out.clone_from(&data.frame);
                data.committed_ns
            };

            // Only the holder of the cursor slot moves the cursor, and it does so
            // before releasing the slot to the writer.
            shared.read_cursor.store((index + 1) % shared.slots.len(), Ordering::Release);
            slot.read.store(read.wrapping_add(2), Ordering::Release);
            shared.delivered.fetch_add(1, Ordering::Relaxed);
            return Some(committed_ns);
        }
    }

    /// Number of slots holding a ready, unread frame.
    pub fn pending(&self) -> usize {
        self.shared.slots.iter().filter(|slot| slot.is_ready()).count()
    }

    /// Frames handed out by all readers of this ring.
    pub fn delivered(&self) -> u64 {
        self.shared.delivered.load(Ordering::Relaxed)
    }

    /// Slot index the writer will fill next.
    pub fn write_cursor(&self) -> usize {
        self.shared.write_cursor.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }
}

impl std::fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReader")
            .field("capacity", &self.capacity())
            .field("read_cursor", &self.shared.read_cursor.load(Ordering::Relaxed))
            .field("pending", &self.pending())
            .finish()
    }
}

fn unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FIRST_SUBSEQ, LAST_SUBSEQ};
    use proptest::prelude::*;
    use std::thread;

    fn write_frame(writer: &mut FrameWriter, seq: u32) -> Result<Option<u32>, DropReason> {
        for subseq in FIRST_SUBSEQ..=LAST_SUBSEQ {
            let mut fragment = Fragment::new(seq, subseq);
            fragment.count = 720;
            fragment.angle.fill(subseq as u16 + 1);
            if subseq == FIRST_SUBSEQ {
                writer.begin(&fragment)?;
            } else {
                writer.write_fragment(&fragment)?;
            }
        }
        Ok(writer.commit())
    }

    #[test]
    fn frames_come_out_in_commit_order() {
        let (mut writer, reader) = frame_ring(4);
        assert!(reader.try_take().is_none());

        for seq in 10..13 {
            assert_eq!(write_frame(&mut writer, seq), Ok(Some(seq)));
        }
        assert_eq!(reader.pending(), 3);

        for seq in 10..13 {
            let frame = reader.try_take().expect("ready frame");
            assert_eq!(frame.seq, seq);
            assert_eq!(frame.angle[0], 1);
            assert_eq!(frame.angle[719], 6);
        }
        assert!(reader.try_take().is_none());
        assert_eq!(reader.delivered(), 3);
    }

    #[test]
    fn full_ring_drops_newest() {
        let (mut writer, reader) = frame_ring(2);
        assert_eq!(write_frame(&mut writer, 1), Ok(Some(1)));
        assert_eq!(write_frame(&mut writer, 2), Ok(Some(2)));
        assert_eq!(write_frame(&mut writer, 3), Err(DropReason::BufferFull { seq: 3 }));

        // Continuations of a refused frame have no open slot
        let orphan = Fragment::new(3, 1);
        assert_eq!(
            writer.write_fragment(&orphan),
            Err(DropReason::BogusWrite { seq: 3, subseq: 1 })
        );
        assert_eq!(writer.commit(), None);

        assert_eq!(reader.try_take().map(|f| f.seq), Some(1));
        assert_eq!(write_frame(&mut writer, 4), Ok(Some(4)));
        assert_eq!(reader.try_take().map(|f| f.seq), Some(2));
        assert_eq!(reader.try_take().map(|f| f.seq), Some(4));
        assert!(reader.try_take().is_none());
    }

    #[test]
    fn uncommitted_frame_is_invisible() {
        let (mut writer, reader) = frame_ring(2);
        writer.begin(&Fragment::new(5, 0)).expect("begin");
        writer.write_fragment(&Fragment::new(5, 1)).expect("write");
        assert_eq!(writer.open_seq(), Some(5));
        assert_eq!(reader.pending(), 0);
        assert!(reader.try_take().is_none());
    }

    #[test]
    fn new_frame_restarts_open_slot() {
        let (mut writer, reader) = frame_ring(2);
        let mut stale = Fragment::new(1, 0);
        stale.count = 111;
        writer.begin(&stale).expect("begin");
        writer.write_fragment(&Fragment::new(1, 1)).expect("write");

        // Frame 1 lost its tail; frame 2 starts over in the same slot
        assert_eq!(write_frame(&mut writer, 2), Ok(Some(2)));
        let frame = reader.try_take().expect("frame 2");
        assert_eq!(frame.seq, 2);
        assert_eq!(frame.count, 720);
        assert_eq!(writer.cursor(), 1);
    }

    #[test]
    fn take_into_reuses_caller_buffer() {
        let (mut writer, reader) = frame_ring(1);
        write_frame(&mut writer, 9).expect("write");
        let mut out = ScanFrame::new();
        assert!(reader.try_take_into(&mut out));
        assert_eq!(out.seq, 9);
        assert!(!reader.try_take_into(&mut out));
        assert_eq!(out.seq, 9);
    }

    #[test]
    fn stamped_take_reports_commit_time() {
        let (mut writer, reader) = frame_ring(1);
        write_frame(&mut writer, 3).expect("write");
        let (frame, committed_ns) = reader.try_take_stamped().expect("ready");
        assert_eq!(frame.seq, 3);
        assert!(committed_ns > 0);
    }

    #[test]
    #[should_panic(expected = "capacity must be non-zero")]
    fn zero_capacity_panics() {
        let _ = frame_ring(0);
    }

    #[test]
    fn concurrent_readers_never_duplicate() {
        const FRAMES: u32 = 2_000;
        let (mut writer, reader) = frame_ring(8);

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let reader = reader.clone();
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    let mut frame = ScanFrame::new();
                    loop {
                        if reader.try_take_into(&mut frame) {
                            if frame.seq == u32::MAX {
                                break;
                            }
                            // Every fragment of a frame carries the same seq
                            assert!(frame.angle.iter().all(|&a| (1..=6).contains(&a)));
                            seen.push(frame.seq);
                        } else {
                            thread::yield_now();
                        }
                    }
                    seen
                })
            })
            .collect();

        let mut seq = 0;
        while seq < FRAMES {
            match write_frame(&mut writer, seq) {
                Ok(_) => seq += 1,
                Err(DropReason::BufferFull { .. }) => thread::yield_now(),
                Err(other) => panic!("unexpected {other:?}"),
            }
        }
        let mut stops = 0;
        while stops < 3 {
            if write_frame(&mut writer, u32::MAX).is_ok() {
                stops += 1;
            } else {
                thread::yield_now();
            }
        }

        let mut all: Vec<u32> =
            consumers.into_iter().flat_map(|c| c.join().expect("consumer panicked")).collect();
        all.sort_unstable();
        assert_eq!(all, (0..FRAMES).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn pending_never_exceeds_capacity(
            capacity in 1usize..8,
            ops in prop::collection::vec(any::<bool>(), 1..200)
        ) {
            let (mut writer, reader) = frame_ring(capacity);
            let mut next = 0u32;
            let mut expected = std::collections::VecDeque::new();

            for produce in ops {
                if produce {
                    match write_frame(&mut writer, next) {
                        Ok(Some(seq)) => expected.push_back(seq),
                        Err(DropReason::BufferFull { .. }) => {
                            prop_assert_eq!(expected.len(), capacity);
                        }
                        other => prop_assert!(false, "unexpected {:?}", other),
                    }
                    next += 1;
                } else {
                    prop_assert_eq!(reader.try_take().map(|f| f.seq), expected.pop_front());
                }
                prop_assert!(reader.pending() <= capacity);
                prop_assert_eq!(reader.pending(), expected.len());
            }
        }
    }
}

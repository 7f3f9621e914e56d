//! The shared packet ring.
//!
//! All pipeline stages operate on one fixed-capacity ring of packet slots.
//! Each stage holds a monotonic cursor: the number of slots it has released.
//! Cursors never cross (`pos_0 >= pos_1 >= ... >= pos_{n-1}`) and the input
//! stage never runs more than the ring capacity ahead of the last stage, so
//! a slot range between two adjacent cursors is owned by exactly one stage.
//!
//! That disjoint ownership is why the per-slot mutexes below are uncontended;
//! they exist to keep slot access in safe Rust.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex, MutexGuard};

use tspipe_core::TsPacket;

/// One ring element: a packet plus slot metadata.
#[derive(Debug)]
pub struct PacketSlot {
    /// The packet carried by this slot.
    pub packet: TsPacket,
    /// Filler slots are skipped by downstream stages and never output.
    pub filler: bool,
    /// Monotonic sequence number stamped by the input stage.
    pub sequence: u64,
}

impl PacketSlot {
    fn new() -> Self {
        Self {
            packet: TsPacket::null(),
            filler: true,
            sequence: 0,
        }
    }
}

/// A contiguous window of slots handed to one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRange {
    /// Absolute position of the first slot.
    pub base: u64,
    /// Number of slots in the window.
    pub count: usize,
}

impl SlotRange {
    /// Absolute positions covered by this window.
    pub fn positions(&self) -> Range<u64> {
        self.base..self.base + self.count as u64
    }
}

struct RingState {
    /// Released position per stage, absolute and monotonic.
    pos: Vec<u64>,
    /// Stages that will release nothing further.
    ended: Vec<bool>,
    shutdown: bool,
}

impl RingState {
    /// The cursor bounding what stage `i` may read: the nearest upstream
    /// stage still running, or the frozen cursor of the input when the whole
    /// upstream chain has ended. Returns the bound and whether it is final.
    fn upstream(&self, i: usize) -> (u64, bool) {
        let mut j = i - 1;
        while j > 0 && self.ended[j] {
            j -= 1;
        }
        (self.pos[j], self.ended[j])
    }
}

/// Fixed-capacity ring of packet slots shared by all stages.
pub struct PacketRing {
    capacity: usize,
    slots: Vec<Mutex<PacketSlot>>,
    state: Mutex<RingState>,
    /// One wait channel per stage; stage i blocks here for upstream progress.
    stage_cv: Vec<Condvar>,
    /// The input stage blocks here for slots to be recycled.
    producer_cv: Condvar,
    shutdown: AtomicBool,
}

impl PacketRing {
    /// Create a ring of `capacity` slots serving `stages` stages.
    pub fn new(capacity: usize, stages: usize) -> Self {
        assert!(capacity >= 1, "ring capacity must be at least one slot");
        assert!(stages >= 2, "a pipeline needs at least input and output");
        Self {
            capacity,
            slots: (0..capacity).map(|_| Mutex::new(PacketSlot::new())).collect(),
            state: Mutex::new(RingState {
                pos: vec![0; stages],
                ended: vec![false; stages],
                shutdown: false,
            }),
            stage_cv: (0..stages).map(|_| Condvar::new()).collect(),
            producer_cv: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Ring capacity in slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stages.
    pub fn stages(&self) -> usize {
        self.stage_cv.len()
    }

    /// Whether shutdown was signalled.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Access the slot at an absolute position.
    pub fn slot(&self, position: u64) -> MutexGuard<'_, PacketSlot> {
        self.slots[(position % self.capacity as u64) as usize].lock()
    }

    /// Reserve up to `max` contiguous slots for the input stage.
    ///
    /// Blocks until at least one slot is reusable (the last stage has passed
    /// it). Returns `None` on shutdown or when no consumer remains.
    pub fn input_reserve(&self, max: usize) -> Option<SlotRange> {
        let last = self.stages() - 1;
        let mut state = self.state.lock();
        loop {
            if state.shutdown || state.ended[last] {
                return None;
            }
            let used = (state.pos[0] - state.pos[last]) as usize;
            let free = self.capacity - used;
            if free > 0 {
                let base = state.pos[0];
                let contiguous = self.capacity - (base % self.capacity as u64) as usize;
                let count = max.min(free).min(contiguous);
                return Some(SlotRange { base, count });
            }
            self.producer_cv.wait(&mut state);
        }
    }

    /// Acquire up to `max` contiguous filled slots for stage `i`.
    ///
    /// Blocks until the upstream cursor is strictly ahead. Returns `None` on
    /// shutdown, or when the upstream chain has ended and is fully drained.
    pub fn stage_acquire(&self, i: usize, max: usize) -> Option<SlotRange> {
        assert!(i > 0 && i < self.stages());
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            let (bound, upstream_ended) = state.upstream(i);
            let avail = (bound - state.pos[i]) as usize;
            if avail > 0 {
                let base = state.pos[i];
                let contiguous = self.capacity - (base % self.capacity as u64) as usize;
                let count = max.min(avail).min(contiguous);
                return Some(SlotRange { base, count });
            }
            if upstream_ended {
                return None;
            }
            self.stage_cv[i].wait(&mut state);
        }
    }

    /// Advance stage `i`'s cursor by `count` released slots.
    pub fn stage_release(&self, i: usize, count: usize) {
        if count == 0 {
            return;
        }
        let state = self.state.lock();
        self.release_locked(state, i, count);
    }

    fn release_locked(&self, mut state: MutexGuard<'_, RingState>, i: usize, count: usize) {
        state.pos[i] += count as u64;
        debug_assert!(i == 0 || state.pos[i] <= state.upstream(i).0);

        // Wake the next running stage; when none follows, the released slots
        // are reusable and the producer is woken instead.
        let mut downstream = false;
        for j in i + 1..self.stages() {
            if !state.ended[j] {
                self.stage_cv[j].notify_all();
                downstream = true;
                break;
            }
        }
        if !downstream {
            self.producer_cv.notify_all();
        }
    }

    /// Mark stage `i` finished. Its cursor freezes and downstream stages
    /// re-link to the nearest upstream stage still running.
    pub fn stage_finish(&self, i: usize) {
        let mut state = self.state.lock();
        if state.ended[i] {
            return;
        }
        state.ended[i] = true;
        for cv in &self.stage_cv {
            cv.notify_all();
        }
        self.producer_cv.notify_all();
    }

    /// Signal shutdown and release every waiter.
    pub fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let mut state = self.state.lock();
        state.shutdown = true;
        for cv in &self.stage_cv {
            cv.notify_all();
        }
        self.producer_cv.notify_all();
    }

    #[cfg(test)]
    fn cursor(&self, i: usize) -> u64 {
        self.state.lock().pos[i]
    }
}

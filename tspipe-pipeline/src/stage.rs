//! Per-stage runtime.
//!
//! Each pipeline stage runs one worker loop on its own thread: the input
//! fills reserved slots, processors walk acquired windows applying per-packet
//! verdicts, the output drains. Workers only ever block inside the ring's
//! reserve/acquire operations; a worker always drains its current window
//! before exiting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::buffer::PacketRing;
use crate::termination::TerminationCoordinator;
use tspipe_core::TsPacket;
use tspipe_plugin::{InputPlugin, OutputPlugin, ProcessorPlugin, StageContext, Verdict};

/// Lifecycle of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Built, not yet running.
    Idle,
    /// Worker loop active.
    Running,
    /// The plugin requested an individual end.
    IndividualEnd,
    /// The stage declared joint completion and keeps forwarding packets.
    JointRequested,
    /// The stage ended at the joint termination cutoff.
    JointEnd,
    /// Worker finished and the plugin was stopped.
    Exited,
}

/// How a stage worker came to an end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The input source was exhausted.
    CleanEof,
    /// Ended at the joint termination cutoff.
    JointEnd,
    /// The plugin requested an individual end.
    IndividualEnd,
    /// The upstream chain ended and was fully drained.
    UpstreamEnd,
    /// Shutdown was signalled while the stage was running.
    Aborted,
    /// The plugin reported a failure.
    Error(String),
    /// The stage worker panicked.
    Fatal(String),
}

struct JtState {
    use_jt: bool,
    jt_completed: bool,
}

/// The stage handle a plugin talks to, and the runtime's per-stage record.
pub struct StageHandle {
    name: String,
    index: usize,
    total_packets: AtomicU64,
    dropped_packets: AtomicU64,
    state: Mutex<StageState>,
    jt: Mutex<JtState>,
    coordinator: Arc<TerminationCoordinator>,
    ring: Arc<PacketRing>,
}

impl StageHandle {
    pub(crate) fn new(
        name: impl Into<String>,
        index: usize,
        coordinator: Arc<TerminationCoordinator>,
        ring: Arc<PacketRing>,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            total_packets: AtomicU64::new(0),
            dropped_packets: AtomicU64::new(0),
            state: Mutex::new(StageState::Idle),
            jt: Mutex::new(JtState {
                use_jt: false,
                jt_completed: false,
            }),
            coordinator,
            ring,
        }
    }

    /// Stage index in the pipeline (0 = input).
    pub fn index(&self) -> usize {
        self.index
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StageState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: StageState) {
        *self.state.lock() = state;
    }

    /// Packets this stage dropped.
    pub fn dropped_packets(&self) -> u64 {
        self.dropped_packets.load(Ordering::Relaxed)
    }

    fn add_total(&self, count: u64) {
        self.total_packets.fetch_add(count, Ordering::Relaxed);
    }

    fn add_dropped(&self, count: u64) {
        self.dropped_packets.fetch_add(count, Ordering::Relaxed);
    }

    fn jt_completed(&self) -> bool {
        self.jt.lock().jt_completed
    }
}

impl StageContext for StageHandle {
    fn plugin_name(&self) -> &str {
        &self.name
    }

    fn total_packets(&self) -> u64 {
        self.total_packets.load(Ordering::Relaxed)
    }

    fn use_joint_termination(&self, on: bool) {
        if self.coordinator.ignores_joint_termination() {
            debug!(stage = %self.name, "joint termination globally ignored");
            return;
        }
        let mut jt = self.jt.lock();
        if on != jt.use_jt {
            if on {
                self.coordinator.enter(jt.jt_completed);
            } else {
                self.coordinator.leave(jt.jt_completed);
            }
            jt.use_jt = on;
        }
    }

    fn uses_joint_termination(&self) -> bool {
        self.jt.lock().use_jt
    }

    fn joint_terminate(&self) {
        let mut jt = self.jt.lock();
        if jt.use_jt && !jt.jt_completed {
            jt.jt_completed = true;
            let total = self.total_packets();
            self.coordinator.complete(total);
            self.set_state(StageState::JointRequested);
            info!(stage = %self.name, total_packets = total, "joint termination requested");
        }
    }

    fn aborting(&self) -> bool {
        self.ring.is_shutdown()
    }
}

/// Input stage worker: reserve, receive, stamp, release.
pub(crate) fn run_input(
    ring: &PacketRing,
    handle: &StageHandle,
    plugin: &mut dyn InputPlugin,
    chunk: usize,
) -> StageOutcome {
    handle.set_state(StageState::Running);
    let mut scratch: Vec<TsPacket> = Vec::new();
    loop {
        // The input enforces the joint cutoff for the whole pipeline.
        let cutoff = handle.coordinator.total_packets_before_joint_termination();
        let total = handle.total_packets();
        if total >= cutoff {
            return StageOutcome::JointEnd;
        }
        let budget = (cutoff - total).min(chunk as u64) as usize;

        let Some(range) = ring.input_reserve(budget) else {
            return StageOutcome::Aborted;
        };

        scratch.clear();
        scratch.resize(range.count, TsPacket::null());
        let got = match plugin.receive(handle, &mut scratch) {
            Ok(0) => return StageOutcome::CleanEof,
            Ok(got) => got.min(range.count),
            Err(e) if e.is_eof() => return StageOutcome::CleanEof,
            Err(e) => {
                error!(stage = %handle.name, error = %e, "input plugin failed");
                return StageOutcome::Error(e.to_string());
            }
        };

        for (offset, packet) in scratch.drain(..got).enumerate() {
            let pos = range.base + offset as u64;
            let mut slot = ring.slot(pos);
            slot.packet = packet;
            slot.filler = false;
            slot.sequence = pos;
        }
        handle.add_total(got as u64);
        ring.stage_release(0, got);
    }
}

/// Processor stage worker: acquire, apply per-packet verdicts, release.
pub(crate) fn run_processor(
    ring: &PacketRing,
    handle: &StageHandle,
    plugin: &mut dyn ProcessorPlugin,
    chunk: usize,
) -> StageOutcome {
    handle.set_state(StageState::Running);
    let index = handle.index;
    // After joint completion the stage keeps forwarding packets untouched
    // until the pipeline reaches the cutoff.
    let mut passthrough = false;
    loop {
        let Some(range) = ring.stage_acquire(index, chunk) else {
            return end_of_upstream(ring, handle);
        };

        let mut ended = false;
        let mut release = 0;
        for pos in range.positions() {
            release += 1;
            handle.add_total(1);
            if passthrough {
                continue;
            }
            let verdict = {
                let mut slot = ring.slot(pos);
                if slot.filler {
                    continue;
                }
                let verdict = plugin.process(handle, &mut slot.packet);
                match verdict {
                    Verdict::Null => slot.filler = true,
                    Verdict::Drop => {
                        slot.filler = true;
                        handle.add_dropped(1);
                    }
                    Verdict::Ok | Verdict::End => {}
                }
                verdict
            };
            if verdict == Verdict::End {
                if handle.uses_joint_termination() {
                    handle.joint_terminate();
                    passthrough = true;
                } else {
                    ended = true;
                    break;
                }
            }
        }
        ring.stage_release(index, release);
        if ended {
            return StageOutcome::IndividualEnd;
        }
    }
}

/// Output stage worker: acquire, send non-filler packets, release.
pub(crate) fn run_output(
    ring: &PacketRing,
    handle: &StageHandle,
    plugin: &mut dyn OutputPlugin,
    chunk: usize,
) -> StageOutcome {
    handle.set_state(StageState::Running);
    let index = handle.index;
    let mut batch: Vec<TsPacket> = Vec::with_capacity(chunk);
    loop {
        let Some(range) = ring.stage_acquire(index, chunk) else {
            return end_of_upstream(ring, handle);
        };

        batch.clear();
        for pos in range.positions() {
            let slot = ring.slot(pos);
            if !slot.filler {
                batch.push(slot.packet.clone());
            }
        }
        if !batch.is_empty() {
            match plugin.send(handle, &batch) {
                Ok(()) => {}
                Err(e) if e.is_eof() => {
                    handle.add_total(range.count as u64);
                    ring.stage_release(index, range.count);
                    return StageOutcome::IndividualEnd;
                }
                Err(e) => {
                    error!(stage = %handle.name, error = %e, "output plugin failed");
                    return StageOutcome::Error(e.to_string());
                }
            }
        }
        handle.add_total(range.count as u64);
        ring.stage_release(index, range.count);
    }
}

/// Classify a `None` from `stage_acquire`.
fn end_of_upstream(ring: &PacketRing, handle: &StageHandle) -> StageOutcome {
    if ring.is_shutdown() {
        StageOutcome::Aborted
    } else if handle.jt_completed() {
        StageOutcome::JointEnd
    } else {
        StageOutcome::UpstreamEnd
    }
}

//! Joint termination coordination.
//!
//! Stages may opt in to joint termination: instead of ending the pipeline
//! when one of them is done, the pipeline ends once every opted-in stage has
//! declared completion, at the highest packet count any of them had reached
//! when it did. The coordinator owns the shared counters; each stage
//! participates through its own handle state.

use parking_lot::Mutex;

#[derive(Default)]
struct JtCounters {
    /// Number of stages currently opted in.
    users: u32,
    /// Opted-in stages that have not yet declared completion.
    remaining: u32,
    /// Highest packet count seen at a completion.
    highest_pkt: u64,
}

/// Owns the joint termination rendezvous counters for one pipeline run.
pub struct TerminationCoordinator {
    counters: Mutex<JtCounters>,
    ignore_jt: bool,
}

impl TerminationCoordinator {
    /// Create a coordinator. With `ignore_joint_termination`, opt-in requests
    /// are refused and joint termination degrades to individual termination.
    pub fn new(ignore_joint_termination: bool) -> Self {
        Self {
            counters: Mutex::new(JtCounters::default()),
            ignore_jt: ignore_joint_termination,
        }
    }

    /// Whether joint termination is globally ignored.
    pub fn ignores_joint_termination(&self) -> bool {
        self.ignore_jt
    }

    /// A stage opted in (`completed` when it re-enters after completing).
    pub(crate) fn enter(&self, completed: bool) {
        let mut counters = self.counters.lock();
        counters.users += 1;
        if !completed {
            counters.remaining += 1;
        }
    }

    /// A stage opted back out.
    pub(crate) fn leave(&self, completed: bool) {
        let mut counters = self.counters.lock();
        counters.users -= 1;
        if !completed {
            counters.remaining -= 1;
        }
    }

    /// A stage declared completion at `total_packets`.
    pub(crate) fn complete(&self, total_packets: u64) {
        let mut counters = self.counters.lock();
        counters.remaining -= 1;
        counters.highest_pkt = counters.highest_pkt.max(total_packets);
    }

    /// Whether any stage ever participates.
    pub fn has_users(&self) -> bool {
        self.counters.lock().users > 0
    }

    /// The packet count at which the pipeline must terminate its joint
    /// users: the highest completion count once every opted-in stage has
    /// completed, `u64::MAX` before that.
    pub fn total_packets_before_joint_termination(&self) -> u64 {
        let counters = self.counters.lock();
        if counters.users > 0 && counters.remaining == 0 {
            counters.highest_pkt
        } else {
            u64::MAX
        }
    }
}

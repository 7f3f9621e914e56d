//! Plugin trait and type definitions.
//!
//! A processing pipeline is assembled from three plugin roles: one input
//! filling the shared packet ring, zero or more packet processors, and one
//! output draining it. Each plugin talks back to its stage through the
//! [`StageContext`] handle, which carries packet accounting and the joint
//! termination protocol.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use tspipe_core::TsPacket;

/// The role a plugin fills in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginRole {
    /// Produces packets into the ring.
    Input,
    /// Transforms packets in place.
    Processor,
    /// Consumes packets from the ring.
    Output,
}

impl std::fmt::Display for PluginRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PluginRole::Input => "input",
            PluginRole::Processor => "processor",
            PluginRole::Output => "output",
        };
        f.write_str(name)
    }
}

/// Per-packet verdict returned by a processor plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Forward the packet unchanged (or as rewritten in place).
    Ok,
    /// Replace the packet with a null packet.
    Null,
    /// Drop the packet (replaced with a null packet, counted as dropped).
    Drop,
    /// Stop this stage after the current window is released.
    End,
}

/// Handle a plugin uses to interact with the stage running it.
///
/// Implemented by the pipeline runtime; plugins receive it on every call.
pub trait StageContext: Send + Sync {
    /// Name the plugin was registered under.
    fn plugin_name(&self) -> &str;

    /// Total packets this stage has passed so far.
    fn total_packets(&self) -> u64;

    /// Opt in or out of joint termination.
    ///
    /// While opted in, the pipeline will not terminate on this stage's
    /// completion alone; it terminates once every opted-in stage has
    /// requested it.
    fn use_joint_termination(&self, on: bool);

    /// Whether this stage currently participates in joint termination.
    fn uses_joint_termination(&self) -> bool;

    /// Declare this stage done for the purpose of joint termination.
    fn joint_terminate(&self);

    /// Whether the pipeline is shutting down.
    fn aborting(&self) -> bool;
}

/// Base trait shared by every plugin role.
pub trait Plugin: Send {
    /// One-line description shown by the plugin inventory.
    fn description(&self) -> &str {
        ""
    }

    /// Apply plugin-specific arguments before start.
    fn configure(&mut self, _args: &[String]) -> Result<()> {
        Ok(())
    }

    /// Acquire resources. Called once before any packet flows.
    fn start(&mut self, _ctx: &dyn StageContext) -> Result<()> {
        Ok(())
    }

    /// Release resources. Called once after the stage has stopped.
    fn stop(&mut self, _ctx: &dyn StageContext) -> Result<()> {
        Ok(())
    }
}

/// An input plugin: the packet source.
pub trait InputPlugin: Plugin {
    /// Fill `buffer` with packets, returning how many were produced.
    ///
    /// Returning zero signals end of input.
    fn receive(&mut self, ctx: &dyn StageContext, buffer: &mut [TsPacket]) -> Result<usize>;
}

/// A packet processor plugin.
pub trait ProcessorPlugin: Plugin {
    /// Examine (and possibly rewrite) one packet.
    fn process(&mut self, ctx: &dyn StageContext, packet: &mut TsPacket) -> Verdict;
}

/// An output plugin: the packet sink.
pub trait OutputPlugin: Plugin {
    /// Consume a window of packets.
    fn send(&mut self, ctx: &dyn StageContext, packets: &[TsPacket]) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Inert stage context for exercising plugins outside a pipeline.
    #[derive(Default)]
    pub struct TestContext {
        pub packets: AtomicU64,
    }

    impl StageContext for TestContext {
        fn plugin_name(&self) -> &str {
            "test"
        }

        fn total_packets(&self) -> u64 {
            self.packets.load(Ordering::Relaxed)
        }

        fn use_joint_termination(&self, _on: bool) {}

        fn uses_joint_termination(&self) -> bool {
            false
        }

        fn joint_terminate(&self) {}

        fn aborting(&self) -> bool {
            false
        }
    }
}

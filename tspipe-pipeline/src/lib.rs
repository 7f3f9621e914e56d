//! # tspipe Pipeline
//!
//! The multi-stage packet pipeline runtime of the tspipe transport stream
//! toolkit.
//!
//! # Architecture
//!
//! A pipeline couples one input plugin, any number of packet processors and
//! one output plugin through a single fixed-capacity ring of 188-byte
//! packets:
//!
//! ```text
//! ┌───────┐    ┌───────────┐    ┌───────────┐    ┌────────┐
//! │ Input │───▶│ Processor │───▶│ Processor │───▶│ Output │
//! └───────┘    └───────────┘    └───────────┘    └────────┘
//!     │              │                │               │
//!     └──────────────┴── packet ring ┴───────────────┘
//! ```
//!
//! Every stage runs on its own thread and advances a cursor over the ring;
//! the input never overruns the slowest stage, and stages only ever block
//! inside the ring's reserve/acquire operations. Stages terminate
//! individually (the rest of the pipeline keeps running) or jointly through
//! the [`TerminationCoordinator`] rendezvous.
//!
//! # Key components
//!
//! - [`Pipeline`] - controller owning the ring, coordinator and stages
//! - [`PacketRing`] - the shared slot ring with per-stage cursors
//! - [`StageHandle`] - per-stage state, also the plugin-facing context
//! - [`TerminationCoordinator`] - joint termination rendezvous

pub mod buffer;
pub mod controller;
pub mod error;
pub mod stage;
pub mod termination;

pub use buffer::{PacketRing, PacketSlot, SlotRange};
pub use controller::{AbortHandle, ExitStatus, Pipeline, PipelineConfig, StageSpec};
pub use error::{PipelineError, Result};
pub use stage::{StageHandle, StageOutcome, StageState};
pub use termination::TerminationCoordinator;

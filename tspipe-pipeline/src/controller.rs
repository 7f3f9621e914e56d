//! The pipeline controller.
//!
//! The controller owns the ring, the termination coordinator and the stages.
//! It resolves plugins from a repository, starts them in stage order, runs
//! one worker thread per stage and aggregates the outcome into an exit
//! status.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use tracing::{error, info, warn};

use crate::buffer::PacketRing;
use crate::error::{PipelineError, Result};
use crate::stage::{run_input, run_output, run_processor, StageHandle, StageOutcome, StageState};
use crate::termination::TerminationCoordinator;
use tspipe_core::TS_PACKET_SIZE;
use tspipe_plugin::{
    InputPlugin, OutputPlugin, PluginRepository, PluginRole, ProcessorPlugin, StageContext,
};

/// One stage request: plugin name, role and plugin-specific arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    /// Plugin name as registered in the repository.
    pub name: String,
    /// Role the plugin fills.
    pub role: PluginRole,
    /// Arguments passed to the plugin's `configure`.
    pub args: Vec<String>,
}

impl StageSpec {
    /// Spec for an input stage.
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: PluginRole::Input,
            args: Vec::new(),
        }
    }

    /// Spec for a processor stage.
    pub fn processor(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: PluginRole::Processor,
            args: Vec::new(),
        }
    }

    /// Spec for an output stage.
    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: PluginRole::Output,
            args: Vec::new(),
        }
    }

    /// Attach plugin arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Ring buffer budget in bytes; the ring holds `buffer_bytes / 188`
    /// packet slots.
    pub buffer_bytes: usize,
    /// Maximum packets a stage handles per window.
    pub read_chunk: usize,
    /// Treat joint termination requests as individual termination.
    pub ignore_joint_termination: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_bytes: 16 * 1024 * 1024,
            read_chunk: 128,
            ignore_joint_termination: false,
        }
    }
}

/// Aggregate result of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The input reached end of stream and everything drained.
    CleanEof,
    /// All joint termination users completed and the cutoff was reached.
    JointTerminated,
    /// The pipeline was aborted, or a plugin failed mid-run.
    Aborted,
    /// A stage worker died; details are in the log.
    Fatal,
}

impl ExitStatus {
    /// Whether the run counts as successful.
    pub fn is_success(self) -> bool {
        matches!(self, ExitStatus::CleanEof | ExitStatus::JointTerminated)
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ExitStatus::CleanEof => "end of stream",
            ExitStatus::JointTerminated => "joint termination",
            ExitStatus::Aborted => "aborted",
            ExitStatus::Fatal => "fatal error",
        };
        f.write_str(text)
    }
}

enum StagePlugin {
    Input(Box<dyn InputPlugin>),
    Processor(Box<dyn ProcessorPlugin>),
    Output(Box<dyn OutputPlugin>),
}

impl StagePlugin {
    fn start(&mut self, ctx: &dyn StageContext) -> tspipe_plugin::Result<()> {
        match self {
            StagePlugin::Input(p) => p.start(ctx),
            StagePlugin::Processor(p) => p.start(ctx),
            StagePlugin::Output(p) => p.start(ctx),
        }
    }

    fn stop(&mut self, ctx: &dyn StageContext) -> tspipe_plugin::Result<()> {
        match self {
            StagePlugin::Input(p) => p.stop(ctx),
            StagePlugin::Processor(p) => p.stop(ctx),
            StagePlugin::Output(p) => p.stop(ctx),
        }
    }
}

struct Stage {
    handle: Arc<StageHandle>,
    plugin: StagePlugin,
}

/// Cancels a running pipeline.
#[derive(Clone)]
pub struct AbortHandle {
    ring: Arc<PacketRing>,
}

impl AbortHandle {
    /// Signal shutdown; blocked stages wake, drain their current window and
    /// exit.
    pub fn abort(&self) {
        info!("pipeline abort requested");
        self.ring.signal_shutdown();
    }
}

/// A built pipeline, ready to run.
pub struct Pipeline {
    ring: Arc<PacketRing>,
    coordinator: Arc<TerminationCoordinator>,
    stages: Vec<Stage>,
    read_chunk: usize,
}

impl Pipeline {
    /// Build a pipeline from stage specs.
    ///
    /// The spec list must be exactly one input, zero or more processors and
    /// one output, in that order. Plugins are allocated from the repository
    /// and configured with their arguments.
    pub fn build(
        repo: &PluginRepository,
        specs: &[StageSpec],
        config: &PipelineConfig,
    ) -> Result<Self> {
        if specs.len() < 2 {
            return Err(PipelineError::InvalidConfig(
                "a pipeline needs at least an input and an output stage".into(),
            ));
        }
        for (i, spec) in specs.iter().enumerate() {
            let expected = if i == 0 {
                PluginRole::Input
            } else if i == specs.len() - 1 {
                PluginRole::Output
            } else {
                PluginRole::Processor
            };
            if spec.role != expected {
                return Err(PipelineError::InvalidConfig(format!(
                    "stage {i} ('{}') must be an {expected} plugin",
                    spec.name
                )));
            }
        }

        let capacity = (config.buffer_bytes / TS_PACKET_SIZE).max(16);
        let ring = Arc::new(PacketRing::new(capacity, specs.len()));
        let coordinator = Arc::new(TerminationCoordinator::new(config.ignore_joint_termination));

        let mut stages = Vec::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            let mut plugin = match spec.role {
                PluginRole::Input => StagePlugin::Input(repo.get_input(&spec.name)?()),
                PluginRole::Processor => {
                    StagePlugin::Processor(repo.get_processor(&spec.name)?())
                }
                PluginRole::Output => StagePlugin::Output(repo.get_output(&spec.name)?()),
            };
            match &mut plugin {
                StagePlugin::Input(p) => p.configure(&spec.args)?,
                StagePlugin::Processor(p) => p.configure(&spec.args)?,
                StagePlugin::Output(p) => p.configure(&spec.args)?,
            }
            let handle = Arc::new(StageHandle::new(
                spec.name.clone(),
                index,
                Arc::clone(&coordinator),
                Arc::clone(&ring),
            ));
            stages.push(Stage { handle, plugin });
        }

        info!(
            stages = specs.len(),
            capacity, "pipeline built"
        );
        Ok(Self {
            ring,
            coordinator,
            stages,
            read_chunk: config.read_chunk,
        })
    }

    /// The joint termination coordinator for this run.
    pub fn coordinator(&self) -> &TerminationCoordinator {
        &self.coordinator
    }

    /// Handle for aborting the pipeline from another thread.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            ring: Arc::clone(&self.ring),
        }
    }

    /// Stage handles, in stage order (for inspection).
    pub fn stage_handles(&self) -> Vec<Arc<StageHandle>> {
        self.stages.iter().map(|s| Arc::clone(&s.handle)).collect()
    }

    /// Run the pipeline to completion.
    ///
    /// Starts every plugin in stage order (a start failure stops the
    /// already-started plugins and aborts before any packet flows), runs one
    /// worker thread per stage, joins them and aggregates the exit status.
    pub fn run(mut self) -> Result<ExitStatus> {
        // Start phase.
        for i in 0..self.stages.len() {
            let handle = Arc::clone(&self.stages[i].handle);
            if let Err(e) = self.stages[i].plugin.start(&*handle) {
                error!(stage = %handle.plugin_name(), error = %e, "plugin start failed");
                for j in (0..i).rev() {
                    let handle = Arc::clone(&self.stages[j].handle);
                    if let Err(e) = self.stages[j].plugin.stop(&*handle) {
                        warn!(stage = %handle.plugin_name(), error = %e, "plugin stop failed");
                    }
                }
                return Err(PipelineError::StartFailed {
                    name: handle.plugin_name().to_owned(),
                    source: e,
                });
            }
        }

        let handles: Vec<Arc<StageHandle>> =
            self.stages.iter().map(|s| Arc::clone(&s.handle)).collect();

        // Run phase: one native thread per stage.
        let chunk = self.read_chunk;
        let mut workers = Vec::with_capacity(self.stages.len());
        for stage in self.stages.drain(..) {
            let ring = Arc::clone(&self.ring);
            let handle = stage.handle;
            let mut plugin = stage.plugin;
            let worker = thread::Builder::new()
                .name(format!("tspipe-{}", handle.plugin_name()))
                .spawn(move || {
                    let index = handle.index();
                    let result = catch_unwind(AssertUnwindSafe(|| {
                        let outcome = match &mut plugin {
                            StagePlugin::Input(p) => run_input(&ring, &handle, p.as_mut(), chunk),
                            StagePlugin::Processor(p) => {
                                run_processor(&ring, &handle, p.as_mut(), chunk)
                            }
                            StagePlugin::Output(p) => run_output(&ring, &handle, p.as_mut(), chunk),
                        };
                        match &outcome {
                            StageOutcome::IndividualEnd => {
                                handle.set_state(StageState::IndividualEnd)
                            }
                            StageOutcome::JointEnd => handle.set_state(StageState::JointEnd),
                            _ => {}
                        }
                        if let Err(e) = plugin.stop(&*handle) {
                            warn!(stage = %handle.plugin_name(), error = %e, "plugin stop failed");
                        }
                        outcome
                    }));
                    // The cursor must unfreeze the neighbours even when the
                    // worker died.
                    ring.stage_finish(index);
                    handle.set_state(StageState::Exited);
                    match result {
                        Ok(outcome) => outcome,
                        Err(panic) => StageOutcome::Fatal(panic_message(panic.as_ref())),
                    }
                })
                .map_err(PipelineError::Io)?;
            workers.push(worker);
        }

        // Join phase, in stage order.
        let mut outcomes = Vec::with_capacity(workers.len());
        for (worker, handle) in workers.into_iter().zip(&handles) {
            let outcome = worker
                .join()
                .unwrap_or_else(|panic| StageOutcome::Fatal(panic_message(panic.as_ref())));
            info!(
                stage = %handle.plugin_name(),
                packets = handle.total_packets(),
                dropped = handle.dropped_packets(),
                outcome = ?outcome,
                "stage finished"
            );
            outcomes.push(outcome);
        }

        let status = self.aggregate(&handles, &outcomes);
        info!(status = %status, "pipeline finished");
        Ok(status)
    }

    fn aggregate(&self, handles: &[Arc<StageHandle>], outcomes: &[StageOutcome]) -> ExitStatus {
        let mut errored = false;
        let mut fatal = false;
        for (handle, outcome) in handles.iter().zip(outcomes) {
            match outcome {
                StageOutcome::Fatal(message) => {
                    if !fatal {
                        error!(stage = %handle.plugin_name(), message = %message, "fatal stage error");
                    }
                    fatal = true;
                }
                StageOutcome::Error(_) => errored = true,
                _ => {}
            }
        }

        if fatal {
            return ExitStatus::Fatal;
        }
        if errored {
            return ExitStatus::Aborted;
        }
        match outcomes[0] {
            StageOutcome::CleanEof => ExitStatus::CleanEof,
            StageOutcome::JointEnd => ExitStatus::JointTerminated,
            _ => ExitStatus::Aborted,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "stage worker panicked".to_owned()
    }
}

//! tspipe - command-line MPEG transport stream processor.
//!
//! Builds a processing pipeline from plugin specifications and runs it to
//! completion:
//!
//! ```text
//! tspipe -I file:input.ts -P null -O file:output.ts
//! ```

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;

use tspipe_pipeline::{ExitStatus, Pipeline, PipelineConfig, StageSpec};
use tspipe_plugin::{builtin, PluginRepository, PluginRole};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "tspipe")]
#[command(version)]
#[command(about = "A plugin-based MPEG transport stream processor")]
#[command(long_about = "tspipe chains an input plugin, packet processors and an output \n\
    plugin over a shared packet ring.\n\n\
    Plugin specifications are name[:arg[:arg...]].\n\n\
    EXAMPLES:\n    \
    tspipe -I file:input.ts -O file:output.ts\n    \
    tspipe -I null:100000 -P null -O drop\n    \
    tspipe --list-plugins")]
struct Args {
    /// Input plugin specification
    #[arg(short = 'I', long)]
    input: Option<String>,

    /// Packet processor plugin specification (repeatable, applied in order)
    #[arg(short = 'P', long = "processor")]
    processors: Vec<String>,

    /// Output plugin specification
    #[arg(short = 'O', long)]
    output: Option<String>,

    /// Ring buffer budget in bytes
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    buffer_bytes: usize,

    /// Maximum packets handled per stage window
    #[arg(long, default_value_t = 128)]
    read_chunk: usize,

    /// Treat joint termination requests as individual termination
    #[arg(long)]
    ignore_joint_termination: bool,

    /// Only use explicitly registered plugins, never shared objects
    #[arg(long)]
    no_shared_libraries: bool,

    /// List available plugins and exit
    #[arg(long)]
    list_plugins: bool,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Split `name[:arg[:arg...]]` into a stage spec.
fn parse_stage_spec(spec: &str, role: PluginRole) -> StageSpec {
    let mut parts = spec.split(':');
    let name = parts.next().unwrap_or_default();
    StageSpec {
        name: name.to_owned(),
        role,
        args: parts.map(str::to_owned).collect(),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let repo = PluginRepository::global();
    builtin::register_builtins(repo);
    if args.no_shared_libraries {
        repo.set_shared_library_allowed(false);
    }

    if args.list_plugins {
        print!("{}", repo.list_plugins(true));
        return ExitCode::SUCCESS;
    }

    let (Some(input), Some(output)) = (&args.input, &args.output) else {
        error!("an input (-I) and an output (-O) plugin are required");
        return ExitCode::FAILURE;
    };

    let mut specs = Vec::with_capacity(2 + args.processors.len());
    specs.push(parse_stage_spec(input, PluginRole::Input));
    for processor in &args.processors {
        specs.push(parse_stage_spec(processor, PluginRole::Processor));
    }
    specs.push(parse_stage_spec(output, PluginRole::Output));

    let config = PipelineConfig {
        buffer_bytes: args.buffer_bytes,
        read_chunk: args.read_chunk,
        ignore_joint_termination: args.ignore_joint_termination,
    };

    let pipeline = match Pipeline::build(repo, &specs, &config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match pipeline.run() {
        Ok(status) => {
            info!(status = %status, "done");
            match status {
                ExitStatus::CleanEof | ExitStatus::JointTerminated => ExitCode::SUCCESS,
                ExitStatus::Aborted => ExitCode::from(2),
                ExitStatus::Fatal => ExitCode::from(3),
            }
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stage_spec() {
        let spec = parse_stage_spec("file:input.ts", PluginRole::Input);
        assert_eq!(spec.name, "file");
        assert_eq!(spec.args, vec!["input.ts".to_owned()]);

        let spec = parse_stage_spec("null", PluginRole::Processor);
        assert_eq!(spec.name, "null");
        assert!(spec.args.is_empty());

        let spec = parse_stage_spec("file:out.ts:ignore-abort", PluginRole::Output);
        assert_eq!(spec.args, vec!["out.ts".to_owned(), "ignore-abort".to_owned()]);
    }
}
